use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {:?}", target)),
    }
}

pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {:?}", target)),
    }
}

fn describe(device: &Device, config: Option<cpal::SupportedStreamConfig>, default: &str) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut d = match config {
        Some(cfg) => format!(" * {}({}ch, {}hz)", name, cfg.channels(), cfg.sample_rate().0),
        None => format!(" * {}", name),
    };
    if name == default {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let device_names: Vec<String> = host
        .input_devices()
        .context("No input devices found")?
        .map(|d| {
            let cfg = d.default_input_config().ok();
            describe(&d, cfg, &default_device)
        })
        .collect();
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let device_names: Vec<String> = host
        .output_devices()
        .context("No output devices found")?
        .map(|d| {
            let cfg = d.default_output_config().ok();
            describe(&d, cfg, &default_device)
        })
        .collect();
    Ok(device_names.join("\n"))
}
