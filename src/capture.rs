//! Microphone capture: mono audio is resampled to the service input rate,
//! cut into fixed-length PCM16 frames and metered for volume.
//!
//! The device callback runs on its own realtime context and only hands sample
//! blocks over a bounded channel; framing happens on a tokio task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gemini_live_types::audio::{pcm16_mime_type, INPUT_SAMPLE_RATE};
use gemini_live_types::Blob;
use gemini_live_utils::audio::{convert_f32_to_i16, StreamResampler, ToBinary};
use gemini_live_utils::volume::VolumeMeter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 100 ms at 16 kHz.
pub const DEFAULT_FRAME_SAMPLES: usize = 1600;
const RESAMPLER_CHUNK: usize = 1024;

/// Something that produces mono f32 sample blocks, e.g. a microphone.
pub trait CaptureSource: Send {
    /// Rate of the blocks this source delivers.
    fn sample_rate(&self) -> u32;
    /// Starts delivering blocks into `tx`. Blocks must not be reordered.
    fn open(&mut self, tx: mpsc::Sender<Vec<f32>>) -> anyhow::Result<()>;
    /// Stops delivery and releases the device.
    fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    sample_rate: u32,
    frame_samples: usize,
    capacity: usize,
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE,
            frame_samples: DEFAULT_FRAME_SAMPLES,
            capacity: 64,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_frame_duration(mut self, duration: Duration) -> Self {
        let samples = (self.sample_rate as f64 * duration.as_secs_f64()).round() as usize;
        self.frame_samples = samples.max(1);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed-length block of PCM16 samples, numbered in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    sequence: u64,
    sample_rate: u32,
    samples: Vec<i16>,
}

impl AudioFrame {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn duration(&self) -> Duration {
        let nanos = self.samples.len() as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64;
        Duration::from_nanos(nanos)
    }

    /// Little-endian PCM16 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.samples.to_binary()
    }

    pub fn to_base64(&self) -> String {
        gemini_live_utils::audio::encode_i16(&self.samples)
    }

    /// The frame as a realtime input chunk.
    pub fn to_blob(&self) -> Blob {
        Blob::new(&pcm16_mime_type(self.sample_rate), self.to_base64())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Data(AudioFrame),
    Volume(f32),
}

/// Resamples, frames and meters a stream of sample blocks.
pub struct FrameEncoder {
    resampler: StreamResampler,
    pending: Vec<f32>,
    frame_samples: usize,
    sample_rate: u32,
    sequence: Arc<AtomicU64>,
    meter: VolumeMeter,
}

impl FrameEncoder {
    pub fn new(source_rate: u32, config: &CaptureConfig) -> anyhow::Result<Self> {
        Self::with_sequence(source_rate, config, Arc::new(AtomicU64::new(0)))
    }

    fn with_sequence(
        source_rate: u32,
        config: &CaptureConfig,
        sequence: Arc<AtomicU64>,
    ) -> anyhow::Result<Self> {
        let resampler = StreamResampler::new(source_rate, config.sample_rate, RESAMPLER_CHUNK)
            .context("failed to create capture resampler")?;
        Ok(Self {
            resampler,
            pending: Vec::with_capacity(config.frame_samples * 2),
            frame_samples: config.frame_samples,
            sample_rate: config.sample_rate,
            sequence,
            meter: VolumeMeter::new(),
        })
    }

    /// Feeds one block and returns every frame it completed, each with the
    /// smoothed volume measured over that frame.
    pub fn push(&mut self, block: &[f32]) -> Vec<(AudioFrame, f32)> {
        let resampled = self.resampler.process(block);
        self.pending.extend_from_slice(&resampled);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            let volume = self.meter.update(&chunk);
            let frame = AudioFrame {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                sample_rate: self.sample_rate,
                samples: convert_f32_to_i16(&chunk),
            };
            frames.push((frame, volume));
        }
        frames
    }
}

/// Turns a [`CaptureSource`] into a stream of [`CaptureEvent`]s.
pub struct AudioCaptureEngine {
    config: CaptureConfig,
    source: Box<dyn CaptureSource>,
    events_tx: mpsc::Sender<CaptureEvent>,
    events_rx: Option<mpsc::Receiver<CaptureEvent>>,
    sequence: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl AudioCaptureEngine {
    pub fn new(source: impl CaptureSource + 'static, config: CaptureConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.capacity * 2);
        Self {
            config,
            source: Box::new(source),
            events_tx,
            events_rx: Some(events_rx),
            sequence: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// The event stream. Can be taken once.
    pub fn events(&mut self) -> Option<mpsc::Receiver<CaptureEvent>> {
        self.events_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.task.is_some() {
            tracing::debug!("capture already running");
            return Ok(());
        }
        let mut encoder = FrameEncoder::with_sequence(
            self.source.sample_rate(),
            &self.config,
            self.sequence.clone(),
        )?;
        let (tx, mut rx) = mpsc::channel::<Vec<f32>>(self.config.capacity);
        self.source
            .open(tx)
            .context("failed to open capture source")?;

        let events = self.events_tx.clone();
        self.task = Some(tokio::spawn(async move {
            while let Some(block) = rx.recv().await {
                for (frame, volume) in encoder.push(&block) {
                    if events.send(CaptureEvent::Data(frame)).await.is_err() {
                        return;
                    }
                    if events.send(CaptureEvent::Volume(volume)).await.is_err() {
                        return;
                    }
                }
            }
        }));
        tracing::info!(
            "capture started: {} Hz source, {} samples per frame",
            self.source.sample_rate(),
            self.config.frame_samples
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            self.source.close();
            task.abort();
            tracing::info!("capture stopped");
        }
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "device")]
pub use self::device::CpalCapture;

#[cfg(feature = "device")]
mod device {
    use std::sync::mpsc as std_mpsc;
    use std::thread::JoinHandle;

    use anyhow::Context;
    use cpal::traits::{DeviceTrait, StreamTrait};
    use gemini_live_utils::audio::downmix;
    use gemini_live_utils::device::get_or_default_input;
    use tokio::sync::mpsc;

    use super::CaptureSource;

    /// Default (or named) input device. The cpal stream lives on its own
    /// thread for as long as the source is open.
    pub struct CpalCapture {
        device_name: Option<String>,
        sample_rate: u32,
        worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
    }

    impl CpalCapture {
        pub fn new(device_name: Option<String>) -> anyhow::Result<Self> {
            let device = get_or_default_input(device_name.clone())?;
            let config = device
                .default_input_config()
                .context("failed to get default input config")?;
            tracing::info!(
                "input: device={:?}, config={:?}",
                device.name().unwrap_or_default(),
                config
            );
            Ok(Self {
                device_name,
                sample_rate: config.sample_rate().0,
                worker: None,
            })
        }
    }

    fn build_stream(
        device_name: Option<String>,
        tx: mpsc::Sender<Vec<f32>>,
    ) -> anyhow::Result<cpal::Stream> {
        let device = get_or_default_input(device_name)?;
        let config = device
            .default_input_config()
            .context("failed to get default input config")?
            .config();
        let channels = config.channels as usize;
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Err(e) = tx.try_send(downmix(data, channels)) {
                    tracing::warn!("dropping captured block: {}", e);
                }
            },
            |err| tracing::error!("an error occurred on input stream: {}", err),
            None,
        )?;
        stream.play().context("failed to play input stream")?;
        Ok(stream)
    }

    impl CaptureSource for CpalCapture {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn open(&mut self, tx: mpsc::Sender<Vec<f32>>) -> anyhow::Result<()> {
            let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
            let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();
            let device_name = self.device_name.clone();
            let handle = std::thread::Builder::new()
                .name("gemini-live-capture".to_string())
                .spawn(move || {
                    let stream = match build_stream(device_name, tx) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    // Parked until the sender is dropped.
                    let _ = stop_rx.recv();
                    drop(stream);
                })
                .context("failed to spawn capture thread")?;
            ready_rx.recv().context("capture thread exited")??;
            self.worker = Some((stop_tx, handle));
            Ok(())
        }

        fn close(&mut self) {
            if let Some((stop_tx, handle)) = self.worker.take() {
                drop(stop_tx);
                if handle.join().is_err() {
                    tracing::error!("capture thread panicked");
                }
            }
        }
    }
}
