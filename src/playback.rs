//! Speaker output for model audio.
//!
//! Chunks are resampled on the orchestration side and queued to a
//! [`PlaybackScheduler`], which the output device drives from its own realtime
//! context. Interrupting bumps an epoch: the scheduler drops everything queued
//! under an older epoch on its next render.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gemini_live_types::audio::OUTPUT_SAMPLE_RATE;
use gemini_live_utils::audio::{decode_pcm16, StreamResampler};
use gemini_live_utils::volume::VolumeMeter;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;
use tokio::sync::{mpsc, watch};

const RESAMPLER_CHUNK: usize = 480;

/// An output device that pulls audio from a [`PlaybackScheduler`].
pub trait PlaybackSink: Send {
    fn sample_rate(&self) -> u32;
    /// Takes ownership of the scheduler and starts rendering from it.
    fn open(&mut self, scheduler: PlaybackScheduler) -> anyhow::Result<()>;
    fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    source_rate: u32,
    max_buffered: Duration,
    capacity: usize,
}

impl PlaybackConfig {
    pub fn new() -> Self {
        Self {
            source_rate: OUTPUT_SAMPLE_RATE,
            max_buffered: Duration::from_secs(2),
            capacity: 1024,
        }
    }

    /// Rate of the PCM16 chunks passed to [`AudioPlaybackEngine::add_pcm16`].
    pub fn with_source_rate(mut self, rate: u32) -> Self {
        self.source_rate = rate;
        self
    }

    /// Audio held in the render buffer; anything beyond waits in the queue.
    pub fn with_max_buffered(mut self, max_buffered: Duration) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Chunks that may wait in the queue before new ones are dropped.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct Chunk {
    epoch: u64,
    samples: Vec<f32>,
}

/// Render side of the playback pipeline. Owned by the output device.
pub struct PlaybackScheduler {
    rx: mpsc::Receiver<Chunk>,
    epoch: Arc<AtomicU64>,
    seen_epoch: u64,
    ring: HeapRb<f32>,
    carry: Vec<f32>,
    scratch: Vec<f32>,
    meter: VolumeMeter,
    volume: Arc<watch::Sender<f32>>,
}

impl PlaybackScheduler {
    /// Fills `out` with interleaved frames for `channels` channels and
    /// returns how many frames carried audio. Missing audio is rendered as
    /// silence.
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let epoch = self.epoch.load(Ordering::Acquire);
        if epoch != self.seen_epoch {
            self.ring.clear();
            self.carry.clear();
            self.seen_epoch = epoch;
        }
        self.refill(epoch);

        let frames = out.len() / channels;
        self.scratch.clear();
        self.scratch.resize(frames, 0.0);
        let played = self.ring.pop_slice(&mut self.scratch);

        out.fill(0.0);
        for (frame, sample) in out.chunks_mut(channels).zip(self.scratch.iter()) {
            frame.fill(*sample);
        }

        let level = self.meter.update(&self.scratch);
        self.volume.send_replace(level);
        played
    }

    /// Samples ready to render without waiting on the queue.
    pub fn buffered(&self) -> usize {
        self.ring.occupied_len() + self.carry.len()
    }

    fn refill(&mut self, epoch: u64) {
        loop {
            if !self.carry.is_empty() {
                let pushed = self.ring.push_slice(&self.carry);
                self.carry.drain(..pushed);
                if !self.carry.is_empty() {
                    return;
                }
            }
            match self.rx.try_recv() {
                Ok(chunk) if chunk.epoch >= epoch => self.carry = chunk.samples,
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }
}

/// Schedules arrival-ordered PCM16 chunks on a [`PlaybackSink`].
pub struct AudioPlaybackEngine {
    config: PlaybackConfig,
    sink: Box<dyn PlaybackSink>,
    tx: Option<mpsc::Sender<Chunk>>,
    epoch: Arc<AtomicU64>,
    resampler: Option<StreamResampler>,
    volume: Arc<watch::Sender<f32>>,
}

impl AudioPlaybackEngine {
    pub fn new(sink: impl PlaybackSink + 'static, config: PlaybackConfig) -> Self {
        let (volume, _) = watch::channel(0.0);
        Self {
            config,
            sink: Box::new(sink),
            tx: None,
            epoch: Arc::new(AtomicU64::new(0)),
            resampler: None,
            volume: Arc::new(volume),
        }
    }

    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    /// Latest output volume, updated once per rendered window.
    pub fn volume(&self) -> watch::Receiver<f32> {
        self.volume.subscribe()
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.tx.is_some() {
            return Ok(());
        }
        let sink_rate = self.sink.sample_rate();
        let resampler = StreamResampler::new(self.config.source_rate, sink_rate, RESAMPLER_CHUNK)
            .context("failed to create playback resampler")?;
        let ring_len =
            ((sink_rate as f64 * self.config.max_buffered.as_secs_f64()) as usize).max(1);
        let (tx, rx) = mpsc::channel(self.config.capacity);
        let scheduler = PlaybackScheduler {
            rx,
            epoch: self.epoch.clone(),
            seen_epoch: self.epoch.load(Ordering::Acquire),
            ring: HeapRb::new(ring_len),
            carry: Vec::new(),
            scratch: Vec::new(),
            meter: VolumeMeter::new(),
            volume: self.volume.clone(),
        };
        self.sink
            .open(scheduler)
            .context("failed to open playback sink")?;
        self.resampler = Some(resampler);
        self.tx = Some(tx);
        tracing::info!(
            "playback started: {} Hz source, {} Hz sink",
            self.config.source_rate,
            sink_rate
        );
        Ok(())
    }

    /// Queues a chunk of little-endian PCM16 at the source rate. Returns
    /// false when the chunk was dropped.
    pub fn add_pcm16(&mut self, pcm: &[u8]) -> bool {
        let (Some(tx), Some(resampler)) = (self.tx.as_ref(), self.resampler.as_mut()) else {
            tracing::debug!("playback not started, dropping {} bytes", pcm.len());
            return false;
        };
        let samples = resampler.process(&decode_pcm16(pcm));
        if samples.is_empty() {
            return true;
        }
        let chunk = Chunk {
            epoch: self.epoch.load(Ordering::Acquire),
            samples,
        };
        if let Err(e) = tx.try_send(chunk) {
            tracing::warn!("dropping playback chunk: {}", e);
            return false;
        }
        true
    }

    /// Discards everything queued but not yet played.
    pub fn interrupt(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        tracing::debug!("playback interrupted");
    }

    pub fn stop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        self.interrupt();
        self.tx = None;
        self.resampler = None;
        self.sink.close();
        self.volume.send_replace(0.0);
        tracing::info!("playback stopped");
    }
}

impl Drop for AudioPlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "device")]
pub use self::device::CpalPlayback;

#[cfg(feature = "device")]
mod device {
    use std::sync::mpsc as std_mpsc;
    use std::thread::JoinHandle;

    use anyhow::Context;
    use cpal::traits::{DeviceTrait, StreamTrait};
    use gemini_live_utils::device::get_or_default_output;

    use super::{PlaybackScheduler, PlaybackSink};

    /// Default (or named) output device, rendered on its own thread.
    pub struct CpalPlayback {
        device_name: Option<String>,
        sample_rate: u32,
        worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
    }

    impl CpalPlayback {
        pub fn new(device_name: Option<String>) -> anyhow::Result<Self> {
            let device = get_or_default_output(device_name.clone())?;
            let config = device
                .default_output_config()
                .context("failed to get default output config")?;
            tracing::info!(
                "output: device={:?}, config={:?}",
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
        mut scheduler: PlaybackScheduler,
    ) -> anyhow::Result<cpal::Stream> {
        let device = get_or_default_output(device_name)?;
        let config = device
            .default_output_config()
            .context("failed to get default output config")?
            .config();
        let channels = config.channels as usize;
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                scheduler.render(data, channels);
            },
            |err| tracing::error!("an error occurred on output stream: {}", err),
            None,
        )?;
        stream.play().context("failed to play output stream")?;
        Ok(stream)
    }

    impl PlaybackSink for CpalPlayback {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn open(&mut self, scheduler: PlaybackScheduler) -> anyhow::Result<()> {
            let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
            let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();
            let device_name = self.device_name.clone();
            let handle = std::thread::Builder::new()
                .name("gemini-live-playback".to_string())
                .spawn(move || {
                    let stream = match build_stream(device_name, scheduler) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));
                    let _ = stop_rx.recv();
                    drop(stream);
                })
                .context("failed to spawn playback thread")?;
            ready_rx.recv().context("playback thread exited")??;
            self.worker = Some((stop_tx, handle));
            Ok(())
        }

        fn close(&mut self) {
            if let Some((stop_tx, handle)) = self.worker.take() {
                drop(stop_tx);
                if handle.join().is_err() {
                    tracing::error!("playback thread panicked");
                }
            }
        }
    }
}
