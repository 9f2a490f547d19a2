use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// A mono resampler fed with arbitrarily sized blocks.
///
/// Samples that do not fill a whole resampler chunk are carried over to the
/// next call instead of being padded, so the output never gains gaps.
/// Equal rates pass samples through untouched.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let inner = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate as f64, out_rate as f64, chunk_size)?)
        };
        Ok(Self {
            inner,
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk.as_slice()], None) {
                Ok(resampled) => {
                    if let Some(channel) = resampled.first() {
                        out.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::error!("failed to resample audio chunk: {}", e),
            }
        }
        out
    }

    /// Drops carried-over samples and filter state.
    pub fn reset(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
    }
}

/// Averages interleaved frames down to a single channel.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Decodes a single base64-encoded string into a vector of f32 PCM samples.
pub fn decode(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16) => decode_pcm16(&pcm16),
        Err(e) => {
            tracing::error!("Failed to decode base64 fragment: {}", e);
            Vec::new()
        }
    }
}

/// Interprets little-endian PCM16 bytes as samples normalised to [-1.0, 1.0].
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encodes a slice of i16 samples into a base64 string.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16: Vec<u8> = pcm16.to_binary();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Decodes base64 into raw bytes, without interpreting them.
pub fn decode_base64(data: &str) -> anyhow::Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32.iter().map(|&sample| f32_to_i16(sample)).collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter().flat_map(|&sample| sample.to_le_bytes()).collect()
    }
}
