//! Volume estimation shared by capture and playback so both sides report on
//! the same scale.

/// Power-law exponent applied to RMS amplitude. Values below one lift quiet
/// signals so speech registers clearly.
pub const VOLUME_EXPONENT: f32 = 0.6;
/// Gain applied after the power law, before clamping to 1.0.
pub const VOLUME_GAIN: f32 = 3.0;
/// Per-window decay of the smoothed level.
pub const VOLUME_DECAY: f32 = 0.7;

/// Root-mean-square amplitude of a window; 0.0 for an empty window.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Maps an RMS amplitude in [0, 1] to a volume in [0, 1].
/// Non-decreasing in `rms`.
pub fn perceptual_volume(rms: f32) -> f32 {
    if !rms.is_finite() || rms <= 0.0 {
        return 0.0;
    }
    (rms.min(1.0).powf(VOLUME_EXPONENT) * VOLUME_GAIN).min(1.0)
}

/// Smoothed volume: rises immediately, falls off by `decay` per window.
#[derive(Debug, Clone)]
pub struct VolumeMeter {
    level: f32,
    decay: f32,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self::with_decay(VOLUME_DECAY)
    }

    pub fn with_decay(decay: f32) -> Self {
        Self {
            level: 0.0,
            decay: decay.clamp(0.0, 1.0),
        }
    }

    pub fn update(&mut self, samples: &[f32]) -> f32 {
        let target = perceptual_volume(rms(samples));
        self.level = target.max(self.level * self.decay);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Agent,
    Nobody,
}

/// Decides who is talking from the input (microphone) and output (speaker) volumes.
pub fn active_speaker(input: f32, output: f32) -> Speaker {
    if input > output {
        Speaker::User
    } else if output > input {
        Speaker::Agent
    } else {
        Speaker::Nobody
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5);
    }

    #[test]
    fn test_volume_is_bounded_and_non_decreasing() {
        let mut previous = perceptual_volume(0.0);
        assert_eq!(previous, 0.0);
        for step in 1..=1000 {
            let v = perceptual_volume(step as f32 / 1000.0);
            assert!(v >= previous, "volume dropped at step {}", step);
            assert!((0.0..=1.0).contains(&v));
            previous = v;
        }
        assert_eq!(perceptual_volume(1.0), 1.0);
        assert_eq!(perceptual_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_meter_decays() {
        let mut meter = VolumeMeter::with_decay(0.5);
        let loud = meter.update(&[0.5; 64]);
        assert_eq!(loud, 1.0);
        assert_eq!(meter.update(&[0.0; 64]), 0.5);
        assert_eq!(meter.update(&[0.0; 64]), 0.25);
        meter.reset();
        assert_eq!(meter.level(), 0.0);
    }

    #[test]
    fn test_active_speaker() {
        assert_eq!(active_speaker(0.4, 0.1), Speaker::User);
        assert_eq!(active_speaker(0.1, 0.4), Speaker::Agent);
        assert_eq!(active_speaker(0.0, 0.0), Speaker::Nobody);
    }
}
