// crates/genloss-core/src/config.rs
//
// Run configuration. Built in code (or from CLI flags) and handed to the
// pipeline by value; nothing here is read from or written to disk.

use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::ladder::{
    default_frame_rate_ladder, default_resolution_ladder, FrameRateRung, Ladder, ResolutionRung,
};

/// Upper bound on generations per run.
pub const MAX_ITERATIONS: u32 = 50;

/// Fixed video quality policy applied on every generation.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscodePolicy {
    /// x264 constant-rate factor. 28 lands around 1.5 Mbps for 720p content.
    pub crf:           u8,
    pub preset:        String,
    pub audio_rate:    u32,
    pub audio_bitrate: usize,
}

impl Default for TranscodePolicy {
    fn default() -> Self {
        Self {
            crf:           28,
            preset:        "ultrafast".into(),
            audio_rate:    44_100,
            audio_bitrate: 128_000,
        }
    }
}

/// Fixed audio degradation policy.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPolicy {
    pub sample_rate:   u32,
    /// Bits kept per sample after quantisation.
    pub bit_depth:     u32,
    pub cutoff_hz:     f32,
    /// Gain applied to the full-scale noise bed, in dB.
    pub noise_gain_db: f32,
    /// MP3 export bitrate, bits per second.
    pub bitrate:       usize,
    /// Fixed seed for reproducible noise; `None` draws from entropy.
    pub noise_seed:    Option<u64>,
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            sample_rate:   22_050,
            bit_depth:     8,
            cutoff_hz:     2_000.0,
            noise_gain_db: -40.0,
            bitrate:       50_000,
            noise_seed:    None,
        }
    }
}

/// Everything a run needs besides its input, output and iteration count.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub resolution_ladder: Ladder<ResolutionRung>,
    pub frame_rate_ladder: Ladder<FrameRateRung>,
    /// Root under which each run gets its own `<run-id>/` directory.
    pub scratch_root:      PathBuf,
    pub max_iterations:    u32,
    pub transcode:         TranscodePolicy,
    pub audio:             AudioPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution_ladder: default_resolution_ladder(),
            frame_rate_ladder: default_frame_rate_ladder(),
            scratch_root:      default_scratch_root(),
            max_iterations:    MAX_ITERATIONS,
            transcode:         TranscodePolicy::default(),
            audio:             AudioPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Rejects iteration counts outside `1..=max_iterations`.
    pub fn validate_iterations(&self, iterations: u32) -> Result<()> {
        if iterations == 0 || iterations > self.max_iterations {
            return Err(PipelineError::InvalidIterations {
                given: iterations,
                max:   self.max_iterations,
            });
        }
        Ok(())
    }
}

/// `<system temp>/genloss`.
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("genloss")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_bounds() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate_iterations(0).is_err());
        assert!(cfg.validate_iterations(1).is_ok());
        assert!(cfg.validate_iterations(MAX_ITERATIONS).is_ok());
        assert!(matches!(
            cfg.validate_iterations(MAX_ITERATIONS + 1),
            Err(PipelineError::InvalidIterations { given: 51, max: 50 })
        ));
    }
}
