// crates/genloss-core/src/media_types.rs
//
// Types that flow between the pipeline, the FFmpeg backend and front ends.
// No ffmpeg here, just plain data.

use std::path::PathBuf;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::helpers::time::format_duration;
use crate::ladder::{FrameRateRung, ResolutionRung};

/// What the prober measured. Values are raw, not yet snapped to a ladder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaInfo {
    pub width:         u32,
    pub height:        u32,
    /// Average frame rate rounded to whole frames per second.
    pub frame_rate:    u32,
    pub duration_secs: f64,
}

impl MediaInfo {
    pub fn resolution(&self) -> ResolutionRung {
        ResolutionRung::new(self.width, self.height)
    }
}

impl std::fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}fps, {}",
            self.width, self.height, self.frame_rate, format_duration(self.duration_secs))
    }
}

/// Emitted once per completed generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompressionReport {
    /// 1-based.
    pub generation:        u32,
    pub total_generations: u32,
    pub resolution:        ResolutionRung,
    pub frame_rate:        FrameRateRung,
}

impl CompressionReport {
    /// Share of the run finished once this generation is done, 0–100.
    pub fn percent(&self) -> u8 {
        let total = self.total_generations.max(1) as u64;
        ((self.generation.min(self.total_generations) as u64 * 100) / total) as u8
    }
}

impl std::fmt::Display for CompressionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generation {}/{}: {}@{}fps",
            self.generation, self.total_generations, self.resolution, self.frame_rate)
    }
}

/// Returned by a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id:           Uuid,
    pub destination:      PathBuf,
    pub generations:      u32,
    pub final_resolution: ResolutionRung,
    pub final_frame_rate: FrameRateRung,
}

impl RunSummary {
    /// Human-readable completion message.
    pub fn status(&self) -> String {
        format!(
            "done: {} generation(s), final quality {}@{}fps, saved to {}",
            self.generations,
            self.final_resolution,
            self.final_frame_rate,
            self.destination.display(),
        )
    }
}

/// Results sent from a background pipeline run to whoever dispatched it.
#[derive(Debug)]
pub enum PipelineEvent {
    Progress { job_id: Uuid, report: CompressionReport },
    Done     { job_id: Uuid, summary: RunSummary },
    Failed   { job_id: Uuid, error: PipelineError },
}
