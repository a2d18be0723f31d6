// crates/genloss-core/src/lib.rs
//
// Generation-loss pipeline logic with no FFmpeg dependency: ladders, state,
// errors, scratch handling, PCM degradation and the iteration controller.
// The media backend is a trait (`backend::MediaBackend`); genloss-media
// provides the FFmpeg implementation.

pub mod backend;
pub mod config;
pub mod error;
pub mod helpers;
pub mod ladder;
pub mod media_types;
pub mod pipeline;
pub mod scratch;
pub mod state;

pub use backend::MediaBackend;
pub use config::{AudioPolicy, PipelineConfig, TranscodePolicy};
pub use error::{ErrorCategory, PipelineError};
pub use media_types::{CompressionReport, MediaInfo, PipelineEvent, RunSummary};
pub use pipeline::{run_pipeline, RunSpec};
pub use state::TargetRungs;
