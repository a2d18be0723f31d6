// crates/genloss-media/src/lib.rs
//
// FFmpeg side of genloss: the `MediaBackend` implementation and the
// background worker that runs pipelines off the caller's thread.
//
// To add a new media step:
//   1. Create a new module file here
//   2. Add `pub mod mymodule;` below
//   3. Call it from backend.rs behind a `MediaBackend` method

pub mod backend;
pub mod degrade;
pub mod error;
pub mod helpers;
pub mod probe;
pub mod remux;
pub mod transcode;
pub mod worker;

pub use backend::FfmpegBackend;
pub use worker::{PipelineWorker, SharedBackend};
pub use genloss_core::{PipelineConfig, PipelineEvent, RunSpec};
