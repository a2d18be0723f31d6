// crates/genloss-media/src/error.rs
//
// Internal error for one media step. Keeps "FFmpeg can't do this at all"
// apart from "this particular file broke", which the pipeline reports as
// different error kinds.

use genloss_core::PipelineError;

#[derive(Debug)]
pub enum StepError {
    /// A required codec or muxer is not compiled into the linked FFmpeg.
    Unavailable(String),
    /// Anything else: bad input, I/O, codec error.
    Failed(String),
}

impl From<String> for StepError {
    fn from(msg: String) -> Self { StepError::Failed(msg) }
}

impl From<&str> for StepError {
    fn from(msg: &str) -> Self { StepError::Failed(msg.to_string()) }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Unavailable(m) | StepError::Failed(m) => f.write_str(m),
        }
    }
}

impl StepError {
    /// Map onto the pipeline taxonomy; `failed` picks the step's own variant.
    pub fn into_pipeline(self, failed: fn(String) -> PipelineError) -> PipelineError {
        match self {
            StepError::Unavailable(m) => PipelineError::BackendUnavailable(m),
            StepError::Failed(m)      => failed(m),
        }
    }
}
