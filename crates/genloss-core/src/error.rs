// crates/genloss-core/src/error.rs
//
// One variant per failure kind so callers branch on the kind, not on message
// text. Every variant carries the underlying cause; `hint()` adds the
// actionable part shown to the user.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input video not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("media backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("could not read video properties: {0}")]
    Probe(String),

    #[error("video transcode failed: {0}")]
    TranscodeFailure(String),

    #[error("audio degrade failed: {0}")]
    AudioDegradeFailure(String),

    #[error("audio/video remux failed: {0}")]
    RemuxFailure(String),

    #[error("scratch file operation failed ({context}): {source}")]
    ScratchIo {
        context: String,
        #[source]
        source:  std::io::Error,
    },

    #[error("could not export final video to {}: {source}", path.display())]
    FinalExport {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("iteration count {given} is outside 1..={max}")]
    InvalidIterations { given: u32, max: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled after {completed} generation(s)")]
    Cancelled { completed: u32 },
}

/// Coarse cause class used to pick the user-facing hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// FFmpeg missing, misconfigured, or built without a required codec.
    Backend,
    /// Missing, unreadable, or unsupported input.
    Input,
    /// Permission / disk / filesystem trouble.
    Io,
    /// Bad arguments or an aborted run.
    Usage,
}

impl PipelineError {
    pub fn scratch_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::ScratchIo { context: context.into(), source }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BackendUnavailable(_) => ErrorCategory::Backend,
            Self::InputNotFound(_)
            | Self::Probe(_)
            | Self::TranscodeFailure(_)
            | Self::AudioDegradeFailure(_)
            | Self::RemuxFailure(_) => ErrorCategory::Input,
            Self::ScratchIo { .. } | Self::FinalExport { .. } => ErrorCategory::Io,
            Self::InvalidIterations { .. }
            | Self::InvalidConfig(_)
            | Self::Cancelled { .. } => ErrorCategory::Usage,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) =>
                "check that FFmpeg is installed and built with libx264, AAC and libmp3lame",
            Self::InputNotFound(_) =>
                "check the input path and that the file is readable",
            Self::Probe(_) =>
                "the input may not be a video file, or it may be corrupt",
            Self::TranscodeFailure(_) =>
                "the input video stream may be corrupt or use an unsupported codec",
            Self::AudioDegradeFailure(_) =>
                "the video may have no audio track, or its audio codec is unsupported",
            Self::RemuxFailure(_) =>
                "the temporary audio file may be missing or unreadable",
            Self::ScratchIo { .. } =>
                "check free disk space and write permission on the scratch directory, \
                 and that the input is not locked by another program",
            Self::FinalExport { .. } =>
                "check that the output directory exists and is writable",
            Self::InvalidIterations { .. } =>
                "choose an iteration count within the allowed range",
            Self::InvalidConfig(_) =>
                "check the pipeline configuration",
            Self::Cancelled { .. } =>
                "the run was stopped before finishing; no output was written",
        }
    }

    /// Message plus hint, for display to an end user.
    pub fn status(&self) -> String {
        format!("{self} ({})", self.hint())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
