// crates/genloss-media/src/backend.rs
//
// `MediaBackend` on top of in-process FFmpeg.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::encoder;

use genloss_core::config::{AudioPolicy, TranscodePolicy};
use genloss_core::error::Result;
use genloss_core::{MediaBackend, MediaInfo, PipelineError, TargetRungs};

use crate::degrade::degrade_audio;
use crate::probe::probe_media;
use crate::remux::remux;
use crate::transcode::transcode_generation;

/// Encoders a run cannot do without.
const REQUIRED_ENCODERS: [(CodecId, &str); 3] = [
    (CodecId::H264, "H.264 (libx264)"),
    (CodecId::AAC,  "AAC"),
    (CodecId::MP3,  "MP3 (libmp3lame)"),
];

pub struct FfmpegBackend {
    _priv: (),
}

impl FfmpegBackend {
    /// Initialise the FFmpeg libraries. Safe to call more than once.
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| PipelineError::BackendUnavailable(format!("ffmpeg init: {e}")))?;
        Ok(Self { _priv: () })
    }
}

impl MediaBackend for FfmpegBackend {
    fn ensure_available(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_ENCODERS
            .iter()
            .filter(|(id, _)| encoder::find(*id).is_none())
            .map(|(_, name)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::BackendUnavailable(format!(
                "linked FFmpeg lacks encoder(s): {}",
                missing.join(", "),
            )));
        }
        Ok(())
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        probe_media(path).map_err(PipelineError::Probe)
    }

    fn transcode(
        &self,
        src:    &Path,
        dst:    &Path,
        target: TargetRungs,
        policy: &TranscodePolicy,
        cancel: &AtomicBool,
    ) -> Result<TargetRungs> {
        transcode_generation(src, dst, target, policy, cancel)
            .map_err(|e| e.into_pipeline(PipelineError::TranscodeFailure))
    }

    fn degrade_audio(&self, video: &Path, audio_out: &Path, policy: &AudioPolicy) -> Result<()> {
        degrade_audio(video, audio_out, policy)
            .map_err(|e| e.into_pipeline(PipelineError::AudioDegradeFailure))
    }

    fn remux(&self, video: &Path, audio: &Path, dst: &Path, policy: &TranscodePolicy) -> Result<()> {
        remux(video, audio, dst, policy)
            .map_err(|e| e.into_pipeline(PipelineError::RemuxFailure))
    }
}
