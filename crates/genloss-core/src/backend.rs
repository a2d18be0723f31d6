// crates/genloss-core/src/backend.rs
//
// The seam between the iteration controller and whatever actually touches
// media. genloss-media implements this on top of FFmpeg; tests implement it
// with plain file writes.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::config::{AudioPolicy, TranscodePolicy};
use crate::error::Result;
use crate::media_types::MediaInfo;
use crate::state::TargetRungs;

pub trait MediaBackend {
    /// Cheap check that every codec the pipeline needs is present.
    /// Fails with `BackendUnavailable`.
    fn ensure_available(&self) -> Result<()>;

    /// Read resolution, frame rate and duration of `path`.
    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Re-encode `src` into `dst` at exactly `target`. Returns the rung the
    /// output was encoded at. `cancel` may be polled between frames.
    fn transcode(
        &self,
        src:    &Path,
        dst:    &Path,
        target: TargetRungs,
        policy: &TranscodePolicy,
        cancel: &AtomicBool,
    ) -> Result<TargetRungs>;

    /// Extract and degrade the audio of `video`, writing it to `audio_out`
    /// (overwritten if present).
    fn degrade_audio(&self, video: &Path, audio_out: &Path, policy: &AudioPolicy) -> Result<()>;

    /// Overlay `audio` onto `video`'s own audio track and write the result to
    /// `dst`. Deletes `audio` once the merge has succeeded.
    fn remux(&self, video: &Path, audio: &Path, dst: &Path, policy: &TranscodePolicy) -> Result<()>;
}
