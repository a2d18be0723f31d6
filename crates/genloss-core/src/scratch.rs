// crates/genloss-core/src/scratch.rs
//
// Scratch storage for one run.
//
// Layout:
//   <scratch_root>/<run-id>/working.mp4         the working artifact
//   <scratch_root>/<run-id>/gen_<i>.mp4         per-generation transcode output
//   <scratch_root>/<run-id>/degraded_audio.mp3  per-generation degraded audio
//
// Each run gets its own directory, so two runs sharing a scratch root never
// touch each other's files. Per-generation files are `ScratchFile` handles
// that delete themselves on drop, whichever way the generation exits.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

const WORKING_NAME: &str = "working.mp4";
const AUDIO_NAME:   &str = "degraded_audio.mp3";

/// Per-run scratch directory.
#[derive(Debug)]
pub struct ScratchArea {
    run_id: Uuid,
    dir:    PathBuf,
}

impl ScratchArea {
    /// Create `root` if absent (no error if it already exists), then the run's
    /// own subdirectory.
    pub fn create(root: &Path, run_id: Uuid) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            PipelineError::scratch_io(format!("create scratch root '{}'", root.display()), e)
        })?;
        let dir = root.join(run_id.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| {
            PipelineError::scratch_io(format!("create run directory '{}'", dir.display()), e)
        })?;
        log::debug!("[scratch] run directory {}", dir.display());
        Ok(Self { run_id, dir })
    }

    pub fn run_id(&self) -> Uuid { self.run_id }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Path of the working artifact. Not a `ScratchFile`: on failure it is
    /// left behind on purpose, and on success it is moved out.
    pub fn working_path(&self) -> PathBuf {
        self.dir.join(WORKING_NAME)
    }

    /// Transcode output for generation `generation` (1-based). Distinct per
    /// generation and never equal to the working artifact.
    pub fn generation_output(&self, generation: u32) -> ScratchFile {
        ScratchFile::new(self.dir.join(format!("gen_{generation}.mp4")))
    }

    /// Degraded-audio file for the current generation.
    pub fn audio_file(&self) -> ScratchFile {
        ScratchFile::new(self.dir.join(AUDIO_NAME))
    }

    /// Remove the run directory after a successful promote. Best effort.
    pub fn finish(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[scratch] could not remove run directory '{}': {e}", self.dir.display());
            }
        }
    }
}

/// A transient file that is deleted when the handle is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        remove_file_logged(&self.path);
    }
}

/// Delete `path` if it exists. Failures are logged, never raised.
/// Returns true when a file was actually removed.
pub fn remove_file_logged(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("[scratch] removed {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("[scratch] could not remove '{}': {e}", path.display());
            false
        }
    }
}

/// Move `src` to `dst`, overwriting `dst`. Falls back to copy + delete when a
/// plain rename is not possible (e.g. across filesystems).
pub fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            log::debug!("[scratch] rename failed ({rename_err}); copying instead");
            copy_then_replace(src, dst)?;
            remove_file_logged(src);
            Ok(())
        }
    }
}

/// Copy `src` next to `dst` under a temporary name, then rename it over
/// `dst`. An existing `dst` is untouched until the copy is complete.
fn copy_then_replace(src: &Path, dst: &Path) -> std::io::Result<()> {
    let partial = partial_path(dst);
    let result = std::fs::copy(src, &partial).and_then(|_| std::fs::rename(&partial, dst));
    if result.is_err() {
        remove_file_logged(&partial);
    }
    result
}

/// `<dst>.genloss-partial`, in the same directory so the final rename stays
/// on one filesystem.
fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".genloss-partial");
    dst.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("scratch");
        let a = ScratchArea::create(&root, Uuid::new_v4()).unwrap();
        let b = ScratchArea::create(&root, Uuid::new_v4()).unwrap();
        assert!(a.dir().is_dir());
        assert!(b.dir().is_dir());
        assert_ne!(a.dir(), b.dir());
        // Same run id twice is also fine.
        ScratchArea::create(&root, a.run_id()).unwrap();
    }

    #[test]
    fn generation_paths_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let area = ScratchArea::create(tmp.path(), Uuid::new_v4()).unwrap();
        let g1 = area.generation_output(1);
        let g2 = area.generation_output(2);
        assert_ne!(g1.path(), g2.path());
        assert_ne!(g1.path(), area.working_path());
        assert_ne!(area.audio_file().path(), area.working_path());
    }

    #[test]
    fn scratch_file_deletes_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("x.mp4");
        std::fs::write(&p, b"data").unwrap();
        {
            let _f = ScratchFile::new(p.clone());
        }
        assert!(!p.exists());
        // Dropping a handle whose file never existed is quiet.
        drop(ScratchFile::new(tmp.path().join("never.mp4")));
    }

    #[test]
    fn move_file_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a");
        let dst = tmp.path().join("b");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(&dst, b"old").unwrap();
        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn failed_move_keeps_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("out.mp4");
        std::fs::write(&dst, b"precious").unwrap();

        assert!(move_file(&tmp.path().join("missing.mp4"), &dst).is_err());
        assert_eq!(std::fs::read(&dst).unwrap(), b"precious");
        assert!(!partial_path(&dst).exists());
    }

    #[test]
    fn copy_fallback_replaces_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("working.mp4");
        let dst = tmp.path().join("out.mp4");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(&dst, b"old").unwrap();

        copy_then_replace(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
        assert!(!partial_path(&dst).exists());
    }

    #[test]
    fn finish_removes_run_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let area = ScratchArea::create(tmp.path(), Uuid::new_v4()).unwrap();
        let dir = area.dir().to_path_buf();
        area.finish();
        assert!(!dir.exists());
        assert!(tmp.path().is_dir());
    }
}
