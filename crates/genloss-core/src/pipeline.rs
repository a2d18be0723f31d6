// crates/genloss-core/src/pipeline.rs
//
// Iteration controller: runs N generations of transcode → audio degrade →
// remux over a single working file, then promotes it to the destination.
//
// Design:
//   • `RunSpec`     : input, output, generation count, run id.
//   • `run_pipeline`: blocking; every backend call finishes before the next
//     starts. Generation i+1 reads generation i's output, so nothing here can
//     run in parallel. Dispatch onto a thread is the caller's business
//     (see genloss-media's PipelineWorker).
//
// Failure model:
//   Anything before the promote step that fails aborts the run. The
//   destination is only ever written by the final move, so an aborted run
//   leaves it untouched; the working file stays in the run's scratch
//   directory for inspection. Per-generation scratch files are RAII handles
//   and go away on every exit path.
//
// Cancellation:
//   `cancel` is polled before each generation and handed to the transcoder,
//   which may poll it per frame.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::backend::MediaBackend;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::media_types::{CompressionReport, RunSummary};
use crate::scratch::{move_file, ScratchArea};
use crate::state::GenerationState;

/// Complete description of one run.
#[derive(Clone, Debug)]
pub struct RunSpec {
    /// Names the run's scratch directory and tags its events.
    pub run_id:     Uuid,
    pub input:      PathBuf,
    /// Overwritten if it already exists.
    pub output:     PathBuf,
    pub iterations: u32,
}

impl RunSpec {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, iterations: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input:  input.into(),
            output: output.into(),
            iterations,
        }
    }
}

/// Run every generation of `spec`. Blocking.
///
/// `on_progress` is called on this thread after each completed generation.
pub fn run_pipeline<B: MediaBackend + ?Sized>(
    backend:     &B,
    config:      &PipelineConfig,
    spec:        &RunSpec,
    cancel:      &AtomicBool,
    on_progress: &mut dyn FnMut(&CompressionReport),
) -> Result<RunSummary> {
    // ── Preflight: nothing on disk is touched until all of this passes ────────
    config.validate_iterations(spec.iterations)?;
    if !spec.input.is_file() {
        return Err(PipelineError::InputNotFound(spec.input.clone()));
    }
    if same_file(&spec.input, &spec.output) {
        return Err(PipelineError::InvalidConfig(
            "output path must differ from the input path".into(),
        ));
    }
    backend.ensure_available()?;

    let res_ladder = &config.resolution_ladder;
    let fps_ladder = &config.frame_rate_ladder;
    let total      = spec.iterations;

    // ── Scratch area + working copy ───────────────────────────────────────────
    let scratch = ScratchArea::create(&config.scratch_root, spec.run_id)?;
    let working = scratch.working_path();
    std::fs::copy(&spec.input, &working).map_err(|e| {
        PipelineError::scratch_io(format!("copy '{}' to working file", spec.input.display()), e)
    })?;

    // ── Initial rung ──────────────────────────────────────────────────────────
    let info = backend.probe(&working)?;
    let mut state = GenerationState::snapped(info.resolution(), info.frame_rate, res_ladder, fps_ladder);
    log::info!(
        "[pipeline] {} ← {}; starting at {}@{}fps, {} generation(s)",
        info, spec.input.display(),
        state.resolution(res_ladder), state.frame_rate(fps_ladder), total,
    );

    let mut last_report: Option<CompressionReport> = None;

    // ── Generation loop ───────────────────────────────────────────────────────
    for generation in 1..=total {
        let completed = generation - 1;
        if cancel.load(Ordering::Relaxed) {
            return Err(PipelineError::Cancelled { completed });
        }

        let gen_out = scratch.generation_output(generation);
        let audio   = scratch.audio_file();

        let target = state.next_targets(res_ladder, fps_ladder);
        if state.at_floor(res_ladder, fps_ladder) {
            log::debug!("[pipeline] generation {generation}: already at ladder floor");
        }

        let achieved = backend
            .transcode(&working, gen_out.path(), target, &config.transcode, cancel)
            .map_err(|e| {
                if cancel.load(Ordering::Relaxed) { PipelineError::Cancelled { completed } } else { e }
            })?;
        state.record_achieved(achieved, res_ladder, fps_ladder);

        backend.degrade_audio(gen_out.path(), audio.path(), &config.audio)?;
        backend.remux(gen_out.path(), audio.path(), &working, &config.transcode)?;

        let report = CompressionReport {
            generation,
            total_generations: total,
            resolution:        achieved.resolution,
            frame_rate:        achieved.frame_rate,
        };
        log::info!("[pipeline] {report}");
        on_progress(&report);
        last_report = Some(report);

        // Explicit so the deletion happens before the next generation starts.
        drop(audio);
        drop(gen_out);
    }

    // ── Promote ───────────────────────────────────────────────────────────────
    move_file(&working, &spec.output).map_err(|e| PipelineError::FinalExport {
        path:   spec.output.clone(),
        source: e,
    })?;
    log::info!("[pipeline] exported {}", spec.output.display());

    scratch.finish();

    let last = last_report.ok_or_else(|| PipelineError::InvalidConfig("no generation ran".into()))?;
    Ok(RunSummary {
        run_id:           spec.run_id,
        destination:      spec.output.clone(),
        generations:      total,
        final_resolution: last.resolution,
        final_frame_rate: last.frame_rate,
    })
}

fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    if a == b { return true; }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}
