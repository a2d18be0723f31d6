// crates/genloss-media/src/worker.rs
//
// PipelineWorker: runs pipelines on background threads and reports back over
// a channel. Each run gets its own thread and its own cancel flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use genloss_core::{run_pipeline, MediaBackend, PipelineConfig, PipelineError, PipelineEvent, RunSpec};

pub type SharedBackend = Arc<dyn MediaBackend + Send + Sync>;

pub struct PipelineWorker {
    /// Progress, completion and failure events for every job.
    pub rx:   Receiver<PipelineEvent>,
    tx:       Sender<PipelineEvent>,
    backend:  SharedBackend,
    config:   Arc<PipelineConfig>,
    shutdown: Arc<AtomicBool>,
    /// Per-job cancel flags, keyed by job id. Inserted by `start`, removed
    /// when the job's thread exits.
    cancels:  Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl PipelineWorker {
    pub fn new(backend: SharedBackend, config: PipelineConfig) -> Self {
        let (tx, rx) = bounded(512);
        Self {
            rx,
            tx,
            backend,
            config:   Arc::new(config),
            shutdown: Arc::new(AtomicBool::new(false)),
            cancels:  Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start `spec` on its own thread. Returns the job id events are tagged
    /// with (`spec.run_id`).
    pub fn start(&self, spec: RunSpec) -> Uuid {
        let job_id  = spec.run_id;
        let cancel  = Arc::new(AtomicBool::new(false));
        let tx      = self.tx.clone();
        let sd      = Arc::clone(&self.shutdown);
        let backend = Arc::clone(&self.backend);
        let config  = Arc::clone(&self.config);

        // Register before spawning so an immediate `cancel` can't miss it.
        self.cancels.lock().insert(job_id, Arc::clone(&cancel));

        let cancels_ref = Arc::clone(&self.cancels);
        thread::spawn(move || {
            if sd.load(Ordering::Relaxed) {
                log::warn!("[worker] {job_id}: worker shutting down, run not started");
                let _ = tx.send(PipelineEvent::Failed {
                    job_id,
                    error: PipelineError::Cancelled { completed: 0 },
                });
                cancels_ref.lock().remove(&job_id);
                return;
            }

            log::debug!("[worker] {job_id}: started");
            let progress_tx = tx.clone();
            let result = run_pipeline(
                backend.as_ref(),
                &config,
                &spec,
                &cancel,
                &mut |report| {
                    let _ = progress_tx.send(PipelineEvent::Progress { job_id, report: *report });
                },
            );

            let event = match result {
                Ok(summary) => PipelineEvent::Done { job_id, summary },
                Err(error)  => {
                    log::warn!("[worker] {job_id}: {error}");
                    PipelineEvent::Failed { job_id, error }
                }
            };
            let _ = tx.send(event);

            // Drop the flag once the job is done so the map doesn't grow
            // with every run over the worker's life.
            cancels_ref.lock().remove(&job_id);
        });

        job_id
    }

    /// Ask job `job_id` to stop. It finishes its current frame, cleans up and
    /// sends `Failed` with `PipelineError::Cancelled`.
    pub fn cancel(&self, job_id: Uuid) {
        if let Some(flag) = self.cancels.lock().get(&job_id) {
            log::info!("[worker] {job_id}: cancel requested");
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Number of jobs whose threads haven't exited yet.
    pub fn active_jobs(&self) -> usize {
        self.cancels.lock().len()
    }

    /// Cancel every running job and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for flag in self.cancels.lock().values() {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use genloss_core::config::{AudioPolicy, TranscodePolicy};
    use genloss_core::error::Result;
    use genloss_core::{MediaInfo, TargetRungs};

    const WAIT: Duration = Duration::from_secs(10);

    /// File-copying stand-in for FFmpeg. With `block_until_cancel` set the
    /// transcode step parks until its cancel flag flips.
    struct FakeBackend {
        block_until_cancel: bool,
    }

    impl MediaBackend for FakeBackend {
        fn ensure_available(&self) -> Result<()> { Ok(()) }

        fn probe(&self, _path: &Path) -> Result<MediaInfo> {
            Ok(MediaInfo { width: 1920, height: 1080, frame_rate: 60, duration_secs: 2.0 })
        }

        fn transcode(
            &self,
            _src:    &Path,
            dst:     &Path,
            target:  TargetRungs,
            _policy: &TranscodePolicy,
            cancel:  &AtomicBool,
        ) -> Result<TargetRungs> {
            if self.block_until_cancel {
                while !cancel.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(5));
                }
                return Err(PipelineError::TranscodeFailure("cancelled".into()));
            }
            std::fs::write(dst, b"video").unwrap();
            Ok(target)
        }

        fn degrade_audio(&self, _video: &Path, audio_out: &Path, _policy: &AudioPolicy) -> Result<()> {
            std::fs::write(audio_out, b"audio").unwrap();
            Ok(())
        }

        fn remux(&self, video: &Path, audio: &Path, dst: &Path, _policy: &TranscodePolicy) -> Result<()> {
            std::fs::copy(video, dst).unwrap();
            std::fs::remove_file(audio).unwrap();
            Ok(())
        }
    }

    fn setup(block: bool) -> (tempfile::TempDir, PipelineWorker, RunSpec) {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.mp4");
        std::fs::write(&input, b"source").unwrap();
        let config = PipelineConfig::default().with_scratch_root(tmp.path().join("scratch"));
        let worker = PipelineWorker::new(Arc::new(FakeBackend { block_until_cancel: block }), config);
        let spec = RunSpec::new(input, tmp.path().join("out.mp4"), 3);
        (tmp, worker, spec)
    }

    #[test]
    fn run_reports_progress_then_done() {
        let (_tmp, worker, spec) = setup(false);
        let output = spec.output.clone();
        let job = worker.start(spec);

        let mut generations = Vec::new();
        loop {
            match worker.rx.recv_timeout(WAIT).unwrap() {
                PipelineEvent::Progress { job_id, report } => {
                    assert_eq!(job_id, job);
                    generations.push(report.generation);
                }
                PipelineEvent::Done { job_id, summary } => {
                    assert_eq!(job_id, job);
                    assert_eq!(summary.generations, 3);
                    break;
                }
                PipelineEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
            }
        }
        assert_eq!(generations, vec![1, 2, 3]);
        assert!(output.exists());
    }

    #[test]
    fn cancel_stops_a_running_job() {
        let (_tmp, worker, spec) = setup(true);
        let output = spec.output.clone();
        let job = worker.start(spec);
        worker.cancel(job);

        match worker.rx.recv_timeout(WAIT).unwrap() {
            PipelineEvent::Failed { job_id, error } => {
                assert_eq!(job_id, job);
                assert!(matches!(error, PipelineError::Cancelled { completed: 0 }));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn shutdown_refuses_new_jobs() {
        let (_tmp, worker, spec) = setup(false);
        worker.shutdown();
        let job = worker.start(spec);
        match worker.rx.recv_timeout(WAIT).unwrap() {
            PipelineEvent::Failed { job_id, error } => {
                assert_eq!(job_id, job);
                assert!(matches!(error, PipelineError::Cancelled { .. }));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn cancel_unknown_job_is_a_no_op() {
        let (_tmp, worker, _spec) = setup(false);
        worker.cancel(Uuid::new_v4());
        assert_eq!(worker.active_jobs(), 0);
    }
}
