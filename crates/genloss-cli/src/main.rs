// crates/genloss-cli/src/main.rs
//
// `genloss`: run a video through N generations of lossy re-encoding.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use genloss_core::{PipelineConfig, PipelineError, PipelineEvent, RunSpec};
use genloss_media::{FfmpegBackend, PipelineWorker};

#[derive(Parser)]
#[command(name = "genloss")]
#[command(about = "Degrade a video through repeated lossy generations")]
struct Cli {
    /// Source video file
    input: PathBuf,
    /// Destination video file (overwritten if it exists)
    output: PathBuf,
    /// Number of generations; overrides --preset
    #[arg(short = 'n', long)]
    iterations: Option<u32>,
    /// Named generation count
    #[arg(long, value_enum, default_value_t = Preset::Medium)]
    preset: Preset,
    /// Directory for per-run scratch files (default: <temp>/genloss)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Fixed seed for the audio noise bed
    #[arg(long)]
    seed: Option<u64>,
    /// Print one JSON object per generation on stdout
    #[arg(long)]
    json: bool,
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// 5 generations
    Light,
    /// 10 generations
    Medium,
    /// 20 generations
    Heavy,
}

impl Preset {
    fn iterations(self) -> u32 {
        match self {
            Preset::Light  => 5,
            Preset::Medium => 10,
            Preset::Heavy  => 20,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if let Some(pe) = e.downcast_ref::<PipelineError>() {
                eprintln!("hint: {}", pe.hint());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::default();
    if let Some(dir) = cli.scratch_dir {
        config = config.with_scratch_root(dir);
    }
    config.audio.noise_seed = cli.seed;

    let iterations = cli.iterations.unwrap_or_else(|| cli.preset.iterations());
    let spec = RunSpec::new(cli.input, cli.output, iterations);
    let input_name = spec.input.display().to_string();

    let backend = FfmpegBackend::new().context("starting FFmpeg")?;
    let worker  = PipelineWorker::new(Arc::new(backend), config);
    let job     = worker.start(spec);
    log::debug!("[cli] job {job}: {iterations} generation(s) of '{input_name}'");

    loop {
        let event = worker.rx.recv().context("pipeline worker stopped unexpectedly")?;
        match event {
            PipelineEvent::Progress { job_id, report } if job_id == job => {
                if cli.json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    eprintln!("[{:>3}%] {report}", report.percent());
                }
            }
            PipelineEvent::Done { job_id, summary } if job_id == job => {
                eprintln!("{}", summary.status());
                return Ok(());
            }
            PipelineEvent::Failed { job_id, error } if job_id == job => {
                return Err(error).with_context(|| format!("degrading '{input_name}'"));
            }
            _ => {}
        }
    }
}
