use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use engine::{
    config::EnhancerConfig,
    resolver::PathResolver,
    scan::{self, ScanResult},
    Backend, JobId, JobParams, JobQueue, QueueEvent, QueueHandle, StreamTag,
};
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

/// Batch video upscaling and stabilization through an external AI helper
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print queue events as JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Override the helper executable path
    #[arg(long, global = true)]
    helper: Option<PathBuf>,

    /// Override the directory containing ffmpeg
    #[arg(long, global = true)]
    ffmpeg_dir: Option<PathBuf>,

    /// Write outputs to this folder instead of next to each input
    #[arg(short, long, global = true)]
    output_folder: Option<PathBuf>,

    /// Encoder passed to the helper (empty string disables it)
    #[arg(long, global = true)]
    encoder: Option<String>,

    /// Comma-separated encoder options
    #[arg(long, global = true)]
    encoder_options: Option<String>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Upscale videos with Real-CUGAN
    Upscale {
        /// Upscale ratio (1-4)
        #[arg(short, long, default_value_t = 2)]
        scale: u8,

        /// Processing backend
        #[arg(short, long, value_enum, default_value_t = BackendArg::Gpu)]
        backend: BackendArg,

        /// Real-CUGAN model (defaults to the configured one)
        #[arg(short, long)]
        model: Option<String>,

        /// Video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Interpolate frames with RIFE
    Stabilize {
        /// Interpolation factor (2-8)
        #[arg(short, long, default_value_t = 2)]
        factor: u8,

        /// RIFE model (defaults to the configured one)
        #[arg(short, long)]
        model: Option<String>,

        /// Video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Gpu,
    Cpu,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Gpu => Backend::Gpu,
            BackendArg::Cpu => Backend::Cpu,
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    completed: usize,
    failed: usize,
    cancelled: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logger; --verbose raises the default level to debug
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();

    // Load configuration
    let cfg = effective_config(&args)?;

    let (inputs, params) = match &args.command {
        Mode::Config => {
            let rendered = toml::to_string_pretty(&cfg).context("Failed to render configuration")?;
            print!("{}", rendered);
            return Ok(ExitCode::SUCCESS);
        }
        Mode::Upscale { scale, backend, model, inputs } => (
            inputs,
            JobParams::Upscale {
                model_name: model.clone(),
                scale: *scale,
                backend: (*backend).into(),
            },
        ),
        Mode::Stabilize { factor, model, inputs } => (
            inputs,
            JobParams::Stabilize {
                model_name: model.clone(),
                factor: *factor,
            },
        ),
    };

    // Collect input files
    let mut files = Vec::new();
    for result in scan::collect_inputs(inputs) {
        match result {
            ScanResult::Candidate(path) => files.push(path),
            ScanResult::Skipped(path, reason) => warn!("Skipping {}: {}", path.display(), reason),
        }
    }
    if files.is_empty() {
        eprintln!("No files in batch list to process.");
        return Ok(ExitCode::FAILURE);
    }

    info!("Helper: {}", cfg.helper_path.display());
    match PathResolver::from_env(cfg.ffmpeg_dir.as_deref()).resolve() {
        Some(location) => info!("ffmpeg: {} ({:?})", location.dir.display(), location.source),
        None => warn!("ffmpeg not found; the helper will use its own lookup"),
    }
    debug!("Configuration: {:?}", cfg);

    // Start the queue task and hand it the batch
    let (_cfg_tx, cfg_rx) = watch::channel(cfg);
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
    let (handle, task) = JobQueue::new(cfg_rx, ev_tx).spawn();

    let mut queued = 0;
    for file in &files {
        match handle.enqueue(file, params.clone()) {
            Ok(id) => {
                queued += 1;
                debug!("Queued {} as job {}", file.display(), id);
            }
            Err(e) => eprintln!("Error: {}: {}", file.display(), e),
        }
    }
    if queued == 0 {
        return Ok(ExitCode::FAILURE);
    }
    handle.start().context("Failed to start the job queue")?;

    // Render events until the queue goes idle; Ctrl-C cancels the batch
    let summary = drive(&mut ev_rx, &handle, tokio::signal::ctrl_c(), args.json).await?;

    // Closing the handle lets the queue task finish
    drop(handle);
    task.await.context("Job queue task panicked")?;

    info!(
        "Done: {} completed, {} failed, {} cancelled",
        summary.completed, summary.failed, summary.cancelled
    );

    if summary.failed > 0 || summary.cancelled > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Render queue events until `QueueIdle`, cancelling once when `interrupt` fires.
///
/// The interrupt future lives for the whole run and is polled first on every
/// pass, so a signal is never lost behind a burst of output events.
async fn drive<F>(
    events: &mut mpsc::UnboundedReceiver<QueueEvent>,
    handle: &QueueHandle,
    interrupt: F,
    json: bool,
) -> Result<Summary>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(interrupt);

    let mut summary = Summary::default();
    let mut last_percent = HashMap::new();
    let mut cancelling = false;

    loop {
        tokio::select! {
            biased;

            signal = &mut interrupt, if !cancelling => {
                signal.context("Failed to listen for Ctrl-C")?;
                cancelling = true;
                eprintln!("\n--- Cancelling process ---");
                handle.cancel().context("Failed to cancel the job queue")?;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let idle = matches!(event, QueueEvent::QueueIdle);
                if json {
                    println!("{}", serde_json::to_string(&event).context("Failed to encode event")?);
                } else {
                    render(&event, &mut last_percent);
                }
                tally(&event, &mut summary);
                if idle {
                    break;
                }
            }
        }
    }

    Ok(summary)
}

/// Configuration file plus command-line overrides
fn effective_config(args: &Args) -> Result<EnhancerConfig> {
    let mut cfg = EnhancerConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(helper) = &args.helper {
        cfg.helper_path = helper.clone();
    }
    if let Some(dir) = &args.ffmpeg_dir {
        cfg.ffmpeg_dir = Some(dir.clone());
    }
    if let Some(folder) = &args.output_folder {
        cfg.output_folder = Some(folder.clone());
        cfg.auto_output_path = true;
    }
    if let Some(encoder) = &args.encoder {
        cfg.encoder = encoder.clone();
    }
    if let Some(options) = &args.encoder_options {
        cfg.encoder_options = options.clone();
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(PathBuf::from)) {
        cfg.detect_helper(&exe_dir);
    }

    Ok(cfg)
}

fn render(event: &QueueEvent, last_percent: &mut HashMap<JobId, u8>) {
    match event {
        QueueEvent::JobStarted { job, command_line } => {
            println!("\n--- Processing: {} ---", job.input_path.display());
            println!("Command: {}", command_line);
        }
        QueueEvent::Output { stream, text, .. } => match stream {
            StreamTag::Stdout => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            StreamTag::Stderr => {
                eprint!("{}", text);
            }
        },
        QueueEvent::Progress { job_id, display_name, .. } => {
            let Some(percent) = event.display_percent() else { return };
            if last_percent.insert(*job_id, percent) != Some(percent) {
                info!("{} [{}%]", display_name, percent);
            }
        }
        QueueEvent::JobCompleted { job, .. } => {
            println!("\n--- Finished: {} ---", job.input_path.display());
        }
        QueueEvent::JobFailed { job, error } => {
            eprintln!("\n--- Failed: {}: {} ---", job.input_path.display(), error.message);
        }
        QueueEvent::JobCancelled { job, exit } => {
            eprintln!("\n--- Cancelled: {} ({}) ---", job.input_path.display(), exit);
        }
        QueueEvent::PendingCleared { job_ids } => {
            eprintln!("Dropped {} pending job(s)", job_ids.len());
        }
        QueueEvent::QueueIdle => {
            println!("\n--- All jobs finished ---");
        }
    }
}

fn tally(event: &QueueEvent, summary: &mut Summary) {
    match event {
        QueueEvent::JobCompleted { .. } => summary.completed += 1,
        QueueEvent::JobFailed { .. } => summary.failed += 1,
        QueueEvent::JobCancelled { .. } => summary.cancelled += 1,
        _ => {}
    }
}
