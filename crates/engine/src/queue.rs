use std::collections::VecDeque;
use std::path::PathBuf;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use crate::command::CommandBuilder;
use crate::config::EnhancerConfig;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, JobFailure, QueueEvent};
use crate::job::{Job, JobId, JobParams, JobState};
use crate::progress::{decode_chunk, extract_progress};
use crate::resolver::PathResolver;
use crate::session::{ProcessSession, SessionEvent};

/// Requests sent to a running queue task
#[derive(Debug)]
pub enum QueueCommand {
    Enqueue(Job),
    Start,
    Cancel,
}

struct RunningJob {
    job: Job,
    session: ProcessSession,
    cancel_requested: bool,
}

/// Sequential job queue
///
/// Holds the pending jobs in FIFO order and at most one running job. A job's
/// exit is what starts the next one; there is no scheduler loop or polling.
pub struct JobQueue<S: EventSink> {
    pending: VecDeque<Job>,
    current: Option<RunningJob>,
    config: watch::Receiver<EnhancerConfig>,
    builder: CommandBuilder,
    sink: S,
}

impl<S: EventSink> JobQueue<S> {
    pub fn new(config: watch::Receiver<EnhancerConfig>, sink: S) -> Self {
        Self::with_builder(config, sink, CommandBuilder::new())
    }

    pub fn with_builder(config: watch::Receiver<EnhancerConfig>, sink: S, builder: CommandBuilder) -> Self {
        JobQueue {
            pending: VecDeque::new(),
            current: None,
            config,
            builder,
            sink,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Id of the running job, if any
    pub fn running_job(&self) -> Option<JobId> {
        self.current.as_ref().map(|r| r.job.id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Append a pending job. Allowed while another job runs.
    pub fn enqueue(&mut self, job: Job) -> Result<JobId> {
        self.admit(job).map_err(|(_, e)| e)
    }

    /// Like `enqueue`, but a rejected job comes back with its error
    fn admit(&mut self, job: Job) -> std::result::Result<JobId, (Job, EngineError)> {
        if job.state != JobState::Pending {
            let err = EngineError::config(format!("job {} is not pending", job.id));
            return Err((job, err));
        }
        if let Err(e) = job.validate() {
            return Err((job, e));
        }

        let id = job.id;
        debug!("Queued job {}: {}", id, job.input_path.display());
        self.pending.push_back(job);
        Ok(id)
    }

    /// Start the next pending job unless one is already running.
    ///
    /// Jobs that fail before their process starts are reported and skipped
    /// in this same loop, so a long run of failures never recurses.
    pub fn start(&mut self) {
        if let Some(running) = &self.current {
            debug!("Job {} is already running; start ignored", running.job.id);
            return;
        }

        loop {
            // Nothing left: the queue is idle
            let Some(mut job) = self.pending.pop_front() else {
                info!("Queue idle");
                self.sink.emit(QueueEvent::QueueIdle);
                return;
            };

            match self.launch(&mut job) {
                Ok((session, command_line)) => {
                    job.state = JobState::Running;
                    job.started_at = Some(Utc::now());
                    info!("Starting job {}: {}", job.id, job.input_path.display());
                    self.sink.emit(QueueEvent::JobStarted {
                        job: job.clone(),
                        command_line,
                    });
                    self.current = Some(RunningJob {
                        job,
                        session,
                        cancel_requested: false,
                    });
                    return;
                }
                // Try the next one in this same pass
                Err(e) => self.fail(job, e),
            }
        }
    }

    /// Stop everything: terminate the running job and drop all pending jobs.
    ///
    /// The running job is only marked cancelled once its process exits.
    pub fn cancel(&mut self) {
        let cleared: Vec<JobId> = self.pending.drain(..).map(|job| job.id).collect();
        if !cleared.is_empty() {
            info!("Cancel cleared {} pending job(s)", cleared.len());
            self.sink.emit(QueueEvent::PendingCleared { job_ids: cleared });
        }

        if let Some(running) = self.current.as_mut() {
            info!("Cancelling job {}", running.job.id);
            running.cancel_requested = true;
            running.session.terminate();
        }
    }

    /// Apply one session event to the running job
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Output(stream, bytes) => {
                let Some(running) = &self.current else {
                    return;
                };
                let job_id = running.job.id;
                let text = decode_chunk(&bytes);
                let progress = extract_progress(&text);

                self.sink.emit(QueueEvent::Output { job_id, stream, text });
                if let Some(percent) = progress {
                    self.sink.emit(QueueEvent::Progress {
                        job_id,
                        display_name: running.job.display_name(),
                        percent,
                    });
                }
            }
            SessionEvent::Exited(exit) => {
                let Some(RunningJob { mut job, cancel_requested, .. }) = self.current.take() else {
                    return;
                };
                job.finished_at = Some(Utc::now());

                // A requested cancel wins over whatever code the process returned
                if cancel_requested {
                    job.state = JobState::Cancelled;
                    info!("Job {} cancelled ({})", job.id, exit);
                    self.sink.emit(QueueEvent::JobCancelled { job, exit });
                } else if exit.success() {
                    job.state = JobState::Completed;
                    info!("Job {} completed: {}", job.id, job.input_path.display());
                    self.sink.emit(QueueEvent::JobCompleted { job, exit_code: 0 });
                } else {
                    self.fail(job, EngineError::RuntimeExit(exit));
                }

                // Advance to the next pending job
                self.start();
            }
        }
    }

    pub fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::Enqueue(job) => {
                // The sender already holds this job's id, so a rejection
                // here must still end the job with an event
                if let Err((job, e)) = self.admit(job) {
                    warn!("Rejected job for {}: {}", job.input_path.display(), e);
                    self.fail(job, e);
                }
            }
            QueueCommand::Start => self.start(),
            QueueCommand::Cancel => self.cancel(),
        }
    }

    /// Resolve, build and spawn a job using a fresh configuration snapshot
    fn launch(&self, job: &mut Job) -> Result<(ProcessSession, String)> {
        // Snapshot configuration for this job only
        let cfg = self.config.borrow().clone();
        job.resolve(&cfg)?;

        if !cfg.helper_is_file() {
            return Err(EngineError::Spawn {
                program: cfg.helper_path.clone(),
                reason: "helper executable not found, check helper_path".to_string(),
            });
        }

        // Build the invocation
        let ffmpeg = PathResolver::from_env(cfg.ffmpeg_dir.as_deref()).resolve();
        let invocation = self
            .builder
            .build(job, &cfg.helper_path, ffmpeg.as_ref().map(|l| l.dir.as_path()))?;
        debug!("Command: {}", invocation.command_line());
        debug!("PATH for job {}: {:?}", job.id, invocation.env_var("PATH"));

        // Spawn the helper
        let session = ProcessSession::spawn(&invocation, cfg.working_dir.as_deref())?;
        Ok((session, invocation.command_line()))
    }

    fn fail(&mut self, mut job: Job, err: EngineError) {
        error!("Job {} failed: {}", job.id, err);
        job.state = JobState::Failed;
        job.finished_at = Some(Utc::now());
        self.sink.emit(QueueEvent::JobFailed {
            job,
            error: JobFailure::from(&err),
        });
    }

    /// Drive the queue until the command channel closes and no job is running.
    ///
    /// This is the single loop: commands, pipe reads and exit notifications
    /// are all handled here, one at a time.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<QueueCommand>) {
        let mut accepting = true;

        loop {
            if !accepting && self.current.is_none() {
                break;
            }

            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("Command channel closed");
                        accepting = false;
                    }
                },
                event = next_running_event(&mut self.current) => self.handle_session_event(event),
            }
        }

        if !self.pending.is_empty() {
            warn!("Queue stopped with {} job(s) never started", self.pending.len());
        }
    }
}

impl<S: EventSink + Send + 'static> JobQueue<S> {
    /// Run the queue as a tokio task and return a handle to it
    pub fn spawn(self) -> (QueueHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (QueueHandle { tx }, task)
    }
}

async fn next_running_event(current: &mut Option<RunningJob>) -> SessionEvent {
    match current {
        Some(running) => running.session.next_event().await,
        None => std::future::pending().await,
    }
}

/// Cloneable front door to a spawned queue
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueCommand>,
}

impl QueueHandle {
    /// Validate and queue a job; parameter errors are returned here
    pub fn enqueue(&self, input_path: impl Into<PathBuf>, params: JobParams) -> Result<JobId> {
        let job = Job::new(input_path, params)?;
        let id = job.id;
        self.send(QueueCommand::Enqueue(job))?;
        Ok(id)
    }

    pub fn start(&self) -> Result<()> {
        self.send(QueueCommand::Start)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(QueueCommand::Cancel)
    }

    fn send(&self, command: QueueCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| EngineError::QueueClosed)
    }
}
