use std::path::Path;
use std::process::Stdio;
use log::{debug, warn};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::{Duration, Instant};
use crate::command::Invocation;
use crate::error::{EngineError, ExitOutcome, Result};

/// Upper bound for a single pipe read
pub const READ_CHUNK_SIZE: usize = 4096;

/// How long pipes may stay open after the process has exited
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTag {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Terminating,
    Exited,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// A chunk read from one of the pipes; not aligned to lines
    Output(StreamTag, Vec<u8>),
    /// Delivered once; the session is finished afterwards
    Exited(ExitOutcome),
}

/// One external helper process, from spawn to reap
pub struct ProcessSession {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pid: Option<u32>,
    state: SessionState,
    exit: Option<ExitOutcome>,
    drain_deadline: Option<Instant>,
}

impl ProcessSession {
    /// Spawn `invocation` with both output streams piped.
    ///
    /// The environment is replaced by the invocation's complete environment.
    pub fn spawn(invocation: &Invocation, cwd: Option<&Path>) -> Result<Self> {
        let program = &invocation.program;
        if !program.is_file() {
            return Err(EngineError::Spawn {
                program: program.clone(),
                reason: "helper executable not found".to_string(),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(&invocation.args)
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        // Own process group, so a terminal Ctrl-C reaches only the front-end
        // and stopping the helper stays with terminate()
        #[cfg(unix)]
        cmd.process_group(0);

        let mut session = ProcessSession {
            child: None,
            stdout: None,
            stderr: None,
            pid: None,
            state: SessionState::Starting,
            exit: None,
            drain_deadline: None,
        };

        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        session.pid = child.id();
        session.stdout = child.stdout.take();
        session.stderr = child.stderr.take();
        session.child = Some(child);
        session.state = SessionState::Running;
        debug!("Spawned helper pid {:?}: {}", session.pid, invocation.command_line());

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the process to stop. Only the first call sends anything.
    pub fn terminate(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        self.state = SessionState::Terminating;

        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Err(e) = send_terminate(child) {
            warn!("Failed to signal helper pid {:?}: {}", self.pid, e);
        }
    }

    /// Wait for the next pipe chunk or the process exit.
    ///
    /// Pipe data is preferred over the exit notification. After the process
    /// exits, data it already wrote is still delivered until both pipes reach
    /// EOF or `EXIT_DRAIN_GRACE` passes. Once `Exited` has been returned the
    /// pipes are dropped unread and every later call pends forever.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            if self.state == SessionState::Exited {
                return std::future::pending().await;
            }
            if let Some(outcome) = self.exit {
                if self.stdout.is_none() && self.stderr.is_none() {
                    self.release();
                    return SessionEvent::Exited(outcome);
                }
            }

            let mut out_buf = [0u8; READ_CHUNK_SIZE];
            let mut err_buf = [0u8; READ_CHUNK_SIZE];
            let drain_deadline = self.drain_deadline;

            tokio::select! {
                biased;

                read = read_pipe(&mut self.stdout, &mut out_buf) => {
                    match read {
                        Some(n) => return SessionEvent::Output(StreamTag::Stdout, out_buf[..n].to_vec()),
                        None => self.stdout = None,
                    }
                }
                read = read_pipe(&mut self.stderr, &mut err_buf) => {
                    match read {
                        Some(n) => return SessionEvent::Output(StreamTag::Stderr, err_buf[..n].to_vec()),
                        None => self.stderr = None,
                    }
                }
                status = wait_child(&mut self.child) => {
                    let outcome = match status {
                        Ok(status) => ExitOutcome::from_status(status),
                        Err(e) => {
                            warn!("Failed to wait for helper pid {:?}: {}", self.pid, e);
                            ExitOutcome { code: None, signal: None }
                        }
                    };
                    debug!("Helper pid {:?} exited: {}", self.pid, outcome);
                    self.child = None;
                    self.exit = Some(outcome);
                    self.drain_deadline = Some(Instant::now() + EXIT_DRAIN_GRACE);
                }
                _ = grace_expired(drain_deadline) => {
                    debug!("Helper pid {:?} left pipes open after exit; dropping them", self.pid);
                    let outcome = self.exit.take().unwrap_or(ExitOutcome { code: None, signal: None });
                    self.release();
                    return SessionEvent::Exited(outcome);
                }
            }
        }
    }

    fn release(&mut self) {
        self.stdout = None;
        self.stderr = None;
        self.child = None;
        self.exit = None;
        self.drain_deadline = None;
        self.state = SessionState::Exited;
    }
}

async fn wait_child(child: &mut Option<Child>) -> std::io::Result<std::process::ExitStatus> {
    match child.as_mut() {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

async fn grace_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read one chunk. `None` means the pipe is closed (EOF or error); a missing
/// pipe never resolves.
async fn read_pipe<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> Option<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = pipe.as_mut() else {
        return std::future::pending().await;
    };
    match reader.read(buf).await {
        Ok(0) => None,
        Ok(n) => Some(n),
        Err(e) => {
            debug!("Pipe read failed: {}", e);
            None
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to our un-reaped child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}
