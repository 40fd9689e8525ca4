use serde::Serialize;
use tokio::sync::mpsc;
use crate::error::{EngineError, ErrorKind, ExitOutcome};
use crate::job::{Job, JobId};
use crate::progress::display_percent;
use crate::session::StreamTag;

/// Error details attached to a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for JobFailure {
    fn from(err: &EngineError) -> Self {
        JobFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Everything the queue reports to its collaborator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    JobStarted {
        job: Job,
        command_line: String,
    },
    Output {
        job_id: JobId,
        stream: StreamTag,
        text: String,
    },
    Progress {
        job_id: JobId,
        display_name: String,
        percent: f64,
    },
    JobCompleted {
        job: Job,
        exit_code: i32,
    },
    JobFailed {
        job: Job,
        error: JobFailure,
    },
    JobCancelled {
        job: Job,
        exit: ExitOutcome,
    },
    /// Pending jobs dropped by a cancel; they never run
    PendingCleared {
        job_ids: Vec<JobId>,
    },
    QueueIdle,
}

impl QueueEvent {
    /// Whether this event ends a job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueEvent::JobCompleted { .. } | QueueEvent::JobFailed { .. } | QueueEvent::JobCancelled { .. }
        )
    }

    /// Progress as the integer the user sees
    pub fn display_percent(&self) -> Option<u8> {
        match self {
            QueueEvent::Progress { percent, .. } => Some(display_percent(*percent)),
            _ => None,
        }
    }
}

/// Receiver of queue events
pub trait EventSink {
    fn emit(&mut self, event: QueueEvent);
}

impl EventSink for mpsc::UnboundedSender<QueueEvent> {
    fn emit(&mut self, event: QueueEvent) {
        // A closed receiver means nobody is rendering anymore
        let _ = self.send(event);
    }
}

impl EventSink for Vec<QueueEvent> {
    fn emit(&mut self, event: QueueEvent) {
        self.push(event);
    }
}
