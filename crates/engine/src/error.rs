use std::fmt;
use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;

/// How a helper process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Signal number, if the process was killed by a signal (unix only)
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub(crate) fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(sig)) => write!(f, "terminated by signal {}", sig),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A required parameter is missing or out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// The OS could not create the helper process
    #[error("failed to start {}: {reason}", program.display())]
    Spawn { program: PathBuf, reason: String },

    /// The output location could not be prepared
    #[error("failed to prepare {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The helper ran and exited unsuccessfully
    #[error("helper process failed ({0})")]
    RuntimeExit(ExitOutcome),

    /// The queue task has stopped accepting commands
    #[error("job queue is no longer running")]
    QueueClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialisable classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Spawn,
    Filesystem,
    RuntimeExit,
    QueueClosed,
    Io,
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::Spawn { .. } => ErrorKind::Spawn,
            EngineError::Filesystem { .. } => ErrorKind::Filesystem,
            EngineError::RuntimeExit(_) => ErrorKind::RuntimeExit,
            EngineError::QueueClosed => ErrorKind::QueueClosed,
            EngineError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_display() {
        let ok = ExitOutcome { code: Some(0), signal: None };
        assert!(ok.success());
        assert_eq!(ok.to_string(), "exit code 0");

        let killed = ExitOutcome { code: None, signal: Some(15) };
        assert!(!killed.success());
        assert_eq!(killed.to_string(), "terminated by signal 15");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::config("x").kind(), ErrorKind::Config);

        let spawn = EngineError::Spawn {
            program: PathBuf::from("/opt/v2x"),
            reason: "not a file".to_string(),
        };
        assert_eq!(spawn.kind(), ErrorKind::Spawn);
        assert_eq!(spawn.to_string(), "failed to start /opt/v2x: not a file");

        let fs_err = EngineError::Filesystem {
            path: PathBuf::from("/out"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(fs_err.kind(), ErrorKind::Filesystem);
        assert!(fs_err.to_string().contains("/out"));
    }
}
