pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod command;
pub mod session;
pub mod events;
pub mod queue;
pub mod scan;

pub use config::EnhancerConfig;
pub use error::{EngineError, ErrorKind, ExitOutcome};
pub use job::{Backend, Job, JobId, JobMode, JobParams, JobState};
pub use events::{EventSink, JobFailure, QueueEvent};
pub use queue::{JobQueue, QueueCommand, QueueHandle};
pub use session::{ProcessSession, SessionEvent, StreamTag};
