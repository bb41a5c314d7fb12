use std::io;
use std::time::Duration;

use thiserror::Error;

use super::protocol::codes;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("cannot start database worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("database worker has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("cannot write to database worker: {0}")]
    Write(#[source] io::Error),

    #[error("cannot encode worker request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot decode worker reply: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("no worker reply within {0:?}")]
    TimedOut(Duration),

    /// The reply slot was dropped without an answer.
    #[error("worker reply channel closed")]
    Closed,

    #[error("worker reported {code}: {message}")]
    Remote { code: String, message: String },
}

impl WorkerError {
    /// The database (or the worker in front of it) cannot be reached at all,
    /// as opposed to a single statement failing.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Closed | Self::Spawn(_) | Self::MissingPipe(_) | Self::Write(_) => true,
            Self::Remote { code, .. } => matches!(
                code.as_str(),
                codes::WORKER_GONE | codes::CONNECT_FAILED | codes::DRIVER_MISSING
            ),
            _ => false,
        }
    }
}
