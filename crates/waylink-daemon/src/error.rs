//! Daemon errors.

use thiserror::Error;

/// Errors scoped to a single display connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open display connection: {0}")]
    OpenFailed(#[from] waylink_transport::TransportError),

    #[error("display {0:?} is already open")]
    AlreadyOpen(String),

    #[error("focus group {0:?} already exists")]
    DuplicateGroup(String),

    #[error("failed to watch display socket: {0}")]
    Watch(#[source] std::io::Error),

    #[error("display {name:?} got protocol error {code}")]
    Protocol { name: String, code: i32 },

    #[error("display {name:?} socket hung up or errored")]
    HangupOrError { name: String },
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
