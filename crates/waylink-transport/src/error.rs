//! Transport errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to display: {0}")]
    Connect(String),

    #[error("display socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error {code} on {interface}: {message}")]
    Protocol {
        code: u32,
        interface: String,
        message: String,
    },

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}
