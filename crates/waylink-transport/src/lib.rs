//! Display transport abstraction for waylink.
//!
//! This crate defines the [`DisplayTransport`] and [`Connector`] traits that
//! a display-server client library must implement for the connection manager
//! to drive it. The Wayland backend lives behind the `wayland` feature and a
//! scriptable mock backend behind the `mock` feature.

use std::os::fd::BorrowedFd;

pub mod error;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "wayland")]
pub mod wayland;

pub use error::TransportError;

/// Outcome of a single non-blocking read from the display socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes were read; more may still be buffered in the socket.
    Read(usize),
    /// Nothing was available to read.
    WouldBlock,
    /// The read failed. The failure surfaces through the next dispatch.
    Failed,
}

/// One client-side connection to a display server.
///
/// Mirrors the prepare-read/read/dispatch/flush cycle of the protocol
/// library. None of these calls may block.
pub trait DisplayTransport: 'static {
    /// The socket descriptor to watch for readability.
    fn fd(&self) -> BorrowedFd<'_>;

    /// Enter prepare-read mode. Returns `false` when events are already
    /// queued and must be dispatched before reading.
    fn prepare_read(&mut self) -> bool;

    /// Read pending data from the socket. Only meaningful after a granted
    /// [`prepare_read`](Self::prepare_read).
    fn read_events(&mut self) -> ReadStatus;

    /// Dispatch every buffered event to its handler.
    fn dispatch(&mut self) -> Result<usize, TransportError>;

    /// Current error code of the connection, `0` if none.
    fn error_code(&self) -> i32;

    /// Flush pending outbound requests.
    fn flush(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to named display endpoints.
pub trait Connector {
    type Transport: DisplayTransport;

    /// Connect to the display called `name`, or to the environment default
    /// when `name` is `None`.
    fn connect(&self, name: Option<&str>) -> Result<Self::Transport, TransportError>;
}
