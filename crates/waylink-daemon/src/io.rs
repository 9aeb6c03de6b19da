//! Event-loop integration for display sockets.
//!
//! Each connection's descriptor is watched by a small task that forwards
//! readiness to the daemon's loop and waits for it to be handled. Readiness
//! is cleared only once the connection reports the socket drained, so a
//! socket with unread data keeps firing the way a level-triggered loop
//! would.

use std::ops::BitOr;
use std::os::fd::{BorrowedFd, OwnedFd};

use tokio::io::unix::AsyncFd;
use tokio::io::{Interest, Ready};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::connection::ConnectionId;
use crate::error::ConnectionError;

/// Readiness conditions reported for a display socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoFlags(u8);

impl IoFlags {
    /// The socket is readable.
    pub const IN: Self = Self(1);
    /// The socket reported an error condition.
    pub const ERR: Self = Self(1 << 1);
    /// The peer hung up.
    pub const HUP: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the descriptor errored or hung up.
    pub const fn is_fatal(self) -> bool {
        self.0 & (Self::ERR.0 | Self::HUP.0) != 0
    }
}

impl BitOr for IoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<Ready> for IoFlags {
    fn from(ready: Ready) -> Self {
        let mut flags = Self::empty();
        if ready.is_readable() {
            flags = flags | Self::IN;
        }
        if ready.is_error() {
            flags = flags | Self::ERR;
        }
        if ready.is_read_closed() || ready.is_write_closed() {
            flags = flags | Self::HUP;
        }
        flags
    }
}

/// What a connection left behind after handling a readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The socket has no more data; the watcher may wait for a new edge.
    Drained,
    /// Data may remain; the watcher should report the socket again.
    Pending,
}

/// A readiness notification for one connection.
#[derive(Debug)]
pub struct IoEvent {
    pub id: ConnectionId,
    pub name: String,
    pub flags: IoFlags,
    ack: Option<oneshot::Sender<Readiness>>,
}

impl IoEvent {
    /// An event that nobody waits on, for driving connections by hand.
    pub fn detached(id: ConnectionId, name: &str, flags: IoFlags) -> Self {
        Self {
            id,
            name: name.to_string(),
            flags,
            ack: None,
        }
    }

    /// Tell the watcher how the event was handled.
    pub fn acknowledge(self, readiness: Readiness) {
        if let Some(ack) = self.ack {
            let _ = ack.send(readiness);
        }
    }
}

/// Watches a display socket on the tokio reactor.
///
/// The registration owns a duplicate of the descriptor, so it never
/// outlives or aliases the transport's own fd. Dropping it stops the watch.
pub struct IoRegistration {
    task: JoinHandle<()>,
}

impl IoRegistration {
    /// Start forwarding readiness of `fd` to `events`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(
        id: ConnectionId,
        name: &str,
        fd: BorrowedFd<'_>,
        events: mpsc::UnboundedSender<IoEvent>,
    ) -> Result<Self, ConnectionError> {
        let owned = fd.try_clone_to_owned().map_err(ConnectionError::Watch)?;
        let fd = AsyncFd::with_interest(owned, Interest::READABLE | Interest::ERROR)
            .map_err(ConnectionError::Watch)?;
        let task = tokio::spawn(watch_loop(id, name.to_string(), fd, events));
        Ok(Self { task })
    }
}

impl Drop for IoRegistration {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_loop(
    id: ConnectionId,
    name: String,
    fd: AsyncFd<OwnedFd>,
    events: mpsc::UnboundedSender<IoEvent>,
) {
    loop {
        let mut guard = match fd.ready(Interest::READABLE | Interest::ERROR).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(display = %name, error = %e, "display socket watch failed");
                let _ = events.send(IoEvent::detached(id, &name, IoFlags::ERR));
                break;
            }
        };

        let flags = IoFlags::from(guard.ready());
        trace!(display = %name, ?flags, "display socket ready");

        let (ack, handled) = oneshot::channel();
        let event = IoEvent {
            id,
            name: name.clone(),
            flags,
            ack: Some(ack),
        };
        if events.send(event).is_err() {
            break;
        }

        match handled.await {
            Ok(Readiness::Drained) => guard.clear_ready(),
            Ok(Readiness::Pending) => {}
            // Connection was removed while handling the event.
            Err(_) => break,
        }

        if flags.is_fatal() {
            break;
        }
    }
}
