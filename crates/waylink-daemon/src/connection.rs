//! A single display connection and its protocol cycle.

use tokio::sync::mpsc;
use tracing::{debug, error, trace};
use waylink_transport::{Connector, DisplayTransport, ReadStatus};

use crate::error::ConnectionError;
use crate::focus::{FocusGroup, InputContextManager};
use crate::io::{IoEvent, IoFlags, IoRegistration, Readiness};

/// Serial identifying one connection instance, distinct across reopens of
/// the same display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live connection to a display server.
///
/// Owns the transport, its socket watch, and the focus group consumers use
/// to scope input state to this display. Only the registry creates and
/// destroys connections.
pub struct Connection<T: DisplayTransport> {
    // Declared first so the watch stops before the transport closes.
    _registration: IoRegistration,
    transport: T,
    group: FocusGroup,
    id: ConnectionId,
    name: String,
    last_error: i32,
    finished: bool,
}

impl<T: DisplayTransport> Connection<T> {
    /// Connect to display `name` (empty for the environment default) and
    /// start watching its socket.
    pub(crate) fn open<C>(
        connector: &C,
        id: ConnectionId,
        name: &str,
        manager: &InputContextManager,
        events: mpsc::UnboundedSender<IoEvent>,
    ) -> Result<Self, ConnectionError>
    where
        C: Connector<Transport = T>,
    {
        let display = if name.is_empty() { None } else { Some(name) };
        let transport = connector.connect(display)?;
        let registration = IoRegistration::watch(id, name, transport.fd(), events)?;
        let group = FocusGroup::for_display(name, manager)?;

        debug!(display = %name, %id, "display connection opened");
        Ok(Self {
            _registration: registration,
            transport,
            group,
            id,
            name: name.to_string(),
            last_error: 0,
            finished: false,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn focus_group(&self) -> &FocusGroup {
        &self.group
    }

    /// Last non-zero error code reported by the transport, `0` if none.
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    /// Whether the connection is waiting to be removed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mark the connection for removal. The registry erases it once the
    /// current readiness event has been handled.
    pub fn finish(&mut self) {
        if !self.finished {
            debug!(display = %self.name, id = %self.id, "display connection finished");
            self.finished = true;
        }
    }

    /// The error that finished this connection, if any.
    pub(crate) fn failure(&self) -> Option<ConnectionError> {
        if !self.finished {
            return None;
        }
        if self.last_error != 0 {
            Some(ConnectionError::Protocol {
                name: self.name.clone(),
                code: self.last_error,
            })
        } else {
            Some(ConnectionError::HangupOrError {
                name: self.name.clone(),
            })
        }
    }

    /// Run one read/dispatch/flush cycle for a readiness notification.
    pub fn on_ready(&mut self, flags: IoFlags) -> Readiness {
        if self.finished {
            return Readiness::Drained;
        }
        if flags.is_fatal() {
            self.finish();
            return Readiness::Drained;
        }

        let mut readiness = Readiness::Pending;
        if self.transport.prepare_read() {
            match self.transport.read_events() {
                ReadStatus::Read(n) => {
                    trace!(display = %self.name, bytes = n, "read display events");
                }
                ReadStatus::WouldBlock | ReadStatus::Failed => readiness = Readiness::Drained,
            }
        }

        if let Err(e) = self.transport.dispatch() {
            self.last_error = self.transport.error_code();
            if self.last_error != 0 {
                error!(
                    display = %self.name,
                    code = self.last_error,
                    error = %e,
                    "display connection got error"
                );
                self.finish();
                return Readiness::Drained;
            }
        }

        if let Err(e) = self.transport.flush() {
            debug!(display = %self.name, error = %e, "flush failed");
        }
        readiness
    }
}

#[cfg(test)]
mod tests {
    use waylink_transport::mock::{MockConnector, TransportCall};

    use super::*;

    fn open(name: &str) -> (Connection<waylink_transport::mock::MockTransport>, MockConnector) {
        let connector = MockConnector::new();
        let manager = InputContextManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::open(&connector, ConnectionId(1), name, &manager, tx).unwrap();
        (conn, connector)
    }

    #[tokio::test]
    async fn open_creates_named_group() {
        let (conn, _connector) = open("wayland-1");
        assert_eq!(conn.name(), "wayland-1");
        assert_eq!(conn.focus_group().display(), "wayland:wayland-1");
        assert_eq!(conn.last_error(), 0);
        assert!(!conn.is_finished());
    }

    #[tokio::test]
    async fn refused_display_fails_to_open() {
        let connector = MockConnector::new();
        connector.handle().refuse("wayland-9");
        let manager = InputContextManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result =
            Connection::open(&connector, ConnectionId(1), "wayland-9", &manager, tx);
        assert!(matches!(result, Err(ConnectionError::OpenFailed(_))));
        assert!(manager.groups().is_empty());
    }

    #[tokio::test]
    async fn idle_cycle_reads_dispatches_and_flushes() {
        let (mut conn, connector) = open("");
        let transport = connector.handle().transport("").unwrap();

        let readiness = conn.on_ready(IoFlags::IN);

        assert_eq!(readiness, Readiness::Drained);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::PrepareRead,
                TransportCall::Read,
                TransportCall::Dispatch,
                TransportCall::Flush,
            ]
        );
        assert!(!conn.is_finished());
    }

    #[tokio::test]
    async fn data_read_leaves_readiness_pending() {
        let (mut conn, connector) = open("");
        let transport = connector.handle().transport("").unwrap();
        transport.send(b"events").unwrap();

        assert_eq!(conn.on_ready(IoFlags::IN), Readiness::Pending);
        assert_eq!(transport.bytes_read(), 6);
        assert_eq!(conn.on_ready(IoFlags::IN), Readiness::Drained);
    }

    #[tokio::test]
    async fn hang_up_finishes_without_protocol_calls() {
        let (mut conn, connector) = open("");
        let transport = connector.handle().transport("").unwrap();

        conn.on_ready(IoFlags::IN | IoFlags::HUP);

        assert!(conn.is_finished());
        assert!(transport.calls().is_empty());
        assert!(matches!(
            conn.failure(),
            Some(ConnectionError::HangupOrError { .. })
        ));
    }

    #[tokio::test]
    async fn dispatch_error_finishes_and_stops_processing() {
        let (mut conn, connector) = open("wayland-1");
        let transport = connector.handle().transport("wayland-1").unwrap();
        transport.fail_dispatch(71);

        conn.on_ready(IoFlags::IN);
        assert!(conn.is_finished());
        assert_eq!(conn.last_error(), 71);
        // Flush is skipped after a fatal dispatch.
        assert_eq!(transport.count(TransportCall::Flush), 0);

        let calls_before = transport.calls().len();
        conn.on_ready(IoFlags::IN);
        assert_eq!(transport.calls().len(), calls_before);
        assert!(matches!(
            conn.failure(),
            Some(ConnectionError::Protocol { code: 71, .. })
        ));
    }

    #[tokio::test]
    async fn dispatch_failure_without_error_code_is_not_fatal() {
        let (mut conn, connector) = open("");
        let transport = connector.handle().transport("").unwrap();
        transport.fail_dispatch(0);

        conn.on_ready(IoFlags::IN);
        assert!(!conn.is_finished());
        assert_eq!(transport.count(TransportCall::Flush), 1);
    }
}
