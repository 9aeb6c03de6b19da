//! `wayland-client` backend.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::os::fd::BorrowedFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use wayland_client::backend::{Backend, ReadEventsGuard, WaylandError};
use wayland_client::{Connection, DispatchError, EventQueue};

use crate::error::TransportError;
use crate::{Connector, DisplayTransport, ReadStatus};

/// `EPROTO`, reported by libwayland once the compositor sent a protocol error.
const EPROTO: i32 = 71;

/// Opens Wayland connections.
///
/// An empty name uses `WAYLAND_SOCKET`/`WAYLAND_DISPLAY`. Other names are
/// socket paths, resolved against `XDG_RUNTIME_DIR` when relative.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaylandConnector;

impl Connector for WaylandConnector {
    type Transport = WaylandTransport;

    fn connect(&self, name: Option<&str>) -> Result<WaylandTransport, TransportError> {
        let connection = match name {
            None => Connection::connect_to_env()
                .map_err(|e| TransportError::Connect(e.to_string()))?,
            Some(name) => {
                let path = socket_path(name)?;
                let stream = UnixStream::connect(&path).map_err(|e| {
                    TransportError::Connect(format!("{}: {e}", path.display()))
                })?;
                Connection::from_socket(stream)
                    .map_err(|e| TransportError::Connect(e.to_string()))?
            }
        };
        debug!(display = name.unwrap_or(""), "wayland connection established");
        Ok(WaylandTransport::new(connection))
    }
}

fn socket_path(name: &str) -> Result<PathBuf, TransportError> {
    resolve_socket_path(name, std::env::var_os("XDG_RUNTIME_DIR"))
}

fn resolve_socket_path(
    name: &str,
    runtime_dir: Option<OsString>,
) -> Result<PathBuf, TransportError> {
    let name = Path::new(name);
    if name.is_absolute() {
        return Ok(name.to_path_buf());
    }
    let runtime_dir = runtime_dir
        .ok_or_else(|| TransportError::Connect("XDG_RUNTIME_DIR is not set".to_string()))?;
    Ok(PathBuf::from(runtime_dir).join(name))
}

/// Queue state for the connection's own event queue.
///
/// Consumers that bind globals create their own queues from
/// [`WaylandTransport::connection`]; this queue only keeps the connection's
/// default dispatch cycle running.
#[derive(Debug, Default)]
pub struct DispatchState;

/// A live Wayland client connection.
pub struct WaylandTransport {
    connection: Connection,
    backend: Backend,
    queue: EventQueue<DispatchState>,
    state: DispatchState,
    read_guard: Option<ReadEventsGuard>,
    last_os_error: i32,
}

impl WaylandTransport {
    pub fn new(connection: Connection) -> Self {
        let queue = connection.new_event_queue();
        let backend = connection.backend();
        Self {
            connection,
            backend,
            queue,
            state: DispatchState,
            read_guard: None,
            last_os_error: 0,
        }
    }

    /// The underlying protocol connection, for consumers creating proxies.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn record(&mut self, error: &WaylandError) {
        if let WaylandError::Io(e) = error {
            if e.kind() != ErrorKind::WouldBlock {
                self.last_os_error = e.raw_os_error().unwrap_or(0);
            }
        }
    }
}

impl DisplayTransport for WaylandTransport {
    fn fd(&self) -> BorrowedFd<'_> {
        self.backend.poll_fd()
    }

    fn prepare_read(&mut self) -> bool {
        self.read_guard = self.connection.prepare_read();
        self.read_guard.is_some()
    }

    fn read_events(&mut self) -> ReadStatus {
        let Some(guard) = self.read_guard.take() else {
            return ReadStatus::WouldBlock;
        };
        match guard.read() {
            Ok(n) => {
                trace!(events = n, "read wayland events");
                ReadStatus::Read(n)
            }
            Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => ReadStatus::WouldBlock,
            Err(e) => {
                self.record(&e);
                ReadStatus::Failed
            }
        }
    }

    fn dispatch(&mut self) -> Result<usize, TransportError> {
        match self.queue.dispatch_pending(&mut self.state) {
            Ok(n) => Ok(n),
            Err(DispatchError::Backend(e)) => {
                self.record(&e);
                Err(match e {
                    WaylandError::Io(io) => TransportError::Io(io),
                    WaylandError::Protocol(p) => TransportError::Protocol {
                        code: p.code,
                        interface: p.object_interface,
                        message: p.message,
                    },
                })
            }
            Err(e) => Err(TransportError::Dispatch(e.to_string())),
        }
    }

    fn error_code(&self) -> i32 {
        if self.connection.protocol_error().is_some() {
            return EPROTO;
        }
        self.last_os_error
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        match self.connection.flush() {
            Ok(()) => Ok(()),
            Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                self.record(&e);
                Err(TransportError::Dispatch(e.to_string()))
            }
        }
    }
}
