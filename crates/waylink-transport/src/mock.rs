//! Mock transport backend for testing.
//!
//! Each [`MockTransport`] owns one end of a real `UnixStream` pair, so the
//! descriptor it exposes can be watched by an actual reactor. Tests keep the
//! other end through a [`MockTransportHandle`] to make the socket readable,
//! hang it up, or script dispatch failures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

use crate::error::TransportError;
use crate::{Connector, DisplayTransport, ReadStatus};

/// A call observed on a mock transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCall {
    PrepareRead,
    Read,
    Dispatch,
    Flush,
}

#[derive(Debug, Default)]
struct MockTransportState {
    serial: usize,
    peer: Option<UnixStream>,
    dispatch_failures: VecDeque<i32>,
    error_code: i32,
    calls: Vec<TransportCall>,
    bytes_read: usize,
    dropped: bool,
}

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockConnectorState {
    refused: HashSet<String>,
    transports: HashMap<String, Vec<Arc<Mutex<MockTransportState>>>>,
    attempts: usize,
}

/// Mock connector handing out socket-pair transports.
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockConnectorState::default())),
        }
    }

    /// Get a clonable handle for scripting and observing the connector.
    pub fn handle(&self) -> MockConnectorHandle {
        MockConnectorHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, name: Option<&str>) -> Result<MockTransport, TransportError> {
        let key = name.unwrap_or("").to_string();
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.refused.contains(&key) {
            return Err(TransportError::Connect(format!(
                "display {key:?} refused the connection"
            )));
        }

        let (local, peer) = UnixStream::pair()?;
        local.set_nonblocking(true)?;
        let shared = Arc::new(Mutex::new(MockTransportState {
            serial: state.attempts,
            peer: Some(peer),
            ..MockTransportState::default()
        }));
        state
            .transports
            .entry(key)
            .or_default()
            .push(Arc::clone(&shared));

        Ok(MockTransport {
            socket: local,
            state: shared,
        })
    }
}

/// Clonable observer handle for [`MockConnector`].
#[derive(Clone)]
pub struct MockConnectorHandle {
    state: Arc<Mutex<MockConnectorState>>,
}

impl MockConnectorHandle {
    /// Make every future connection to `name` fail.
    pub fn refuse(&self, name: &str) {
        self.state.lock().unwrap().refused.insert(name.to_string());
    }

    /// Allow connections to `name` again.
    pub fn accept(&self, name: &str) {
        self.state.lock().unwrap().refused.remove(name);
    }

    /// Total number of connection attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    /// Number of transports successfully created for `name`.
    pub fn opened(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .transports
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Handle to the most recent transport created for `name`.
    pub fn transport(&self, name: &str) -> Option<MockTransportHandle> {
        let state = self.state.lock().unwrap();
        state
            .transports
            .get(name)
            .and_then(|all| all.last())
            .map(|shared| MockTransportHandle {
                state: Arc::clone(shared),
            })
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock display transport backed by one end of a socket pair.
pub struct MockTransport {
    socket: UnixStream,
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    fn record(&self, call: TransportCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Observer handle for this transport.
    pub fn handle(&self) -> MockTransportHandle {
        MockTransportHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.dropped = true;
        }
    }
}

impl DisplayTransport for MockTransport {
    fn fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }

    fn prepare_read(&mut self) -> bool {
        self.record(TransportCall::PrepareRead);
        true
    }

    fn read_events(&mut self) -> ReadStatus {
        self.record(TransportCall::Read);
        let mut buf = [0u8; 4096];
        match self.socket.read(&mut buf) {
            Ok(0) => ReadStatus::Failed,
            Ok(n) => {
                self.state.lock().unwrap().bytes_read += n;
                ReadStatus::Read(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => ReadStatus::WouldBlock,
            Err(_) => ReadStatus::Failed,
        }
    }

    fn dispatch(&mut self) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TransportCall::Dispatch);
        match state.dispatch_failures.pop_front() {
            Some(code) => {
                state.error_code = code;
                Err(TransportError::Dispatch(format!("scripted failure {code}")))
            }
            None => Ok(0),
        }
    }

    fn error_code(&self) -> i32 {
        self.state.lock().unwrap().error_code
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Flush);
        Ok(())
    }
}

/// Clonable observer handle for a [`MockTransport`].
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransportHandle {
    /// Connection attempt number that created the transport, from 1.
    pub fn serial(&self) -> usize {
        self.state.lock().unwrap().serial
    }

    /// Write `bytes` from the server side, making the transport readable.
    pub fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.peer.as_mut() {
            Some(peer) => peer.write_all(bytes),
            None => Err(std::io::Error::from(ErrorKind::NotConnected)),
        }
    }

    /// Close the server side of the socket.
    pub fn hang_up(&self) {
        self.state.lock().unwrap().peer = None;
    }

    /// Make the next dispatch fail and report `code` as the connection error.
    pub fn fail_dispatch(&self, code: i32) {
        self.state.lock().unwrap().dispatch_failures.push_back(code);
    }

    /// Snapshot of every call made on the transport.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times `call` was made.
    pub fn count(&self, call: TransportCall) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    /// Total bytes consumed by reads.
    pub fn bytes_read(&self) -> usize {
        self.state.lock().unwrap().bytes_read
    }

    /// Whether the transport has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.state.lock().unwrap().dropped
    }
}
