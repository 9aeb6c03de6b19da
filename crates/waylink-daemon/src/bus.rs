//! One-way signals on the desktop session bus.

use std::cell::RefCell;

use tracing::{debug, warn};

use crate::error::DaemonError;

/// A signal to broadcast on the session bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSignal {
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl BusSignal {
    pub fn new(path: &str, interface: &str, member: &str) -> Self {
        Self {
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
        }
    }
}

/// Session bus able to emit argument-less signals.
pub trait SessionBus {
    fn emit_signal(&self, signal: &BusSignal) -> Result<(), DaemonError>;
}

/// Emits signals through the `dbus-send` tool without waiting for it.
#[derive(Debug, Clone)]
pub struct DbusSendBus {
    program: String,
}

impl Default for DbusSendBus {
    fn default() -> Self {
        Self {
            program: "dbus-send".to_string(),
        }
    }
}

impl DbusSendBus {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(signal: &BusSignal) -> Vec<String> {
        vec![
            "--session".to_string(),
            "--type=signal".to_string(),
            signal.path.clone(),
            format!("{}.{}", signal.interface, signal.member),
        ]
    }
}

impl SessionBus for DbusSendBus {
    fn emit_signal(&self, signal: &BusSignal) -> Result<(), DaemonError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(Self::args(signal))
            .kill_on_drop(false)
            .spawn()?;
        debug!(
            path = %signal.path,
            interface = %signal.interface,
            member = %signal.member,
            "emitted bus signal"
        );

        // Reap the child in the background.
        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(program = %program, %status, "bus signal sender failed");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(program = %program, error = %e, "failed to wait for bus signal sender");
                }
            }
        });
        Ok(())
    }
}

/// Bus that records signals instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingBus {
    sent: RefCell<Vec<BusSignal>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<BusSignal> {
        self.sent.borrow().clone()
    }
}

impl SessionBus for RecordingBus {
    fn emit_signal(&self, signal: &BusSignal) -> Result<(), DaemonError> {
        self.sent.borrow_mut().push(signal.clone());
        Ok(())
    }
}
