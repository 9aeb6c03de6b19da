//! Per-connection focus groups.
//!
//! A [`FocusGroup`] scopes input-context and focus state to one display
//! connection. Keys are unique across the process; the
//! [`InputContextManager`] enforces that.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;

use crate::error::ConnectionError;

/// Namespace prefix of focus groups owned by display connections.
pub const GROUP_NAMESPACE: &str = "wayland";

/// Process-wide registry of live focus groups.
#[derive(Debug, Clone, Default)]
pub struct InputContextManager {
    groups: Rc<RefCell<BTreeSet<String>>>,
}

impl InputContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every live focus group, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.groups.borrow().iter().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.borrow().contains(key)
    }
}

/// Scoping context for the input state of a single connection.
#[derive(Debug)]
pub struct FocusGroup {
    key: String,
    manager: InputContextManager,
}

impl FocusGroup {
    /// Create and register a group. Fails if `key` is already live.
    pub fn new(
        key: impl Into<String>,
        manager: &InputContextManager,
    ) -> Result<Self, ConnectionError> {
        let key = key.into();
        if !manager.groups.borrow_mut().insert(key.clone()) {
            return Err(ConnectionError::DuplicateGroup(key));
        }
        debug!(group = %key, "focus group created");
        Ok(Self {
            key,
            manager: manager.clone(),
        })
    }

    /// The group for display `name`, keyed `"wayland:<name>"`.
    pub fn for_display(name: &str, manager: &InputContextManager) -> Result<Self, ConnectionError> {
        Self::new(format!("{GROUP_NAMESPACE}:{name}"), manager)
    }

    /// Display string consumers use to address this group.
    pub fn display(&self) -> &str {
        &self.key
    }
}

impl Drop for FocusGroup {
    fn drop(&mut self) {
        self.manager.groups.borrow_mut().remove(&self.key);
        debug!(group = %self.key, "focus group destroyed");
    }
}
