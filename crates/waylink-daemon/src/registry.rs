//! Table of open display connections and their lifecycle callbacks.

use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use waylink_transport::Connector;

use crate::connection::{Connection, ConnectionId};
use crate::error::ConnectionError;
use crate::focus::{FocusGroup, InputContextManager};
use crate::instance::Instance;
use crate::io::{IoEvent, Readiness};
use crate::subscription::{HandlerEntry, HandlerTable};

/// Name of the environment-default display, opened at startup.
pub const PRIMARY_DISPLAY: &str = "";

/// Called with `(name, transport, focus_group)` when a connection opens.
pub type CreatedCallback<T> = dyn Fn(&str, &T, &FocusGroup);

/// Called with `(name, transport)` right before a connection is destroyed.
pub type ClosedCallback<T> = dyn Fn(&str, &T);

/// Owns every open display connection, keyed by display name.
///
/// This is the only place connections are created ([`open`](Self::open))
/// and destroyed ([`remove`](Self::remove)).
pub struct ConnectionRegistry<C: Connector> {
    connector: C,
    manager: InputContextManager,
    instance: Rc<dyn Instance>,
    connections: HashMap<String, Connection<C::Transport>>,
    created: HandlerTable<CreatedCallback<C::Transport>>,
    closed: HandlerTable<ClosedCallback<C::Transport>>,
    /// Exit the host when the primary display goes away.
    exit_on_primary_loss: bool,
    io_tx: mpsc::UnboundedSender<IoEvent>,
    io_rx: mpsc::UnboundedReceiver<IoEvent>,
    next_id: u64,
}

impl<C: Connector> ConnectionRegistry<C> {
    pub fn new(
        connector: C,
        manager: InputContextManager,
        instance: Rc<dyn Instance>,
        exit_on_primary_loss: bool,
    ) -> Self {
        let (io_tx, io_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            manager,
            instance,
            connections: HashMap::new(),
            created: HandlerTable::new(),
            closed: HandlerTable::new(),
            exit_on_primary_loss,
            io_tx,
            io_rx,
            next_id: 1,
        }
    }

    /// Open a connection to display `name` and announce it to creation
    /// subscribers.
    ///
    /// A name that is already open is rejected with
    /// [`ConnectionError::AlreadyOpen`]; the existing connection is left
    /// alone and no callback fires. A transport failure leaves no trace.
    pub fn open(&mut self, name: &str) -> Result<(), ConnectionError> {
        if self.connections.contains_key(name) {
            return Err(ConnectionError::AlreadyOpen(name.to_string()));
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let conn = Connection::open(
            &self.connector,
            id,
            name,
            &self.manager,
            self.io_tx.clone(),
        )?;
        info!(display = %name, %id, "display connected");

        let conn = self.connections.entry(name.to_string()).or_insert(conn);
        self.created
            .for_each(|callback| callback(name, conn.transport(), conn.focus_group()));
        Ok(())
    }

    /// Destroy the connection for `name`, if any.
    ///
    /// Closure subscribers run while the connection is still alive. Losing
    /// the primary display asks the host to exit when the exit policy is on.
    pub fn remove(&mut self, name: &str) {
        if self.remove_connection(name) && name == PRIMARY_DISPLAY && self.exit_on_primary_loss {
            info!("primary display disconnected, exiting");
            self.instance.exit();
        }
    }

    /// Remove every connection without applying the exit policy.
    pub fn close_all(&mut self) {
        for name in self.names() {
            self.remove_connection(&name);
        }
    }

    fn remove_connection(&mut self, name: &str) -> bool {
        let Some(conn) = self.connections.get(name) else {
            trace!(display = %name, "remove of unknown display ignored");
            return false;
        };
        debug!(display = %name, "display removed");
        self.closed
            .for_each(|callback| callback(name, conn.transport()));
        self.connections.remove(name);
        true
    }

    /// Subscribe to connection creation. The callback is immediately
    /// replayed for every connection that is already open.
    pub fn subscribe_on_create<F>(&self, callback: F) -> HandlerEntry<CreatedCallback<C::Transport>>
    where
        F: Fn(&str, &C::Transport, &FocusGroup) + 'static,
    {
        let entry = self.created.add(Box::new(callback));
        for (name, conn) in &self.connections {
            (entry.handler())(name, conn.transport(), conn.focus_group());
        }
        entry
    }

    /// Subscribe to connection closure. Nothing is replayed.
    pub fn subscribe_on_close<F>(&self, callback: F) -> HandlerEntry<ClosedCallback<C::Transport>>
    where
        F: Fn(&str, &C::Transport) + 'static,
    {
        self.closed.add(Box::new(callback))
    }

    /// Wait for the next readiness notification from any connection.
    pub async fn next_io_event(&mut self) -> Option<IoEvent> {
        self.io_rx.recv().await
    }

    /// Drive the connection an event belongs to, removing it if it
    /// finished. Events for connections that are gone are dropped.
    pub fn handle_io(&mut self, event: IoEvent) {
        let name = event.name.clone();
        let Some(conn) = self
            .connections
            .get_mut(&name)
            .filter(|conn| conn.id() == event.id)
        else {
            trace!(display = %name, id = %event.id, "stale readiness event dropped");
            event.acknowledge(Readiness::Drained);
            return;
        };

        let readiness = conn.on_ready(event.flags);
        let failure = conn.failure();
        event.acknowledge(readiness);

        if let Some(e) = failure {
            warn!(display = %name, error = %e, "display connection lost");
            self.remove(&name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Connection<C::Transport>> {
        self.connections.get(name)
    }

    pub fn focus_group(&self, name: &str) -> Option<&FocusGroup> {
        self.connections.get(name).map(Connection::focus_group)
    }

    pub fn transport(&self, name: &str) -> Option<&C::Transport> {
        self.connections.get(name).map(Connection::transport)
    }

    /// Names of all open displays, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn input_context_manager(&self) -> &InputContextManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use waylink_transport::mock::{MockConnector, MockConnectorHandle, MockTransport};

    use super::*;
    use crate::io::IoFlags;

    #[derive(Default)]
    struct CountingInstance {
        exits: Cell<usize>,
    }

    impl Instance for CountingInstance {
        fn exit(&self) {
            self.exits.set(self.exits.get() + 1);
        }

        fn set_xkb_parameters(&self, _: &str, _: &str, _: &str, _: &str) {}

        fn current_group_default_layout(&self) -> String {
            "us".to_string()
        }
    }

    fn registry(
        exit_on_primary_loss: bool,
    ) -> (
        ConnectionRegistry<MockConnector>,
        MockConnectorHandle,
        Rc<CountingInstance>,
    ) {
        let connector = MockConnector::new();
        let handle = connector.handle();
        let instance = Rc::new(CountingInstance::default());
        let registry = ConnectionRegistry::new(
            connector,
            InputContextManager::new(),
            Rc::clone(&instance) as Rc<dyn Instance>,
            exit_on_primary_loss,
        );
        (registry, handle, instance)
    }

    #[tokio::test]
    async fn open_fires_creation_callbacks_in_order() {
        let (mut registry, _, _) = registry(false);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _first = registry.subscribe_on_create(move |name, _, group| {
            l1.borrow_mut().push(format!("first {name:?} {}", group.display()));
        });
        let l2 = Rc::clone(&log);
        let _second = registry.subscribe_on_create(move |name, _, _| {
            l2.borrow_mut().push(format!("second {name:?}"));
        });

        registry.open("").unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["first \"\" wayland:".to_string(), "second \"\"".to_string()]
        );
        assert!(registry.contains(""));
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay_for_each_open_connection() {
        let (mut registry, _, _) = registry(false);
        registry.open("").unwrap();
        registry.open("wayland-1").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _entry = registry.subscribe_on_create(move |name, _, group| {
            s.borrow_mut()
                .push((name.to_string(), group.display().to_string()));
        });

        let mut seen = seen.borrow().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (String::new(), "wayland:".to_string()),
                ("wayland-1".to_string(), "wayland:wayland-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn callbacks_receive_the_connections_own_transport() {
        let (mut registry, handle, _) = registry(false);
        registry.open("").unwrap();

        let live = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&live);
        let _live = registry.subscribe_on_create(move |name, transport: &MockTransport, _| {
            l.borrow_mut()
                .push((name.to_string(), transport.handle().serial()));
        });
        registry.open("wayland-1").unwrap();

        let replayed = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&replayed);
        let _replay = registry.subscribe_on_create(move |name, transport: &MockTransport, _| {
            r.borrow_mut()
                .push((name.to_string(), transport.handle().serial()));
        });

        let closed = Rc::new(RefCell::new(Vec::new()));
        let c = Rc::clone(&closed);
        let _closed = registry.subscribe_on_close(move |name, transport: &MockTransport| {
            c.borrow_mut()
                .push((name.to_string(), transport.handle().serial()));
        });

        let serial = |name: &str| handle.transport(name).unwrap().serial();
        let primary = (String::new(), serial(""));
        let secondary = ("wayland-1".to_string(), serial("wayland-1"));
        assert_ne!(primary.1, secondary.1);

        // Primary replayed on subscription, then the live creation.
        assert_eq!(*live.borrow(), vec![primary.clone(), secondary.clone()]);
        let mut replayed = replayed.borrow().clone();
        replayed.sort();
        assert_eq!(replayed, vec![primary.clone(), secondary.clone()]);

        registry.remove("wayland-1");
        assert_eq!(*closed.borrow(), vec![secondary]);
        assert!(handle.transport("wayland-1").unwrap().is_dropped());
        assert!(!handle.transport("").unwrap().is_dropped());
    }

    #[tokio::test]
    async fn close_subscriber_is_not_replayed() {
        let (mut registry, _, _) = registry(false);
        registry.open("").unwrap();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _entry = registry.subscribe_on_close(move |_, _| c.set(c.get() + 1));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn duplicate_open_is_rejected_without_callbacks() {
        let (mut registry, handle, _) = registry(false);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _entry = registry.subscribe_on_create(move |_, _, _| c.set(c.get() + 1));

        registry.open("wayland-1").unwrap();
        let err = registry.open("wayland-1").unwrap_err();

        assert!(matches!(err, ConnectionError::AlreadyOpen(name) if name == "wayland-1"));
        assert_eq!(calls.get(), 1);
        assert_eq!(registry.len(), 1);
        // The connector is never asked for a second transport.
        assert_eq!(handle.opened("wayland-1"), 1);
    }

    #[tokio::test]
    async fn failed_open_leaves_nothing_behind() {
        let (mut registry, handle, _) = registry(false);
        handle.refuse("wayland-1");
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _entry = registry.subscribe_on_create(move |_, _, _| c.set(c.get() + 1));

        let err = registry.open("wayland-1").unwrap_err();

        assert!(matches!(err, ConnectionError::OpenFailed(_)));
        assert!(registry.is_empty());
        assert_eq!(calls.get(), 0);
        assert!(registry.input_context_manager().groups().is_empty());
    }

    #[tokio::test]
    async fn closure_callbacks_see_live_transport_before_drop() {
        let (mut registry, handle, _) = registry(false);
        registry.open("wayland-1").unwrap();
        let transport = handle.transport("wayland-1").unwrap();

        let observed = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&observed);
        let t = transport.clone();
        let _entry = registry.subscribe_on_close(move |name, conn: &MockTransport| {
            o.borrow_mut()
                .push((name.to_string(), t.is_dropped(), conn.handle().is_dropped()));
        });

        registry.remove("wayland-1");

        assert_eq!(
            *observed.borrow(),
            vec![("wayland-1".to_string(), false, false)]
        );
        assert!(transport.is_dropped());
        assert!(registry.get("wayland-1").is_none());
        assert!(!registry.input_context_manager().contains("wayland:wayland-1"));
    }

    #[tokio::test]
    async fn removing_absent_name_is_a_no_op() {
        let (mut registry, _, instance) = registry(true);
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let _entry = registry.subscribe_on_close(move |_, _| c.set(c.get() + 1));

        registry.remove("wayland-3");
        registry.remove(PRIMARY_DISPLAY);

        assert_eq!(calls.get(), 0);
        assert_eq!(instance.exits.get(), 0);
    }

    #[tokio::test]
    async fn primary_loss_exits_once_after_closure_callbacks() {
        let (mut registry, _, instance) = registry(true);
        registry.open(PRIMARY_DISPLAY).unwrap();
        registry.open("wayland-1").unwrap();

        let exits_seen = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&exits_seen);
        let inst = Rc::clone(&instance);
        let _entry = registry.subscribe_on_close(move |name, _| {
            seen.borrow_mut().push((name.to_string(), inst.exits.get()));
        });

        registry.remove("wayland-1");
        assert_eq!(instance.exits.get(), 0);

        registry.remove(PRIMARY_DISPLAY);
        assert_eq!(instance.exits.get(), 1);
        assert_eq!(
            *exits_seen.borrow(),
            vec![("wayland-1".to_string(), 0), (String::new(), 0)]
        );

        registry.remove(PRIMARY_DISPLAY);
        assert_eq!(instance.exits.get(), 1);
    }

    #[tokio::test]
    async fn primary_loss_without_policy_does_not_exit() {
        let (mut registry, _, instance) = registry(false);
        registry.open(PRIMARY_DISPLAY).unwrap();
        registry.remove(PRIMARY_DISPLAY);
        assert_eq!(instance.exits.get(), 0);
    }

    #[tokio::test]
    async fn close_all_skips_exit_policy() {
        let (mut registry, _, instance) = registry(true);
        registry.open(PRIMARY_DISPLAY).unwrap();
        registry.open("wayland-1").unwrap();
        registry.close_all();
        assert!(registry.is_empty());
        assert_eq!(instance.exits.get(), 0);
    }

    #[tokio::test]
    async fn hang_up_event_removes_connection_once() {
        let (mut registry, handle, _) = registry(false);
        registry.open("wayland-1").unwrap();
        let transport = handle.transport("wayland-1").unwrap();
        let id = registry.get("wayland-1").unwrap().id();

        let closed = Rc::new(Cell::new(0));
        let c = Rc::clone(&closed);
        let _entry = registry.subscribe_on_close(move |_, _| c.set(c.get() + 1));

        registry.handle_io(IoEvent::detached(id, "wayland-1", IoFlags::HUP));
        registry.handle_io(IoEvent::detached(id, "wayland-1", IoFlags::IN));

        assert_eq!(closed.get(), 1);
        assert!(!registry.contains("wayland-1"));
        assert!(transport.calls().is_empty());
        assert!(transport.is_dropped());
    }

    #[tokio::test]
    async fn stale_event_does_not_touch_reopened_connection() {
        let (mut registry, handle, _) = registry(false);
        registry.open("wayland-1").unwrap();
        let old_id = registry.get("wayland-1").unwrap().id();
        registry.remove("wayland-1");
        registry.open("wayland-1").unwrap();
        let fresh = handle.transport("wayland-1").unwrap();

        registry.handle_io(IoEvent::detached(old_id, "wayland-1", IoFlags::HUP));

        assert!(registry.contains("wayland-1"));
        assert!(fresh.calls().is_empty());
    }

    #[tokio::test]
    async fn protocol_error_finalizes_exactly_once() {
        let (mut registry, handle, _) = registry(false);
        registry.open("wayland-1").unwrap();
        let transport = handle.transport("wayland-1").unwrap();
        let id = registry.get("wayland-1").unwrap().id();
        transport.fail_dispatch(71);

        let closed = Rc::new(Cell::new(0));
        let c = Rc::clone(&closed);
        let _entry = registry.subscribe_on_close(move |_, _| c.set(c.get() + 1));

        registry.handle_io(IoEvent::detached(id, "wayland-1", IoFlags::IN));
        let calls_after_error = transport.calls().len();
        registry.handle_io(IoEvent::detached(id, "wayland-1", IoFlags::IN));

        assert_eq!(closed.get(), 1);
        assert_eq!(transport.calls().len(), calls_after_error);
        assert!(!registry.contains("wayland-1"));
    }
}
