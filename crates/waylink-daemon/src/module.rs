//! The Wayland module: startup, command handling and the event loop.

use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use waylink_transport::Connector;

use crate::bus::{DbusSendBus, SessionBus};
use crate::config::Config;
use crate::environment::Environment;
use crate::error::{ConnectionError, DaemonError};
use crate::focus::InputContextManager;
use crate::instance::Instance;
use crate::layout_sync::{LayoutSync, SyncOutcome};
use crate::registry::{ConnectionRegistry, PRIMARY_DISPLAY};
use crate::setup;

/// Requests processed by the module's loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCommand {
    /// Connect to another display (best effort).
    OpenDisplay(String),
    /// Disconnect a display.
    CloseDisplay(String),
    /// The active input-method group changed.
    GroupChanged,
    /// Stop the loop.
    Shutdown,
}

/// Owns the connection registry and drives it from the event loop.
pub struct WaylandModule<C: Connector> {
    registry: ConnectionRegistry<C>,
    instance: Rc<dyn Instance>,
    layout_sync: Option<LayoutSync>,
    commands: mpsc::UnboundedReceiver<ModuleCommand>,
}

impl<C: Connector> WaylandModule<C> {
    /// Build the module and connect to the primary display plus every
    /// display listed in the config.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &Config,
        environment: Environment,
        instance: Rc<dyn Instance>,
        connector: C,
        commands: mpsc::UnboundedReceiver<ModuleCommand>,
    ) -> Self {
        let exit_on_primary_loss =
            config.module.exit_when_main_display_disconnected && environment.is_wayland_session();
        let registry = ConnectionRegistry::new(
            connector,
            InputContextManager::new(),
            Rc::clone(&instance),
            exit_on_primary_loss,
        );

        let layout_sync = config.layout_sync.enabled.then(|| {
            let bus: Box<dyn SessionBus> =
                Box::new(DbusSendBus::new(config.layout_sync.bus_program.clone()));
            LayoutSync::new(environment.clone(), setup::kxkbrc_path(), Some(bus))
        });

        let mut module = Self {
            registry,
            instance,
            layout_sync,
            commands,
        };
        module.open_display(PRIMARY_DISPLAY);
        for name in &config.module.displays {
            module.open_display(name);
        }
        module
    }

    /// Replace the layout synchronisation hook.
    #[must_use]
    pub fn with_layout_sync(mut self, layout_sync: Option<LayoutSync>) -> Self {
        self.layout_sync = layout_sync;
        self
    }

    /// Connect to `name`, ignoring failures.
    pub fn open_display(&mut self, name: &str) {
        match self.registry.open(name) {
            Ok(()) => {}
            Err(ConnectionError::AlreadyOpen(_)) => {
                debug!(display = %name, "display already open");
            }
            Err(e) => {
                debug!(display = %name, error = %e, "failed to open display");
            }
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// Push the current group's layout to the desktop shell.
    pub fn sync_layout(&self) -> Option<SyncOutcome> {
        let sync = self.layout_sync.as_ref()?;
        match sync.on_group_changed(
            self.registry.focus_group(PRIMARY_DISPLAY),
            self.instance.as_ref(),
        ) {
            Ok(outcome) => {
                debug!(?outcome, "layout sync");
                Some(outcome)
            }
            Err(e) => {
                warn!(error = %e, "layout sync failed");
                None
            }
        }
    }

    fn handle_command(&mut self, command: ModuleCommand) {
        match command {
            ModuleCommand::OpenDisplay(name) => self.open_display(&name),
            ModuleCommand::CloseDisplay(name) => self.registry.remove(&name),
            ModuleCommand::GroupChanged => {
                self.sync_layout();
            }
            ModuleCommand::Shutdown => {}
        }
    }

    /// Run until [`ModuleCommand::Shutdown`] arrives or every command
    /// sender is gone. Remaining connections are closed on the way out.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        info!(displays = ?self.registry.names(), "wayland module running");

        loop {
            tokio::select! {
                Some(event) = self.registry.next_io_event() => {
                    self.registry.handle_io(event);
                }
                command = self.commands.recv() => {
                    match command {
                        Some(ModuleCommand::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
            }
        }

        self.registry.close_all();
        info!("wayland module stopped");
        Ok(())
    }
}
