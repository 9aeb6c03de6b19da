//! Display connection manager for waylink.
//!
//! Keeps a table of named Wayland connections, drives each connection's
//! read/dispatch/flush cycle from the tokio reactor, retires connections
//! that fail, and tells subscribers when connections come and go. Also
//! hosts the module glue: config loading, session detection and the KDE
//! keyboard layout sync.

pub mod bus;
pub mod config;
pub mod connection;
pub mod environment;
pub mod error;
pub mod focus;
pub mod instance;
pub mod io;
pub mod kxkbrc;
pub mod layout;
pub mod layout_sync;
pub mod module;
pub mod registry;
pub mod setup;
pub mod subscription;

pub use config::Config;
pub use connection::{Connection, ConnectionId};
pub use environment::{DesktopType, Environment};
pub use error::{ConnectionError, DaemonError};
pub use focus::{FocusGroup, InputContextManager};
pub use instance::Instance;
pub use io::{IoFlags, Readiness};
pub use module::{ModuleCommand, WaylandModule};
pub use registry::{ConnectionRegistry, PRIMARY_DISPLAY};
pub use subscription::{HandlerEntry, HandlerTable};
