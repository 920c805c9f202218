//! # Baton Runtime
//!
//! Process lifecycle for zero-downtime restarts:
//! - Listener binding with address reuse across generations
//! - Upgrade coordination and readiness handoff
//! - Signal-driven upgrade and exit triggers
//! - Graceful drain with a forced-exit deadline
//! - HTTP server component with probe endpoints

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod coordinator;
pub mod fd;
pub mod handler;
pub mod pidfile;
pub mod registry;
pub mod server;
pub mod tls;
pub mod trigger;

pub use coordinator::{
    CoordinatorOptions, CoordinatorState, ProcessExit, StateView, Terminator, UpgradeCoordinator,
};
pub use fd::{ListenerBinder, Upgrader, UpgraderOptions, UPGRADE_SOCKET_ENV};
pub use handler::{text_response, Body, Handler, HealthHandler, NotFound};
pub use pidfile::PidFile;
pub use registry::{ServerComponent, ServerRegistry};
pub use server::HttpServer;
pub use tls::TlsAcceptor;
pub use trigger::{ChannelTriggers, SignalTriggers, Trigger, TriggerSource};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::coordinator::{
        CoordinatorOptions, CoordinatorState, StateView, UpgradeCoordinator,
    };
    pub use crate::fd::{ListenerBinder, Upgrader, UpgraderOptions};
    pub use crate::handler::{Handler, HealthHandler};
    pub use crate::registry::{ServerComponent, ServerRegistry};
    pub use crate::server::HttpServer;
    pub use crate::trigger::{ChannelTriggers, SignalTriggers, Trigger, TriggerSource};
}
