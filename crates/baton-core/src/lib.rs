//! # Baton Core
//!
//! Core types and error handling for the Baton lifecycle controller.
//!
//! This crate provides the foundational abstractions shared by the health gate
//! and the upgrade coordinator:
//! - Error types
//! - Listener descriptors and transport modes
//! - Supported socket networks

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ListenerDescriptor, Network, TransportMode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ListenerDescriptor, Network, TransportMode};
}
