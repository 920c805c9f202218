//! # Baton Health
//!
//! Readiness and liveness probing for the Baton lifecycle controller:
//! - Periodic probe loops with per-check timeouts
//! - Threshold hysteresis before a verdict flips
//! - Shared status store safe for concurrent readers
//! - Start-up barrier that blocks until the app is ready and healthy

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod engine;
pub mod error;
pub mod gate;
pub mod probe;
pub mod status;

pub use error::{probe_status, CheckError, HealthError};
pub use gate::{Health, HealthOptions};
pub use probe::{check_fn, Check, ProbeContext, ProbeKind, ProbeSpec, ProbeState, Verdict};
pub use status::HealthStatus;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{probe_status, CheckError, HealthError};
    pub use crate::gate::{Health, HealthOptions};
    pub use crate::probe::{check_fn, Check, ProbeContext, ProbeKind, ProbeSpec, Verdict};
    pub use crate::status::HealthStatus;
}
