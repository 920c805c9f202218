//! Error types for the Baton lifecycle controller

use crate::types::ListenerDescriptor;
use std::time::Duration;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the lifecycle controller
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error, never retried
    #[error("Configuration error: {0}")]
    Config(String),

    /// A declared listener could not be obtained
    #[error("Failed to bind {descriptor}: {source}")]
    Bind {
        /// The descriptor that could not be bound
        descriptor: ListenerDescriptor,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Readiness could not be signaled to the supervisor or parent generation
    #[error("Failed to signal readiness: {0}")]
    ReadinessSignal(String),

    /// Spawning or handing off to a new generation failed
    #[error("Upgrade failed: {0}")]
    Upgrade(String),

    /// An upgrade attempt is already running
    #[error("Upgrade already in progress")]
    UpgradeInProgress,

    /// This generation already handed its listeners to a successor
    #[error("Process generation already upgraded")]
    AlreadyUpgraded,

    /// Graceful shutdown did not finish within the deadline
    #[error("Forced shutdown after {}ms: graceful shutdown did not complete", .0.as_millis())]
    ForcedShutdownTimeout(Duration),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::UpgradeInProgress | Error::AlreadyUpgraded => StatusCode::CONFLICT,
            Error::ForcedShutdownTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a bind error for a descriptor
    pub fn bind(descriptor: ListenerDescriptor, source: std::io::Error) -> Self {
        Error::Bind { descriptor, source }
    }
}
