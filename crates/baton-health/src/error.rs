//! Error types for the health gate

use crate::probe::ProbeKind;
use http::StatusCode;
use std::time::Duration;

/// Error returned by a probe check callback
pub type CheckError = Box<dyn std::error::Error + Send + Sync>;

/// Health gate errors
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// Readiness verdict is not passing
    #[error("app is not ready")]
    NotReady,

    /// Liveness verdict is not passing
    #[error("app is not healthy")]
    NotHealthy,

    /// Neither verdict is passing
    #[error("app is not ready nor healthy")]
    NotReadyAndHealthy,

    /// The readiness gate gave up waiting
    #[error(
        "max waiting time of {}s elapsed before app was ready and healthy",
        .0.as_secs_f64()
    )]
    InitTimeout(Duration),

    /// A probe was enabled without a check callback
    #[error("{0} probe is enabled but has no check function")]
    MissingCheck(ProbeKind),

    /// A probe was enabled with a zero period or check timeout
    #[error("{0} probe {1} must be > 0")]
    InvalidTiming(ProbeKind, &'static str),
}

impl HealthError {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            HealthError::MissingCheck(_) | HealthError::InvalidTiming(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Map a probe query result to the status code of its HTTP endpoint
pub fn probe_status(result: &Result<(), HealthError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::OK,
        Err(e) => e.to_status_code(),
    }
}
