//! Shared readiness/liveness flags

use crate::error::HealthError;
use crate::probe::ProbeKind;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Flags {
    ready: bool,
    healthy: bool,
}

impl Flags {
    fn slot(&mut self, kind: ProbeKind) -> &mut bool {
        match kind {
            ProbeKind::Readiness => &mut self.ready,
            ProbeKind::Liveness => &mut self.healthy,
        }
    }
}

/// Latest committed verdicts of both probe kinds.
///
/// Cheap to clone; every clone shares the same lock.
#[derive(Debug, Clone, Default)]
pub struct HealthStatus {
    flags: Arc<RwLock<Flags>>,
}

impl HealthStatus {
    /// Both flags start out `false`
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a committed verdict unless the kind's loop was stopped.
    ///
    /// Returns `Some(changed)` when written, `None` when `stop` was already
    /// cancelled.
    pub(crate) fn commit(
        &self,
        kind: ProbeKind,
        value: bool,
        stop: &CancellationToken,
    ) -> Option<bool> {
        let mut flags = self.flags.write();
        if stop.is_cancelled() {
            return None;
        }
        let slot = flags.slot(kind);
        let changed = *slot != value;
        *slot = value;
        Some(changed)
    }

    /// Force a kind to `false`
    pub(crate) fn invalidate(&self, kind: ProbeKind) {
        *self.flags.write().slot(kind) = false;
    }

    /// Current flag of one kind
    pub fn get(&self, kind: ProbeKind) -> bool {
        let flags = self.flags.read();
        match kind {
            ProbeKind::Readiness => flags.ready,
            ProbeKind::Liveness => flags.healthy,
        }
    }

    /// `Ok` when readiness is passing
    pub fn is_ready(&self) -> Result<(), HealthError> {
        if self.flags.read().ready {
            Ok(())
        } else {
            Err(HealthError::NotReady)
        }
    }

    /// `Ok` when liveness is passing
    pub fn is_healthy(&self) -> Result<(), HealthError> {
        if self.flags.read().healthy {
            Ok(())
        } else {
            Err(HealthError::NotHealthy)
        }
    }

    /// `Ok` when both are passing, otherwise the error naming what failed.
    /// Both flags are read under one lock acquisition.
    pub fn is_ready_and_healthy(&self) -> Result<(), HealthError> {
        let flags = self.flags.read();
        match (flags.ready, flags.healthy) {
            (true, true) => Ok(()),
            (false, true) => Err(HealthError::NotReady),
            (true, false) => Err(HealthError::NotHealthy),
            (false, false) => Err(HealthError::NotReadyAndHealthy),
        }
    }
}
