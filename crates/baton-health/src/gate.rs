//! Health gate: probe loop ownership, status queries and the start-up barrier

use crate::engine::run_probe;
use crate::error::HealthError;
use crate::probe::{ProbeKind, ProbeSpec};
use crate::status::HealthStatus;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cadence of the start-up barrier, independent of each probe's period
const GATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Health gate options
#[derive(Debug, Clone)]
pub struct HealthOptions {
    /// Block [`Health::init`] until the app is ready and healthy
    pub wait_before_continue: bool,
    /// Max waiting time while blocking
    pub max_waiting_time: Duration,
    /// Readiness probe
    pub readiness: ProbeSpec,
    /// Liveness probe
    pub liveness: ProbeSpec,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            wait_before_continue: false,
            max_waiting_time: Duration::from_secs(30),
            readiness: ProbeSpec::disabled("/readyz"),
            liveness: ProbeSpec::disabled("/healthz"),
        }
    }
}

/// Owns the readiness and liveness probe loops and answers status queries.
///
/// Dropping the gate stops its loops.
#[derive(Debug)]
pub struct Health {
    status: HealthStatus,
    options: HealthOptions,
    stop_ready: CancellationToken,
    stop_live: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Health {
    /// Start the probe loops of every enabled kind.
    ///
    /// Fails without starting anything when an enabled probe has no check or
    /// a zero period or check timeout.
    /// Must be called within a tokio runtime.
    pub fn start(options: HealthOptions) -> Result<Self, HealthError> {
        Self::start_with_status(options, HealthStatus::new())
    }

    /// Like [`Health::start`], publishing verdicts into an existing status
    /// store so handlers can be wired up before the checks exist.
    pub fn start_with_status(
        options: HealthOptions,
        status: HealthStatus,
    ) -> Result<Self, HealthError> {
        for (kind, spec) in [
            (ProbeKind::Readiness, &options.readiness),
            (ProbeKind::Liveness, &options.liveness),
        ] {
            if !spec.enabled {
                continue;
            }
            if spec.check.is_none() {
                return Err(HealthError::MissingCheck(kind));
            }
            if spec.period.is_zero() {
                return Err(HealthError::InvalidTiming(kind, "period"));
            }
            if spec.check_timeout.is_zero() {
                return Err(HealthError::InvalidTiming(kind, "check_timeout"));
            }
        }

        let health = Self {
            status,
            options,
            stop_ready: CancellationToken::new(),
            stop_live: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        };
        health.run_checkers();

        info!(
            readiness = health.options.readiness.enabled,
            liveness = health.options.liveness.enabled,
            "Health gate started"
        );

        Ok(health)
    }

    /// Start the probe loops and, when `wait_before_continue` is set, block
    /// until both kinds pass or `max_waiting_time` elapses.
    pub async fn init(options: HealthOptions) -> Result<Self, HealthError> {
        let health = Self::start(options)?;

        if health.options.wait_before_continue {
            let max_wait = health.options.max_waiting_time;
            if let Err(e) = health.wait_until_ready_and_healthy(max_wait).await {
                health.stop();
                return Err(e);
            }
        }

        Ok(health)
    }

    fn run_checkers(&self) {
        let mut tasks = self.tasks.lock();
        for kind in [ProbeKind::Readiness, ProbeKind::Liveness] {
            let spec = self.spec(kind);
            let Some(check) = spec.check.clone().filter(|_| spec.enabled) else {
                continue;
            };
            tasks.push(tokio::spawn(run_probe(
                kind,
                spec.clone(),
                check,
                self.status.clone(),
                self.stop_token(kind).clone(),
            )));
        }
    }

    /// Poll both flags once per second; succeed as soon as both pass, fail
    /// after `ceil(max_wait / 1s) + 1` failing polls.
    pub async fn wait_until_ready_and_healthy(&self, max_wait: Duration) -> Result<(), HealthError> {
        let max_attempts = max_wait_attempts(max_wait);
        let mut ticker = interval_at(Instant::now() + GATE_POLL_INTERVAL, GATE_POLL_INTERVAL);

        for attempt in 1..=max_attempts {
            ticker.tick().await;
            match self.is_ready_and_healthy() {
                Ok(()) => {
                    info!(attempt, "App is ready and healthy");
                    return Ok(());
                }
                Err(e) => debug!(attempt, max_attempts, reason = %e, "Waiting for app"),
            }
        }

        warn!(
            max_wait_ms = max_wait.as_millis() as u64,
            "App did not become ready and healthy in time"
        );
        Err(HealthError::InitTimeout(max_wait))
    }

    /// Shared status store
    pub fn status(&self) -> &HealthStatus {
        &self.status
    }

    /// `Ok` when readiness is passing
    pub fn is_ready(&self) -> Result<(), HealthError> {
        self.status.is_ready()
    }

    /// `Ok` when liveness is passing
    pub fn is_healthy(&self) -> Result<(), HealthError> {
        self.status.is_healthy()
    }

    /// `Ok` when both kinds are passing
    pub fn is_ready_and_healthy(&self) -> Result<(), HealthError> {
        self.status.is_ready_and_healthy()
    }

    /// Endpoint of the readiness probe
    pub fn ready_endpoint(&self) -> &str {
        &self.options.readiness.endpoint
    }

    /// Endpoint of the liveness probe
    pub fn health_endpoint(&self) -> &str {
        &self.options.liveness.endpoint
    }

    /// Invalidate and stop every enabled probe kind.
    ///
    /// Idempotent and non-blocking; disabled kinds are left untouched.
    pub fn stop(&self) {
        for kind in [ProbeKind::Readiness, ProbeKind::Liveness] {
            if !self.spec(kind).enabled {
                continue;
            }
            let token = self.stop_token(kind);
            let first = !token.is_cancelled();
            token.cancel();
            self.status.invalidate(kind);
            if first {
                info!(%kind, "Probe stop requested");
            }
        }
    }

    /// Wait until every probe loop has exited
    pub async fn wait_stopped(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Probe loop terminated abnormally");
            }
        }
    }

    fn spec(&self, kind: ProbeKind) -> &ProbeSpec {
        match kind {
            ProbeKind::Readiness => &self.options.readiness,
            ProbeKind::Liveness => &self.options.liveness,
        }
    }

    fn stop_token(&self, kind: ProbeKind) -> &CancellationToken {
        match kind {
            ProbeKind::Readiness => &self.stop_ready,
            ProbeKind::Liveness => &self.stop_live,
        }
    }
}

impl Drop for Health {
    fn drop(&mut self) {
        self.stop_ready.cancel();
        self.stop_live.cancel();
    }
}

fn max_wait_attempts(max_wait: Duration) -> u64 {
    let whole = max_wait.as_secs();
    let partial = u64::from(max_wait.subsec_nanos() > 0);
    whole + partial + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_wait_attempts() {
        assert_eq!(max_wait_attempts(Duration::ZERO), 1);
        assert_eq!(max_wait_attempts(Duration::from_secs(3)), 4);
        assert_eq!(max_wait_attempts(Duration::from_millis(2500)), 4);
    }

    #[tokio::test]
    async fn test_missing_check_is_rejected() {
        let options = HealthOptions {
            readiness: ProbeSpec {
                enabled: true,
                ..ProbeSpec::disabled("/readyz")
            },
            ..Default::default()
        };

        let err = Health::start(options).unwrap_err();
        assert!(matches!(err, HealthError::MissingCheck(ProbeKind::Readiness)));
    }

    #[tokio::test]
    async fn test_zero_timing_is_rejected() {
        let check = crate::probe::check_fn(|_ctx| async { Ok::<(), crate::CheckError>(()) });

        let options = HealthOptions {
            readiness: ProbeSpec::enabled("/readyz", check.clone()).timing(
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_millis(10),
            ),
            ..Default::default()
        };
        let err = Health::start(options).unwrap_err();
        assert!(matches!(err, HealthError::InvalidTiming(ProbeKind::Readiness, "period")));
        assert_eq!(err.to_status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);

        let options = HealthOptions {
            liveness: ProbeSpec::enabled("/healthz", check).timing(
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::ZERO,
            ),
            ..Default::default()
        };
        let err = Health::start(options).unwrap_err();
        assert!(matches!(
            err,
            HealthError::InvalidTiming(ProbeKind::Liveness, "check_timeout")
        ));
    }

    #[tokio::test]
    async fn test_disabled_gate_never_passes() {
        let health = Health::start(HealthOptions::default()).unwrap();
        assert!(health.is_ready().is_err());
        assert!(health.is_healthy().is_err());
        assert_eq!(health.ready_endpoint(), "/readyz");
        assert_eq!(health.health_endpoint(), "/healthz");
    }
}
