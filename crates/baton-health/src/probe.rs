//! Probe definitions and the hysteresis state machine

use crate::error::CheckError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Probe kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Whether the app may receive traffic
    Readiness,
    /// Whether the app is alive
    Liveness,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Readiness => write!(f, "readiness"),
            ProbeKind::Liveness => write!(f, "liveness"),
        }
    }
}

/// Committed verdict of a probe kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No threshold crossed yet
    Unknown,
    /// Success threshold exceeded
    Passing,
    /// Failure threshold exceeded
    Failing,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unknown => write!(f, "unknown"),
            Verdict::Passing => write!(f, "passing"),
            Verdict::Failing => write!(f, "failing"),
        }
    }
}

/// Context handed to a check callback
///
/// The probe loop cancels the token once `deadline` elapses. A callback that
/// ignores cancellation is dropped at the deadline, but any task it spawned
/// on its own keeps running.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    deadline: Instant,
    token: CancellationToken,
}

impl ProbeContext {
    /// Create a context expiring at `deadline`
    pub fn new(deadline: Instant, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    /// Point in time after which the check counts as failed
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Abort the check early
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the check was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the check is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancellation token, for passing to nested work
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A user-supplied probe check
#[async_trait]
pub trait Check: Send + Sync {
    /// Run one check. `Err` counts as a failure outcome.
    async fn check(&self, ctx: ProbeContext) -> Result<(), CheckError>;
}

struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> Check for FnCheck<F>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), CheckError>> + Send,
{
    async fn check(&self, ctx: ProbeContext) -> Result<(), CheckError> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a [`Check`]
pub fn check_fn<F, Fut>(f: F) -> Arc<dyn Check>
where
    F: Fn(ProbeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CheckError>> + Send + 'static,
{
    Arc::new(FnCheck(f))
}

/// Configuration of one probe kind, immutable once the gate starts
#[derive(Clone)]
pub struct ProbeSpec {
    /// Run this probe
    pub enabled: bool,
    /// Consecutive successes that must be exceeded to commit `Passing`
    pub success_threshold: u32,
    /// Consecutive failures that must be exceeded to commit `Failing`
    pub failure_threshold: u32,
    /// Time before the first check
    pub initial_delay: Duration,
    /// Interval between checks
    pub period: Duration,
    /// Timeout of a single check
    pub check_timeout: Duration,
    /// Check callback, required when enabled
    pub check: Option<Arc<dyn Check>>,
    /// HTTP path the probe is exposed on
    pub endpoint: String,
}

impl ProbeSpec {
    /// A disabled probe
    pub fn disabled(endpoint: impl Into<String>) -> Self {
        Self {
            enabled: false,
            success_threshold: 1,
            failure_threshold: 3,
            initial_delay: Duration::ZERO,
            period: Duration::from_secs(10),
            check_timeout: Duration::from_secs(1),
            check: None,
            endpoint: endpoint.into(),
        }
    }

    /// An enabled probe running `check` with default timings
    pub fn enabled(endpoint: impl Into<String>, check: Arc<dyn Check>) -> Self {
        Self {
            enabled: true,
            check: Some(check),
            ..Self::disabled(endpoint)
        }
    }

    /// Set both thresholds
    pub fn thresholds(mut self, success: u32, failure: u32) -> Self {
        self.success_threshold = success;
        self.failure_threshold = failure;
        self
    }

    /// Set initial delay, period and check timeout
    pub fn timing(
        mut self,
        initial_delay: Duration,
        period: Duration,
        check_timeout: Duration,
    ) -> Self {
        self.initial_delay = initial_delay;
        self.period = period;
        self.check_timeout = check_timeout;
        self
    }

    /// Sleep before the ticker starts, so the first tick lands at `initial_delay`
    pub fn start_delay(&self) -> Duration {
        self.initial_delay.saturating_sub(self.period)
    }
}

impl fmt::Debug for ProbeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeSpec")
            .field("enabled", &self.enabled)
            .field("success_threshold", &self.success_threshold)
            .field("failure_threshold", &self.failure_threshold)
            .field("initial_delay", &self.initial_delay)
            .field("period", &self.period)
            .field("check_timeout", &self.check_timeout)
            .field("has_check", &self.check.is_some())
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Per-kind hysteresis counters, owned by that kind's polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeState {
    consecutive_successes: u32,
    consecutive_failures: u32,
    verdict: Verdict,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeState {
    /// Fresh state with an unknown verdict
    pub fn new() -> Self {
        Self {
            consecutive_successes: 0,
            consecutive_failures: 0,
            verdict: Verdict::Unknown,
        }
    }

    /// Current committed verdict
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Running success streak
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Running failure streak
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record one outcome.
    ///
    /// Returns the verdict to publish once the streak strictly exceeds its
    /// threshold, after which both counters restart from zero. An opposite
    /// outcome breaks the running streak.
    pub fn record(
        &mut self,
        success: bool,
        success_threshold: u32,
        failure_threshold: u32,
    ) -> Option<Verdict> {
        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            if self.consecutive_successes > success_threshold {
                return Some(self.commit(Verdict::Passing));
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures > failure_threshold {
                return Some(self.commit(Verdict::Failing));
            }
        }
        None
    }

    fn commit(&mut self, verdict: Verdict) -> Verdict {
        self.verdict = verdict;
        self.consecutive_successes = 0;
        self.consecutive_failures = 0;
        verdict
    }
}
