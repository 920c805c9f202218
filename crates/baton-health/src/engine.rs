//! Per-kind polling loop

use crate::error::CheckError;
use crate::probe::{Check, ProbeContext, ProbeKind, ProbeSpec, ProbeState, Verdict};
use crate::status::HealthStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Poll `check` on the probe's period until `stop` is cancelled, publishing
/// committed verdicts into `status`.
pub(crate) async fn run_probe(
    kind: ProbeKind,
    spec: ProbeSpec,
    check: Arc<dyn Check>,
    status: HealthStatus,
    stop: CancellationToken,
) {
    let delay = spec.start_delay();

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = stop.cancelled() => {
            debug!(%kind, "Probe stopped before its first check");
            return;
        }
    }

    info!(
        %kind,
        delay_ms = delay.as_millis() as u64,
        period_ms = spec.period.as_millis() as u64,
        "Probe started"
    );

    let mut ticker = interval_at(Instant::now() + spec.period, spec.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = ProbeState::new();

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => {
                debug!(%kind, "Probe stopped");
                return;
            }

            _ = ticker.tick() => {
                let outcome = run_check(check.as_ref(), spec.check_timeout).await;
                if let Err(e) = &outcome {
                    debug!(%kind, error = %e, "Probe check failed");
                }

                let Some(verdict) = state.record(
                    outcome.is_ok(),
                    spec.success_threshold,
                    spec.failure_threshold,
                ) else {
                    continue;
                };

                match status.commit(kind, verdict == Verdict::Passing, &stop) {
                    Some(true) => info!(
                        %kind,
                        %verdict,
                        initial_delay_ms = spec.initial_delay.as_millis() as u64,
                        "Probe verdict changed"
                    ),
                    Some(false) => {}
                    None => return,
                }
            }
        }
    }
}

/// Run one check bounded by `timeout`. A timed-out check counts as failed and
/// its context is cancelled.
async fn run_check(check: &dyn Check, timeout: Duration) -> Result<(), CheckError> {
    let token = CancellationToken::new();
    let ctx = ProbeContext::new(Instant::now() + timeout, token.clone());

    let result = tokio::time::timeout(timeout, check.check(ctx)).await;
    token.cancel();

    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(format!("check timed out after {}ms", timeout.as_millis()).into()),
    }
}
