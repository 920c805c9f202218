use baton_health::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn passing() -> Arc<dyn Check> {
    check_fn(|_ctx| async { Ok::<(), CheckError>(()) })
}

fn failing() -> Arc<dyn Check> {
    check_fn(|_ctx| async { Err::<(), CheckError>("down".into()) })
}

fn toggled(flag: Arc<AtomicBool>) -> Arc<dyn Check> {
    check_fn(move |_ctx| {
        let up = flag.load(Ordering::SeqCst);
        async move {
            if up {
                Ok::<(), CheckError>(())
            } else {
                Err("toggled off".into())
            }
        }
    })
}

fn probe(endpoint: &str, check: Arc<dyn Check>) -> ProbeSpec {
    ProbeSpec::enabled(endpoint, check).thresholds(0, 0).timing(
        Duration::ZERO,
        Duration::from_secs(1),
        Duration::from_millis(100),
    )
}

#[tokio::test(start_paused = true)]
async fn test_gate_times_out_after_max_wait_plus_one_poll() {
    let options = HealthOptions {
        wait_before_continue: true,
        max_waiting_time: Duration::from_secs(3),
        ..Default::default()
    };

    let started = Instant::now();
    let err = Health::init(options).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, HealthError::InitTimeout(_)));
    assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_init_returns_once_ready_and_healthy() {
    let options = HealthOptions {
        wait_before_continue: true,
        max_waiting_time: Duration::from_secs(10),
        readiness: probe("/readyz", passing()),
        liveness: probe("/healthz", passing()),
    };

    let started = Instant::now();
    let health = Health::init(options).await.unwrap();

    assert!(started.elapsed() <= Duration::from_secs(2));
    assert!(health.is_ready_and_healthy().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_init_failure_stops_probes() {
    let options = HealthOptions {
        wait_before_continue: true,
        max_waiting_time: Duration::from_secs(2),
        readiness: probe("/readyz", passing()),
        liveness: probe("/healthz", failing()),
    };

    let err = Health::init(options).await.unwrap_err();
    assert!(matches!(err, HealthError::InitTimeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_kinds_are_reported_independently() {
    let health = Health::start(HealthOptions {
        readiness: probe("/readyz", passing()),
        liveness: probe("/healthz", failing()),
        ..Default::default()
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(health.is_ready().is_ok());
    assert!(matches!(health.is_healthy(), Err(HealthError::NotHealthy)));
    assert!(matches!(
        health.is_ready_and_healthy(),
        Err(HealthError::NotHealthy)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_verdict_recovers_after_outage() {
    let up = Arc::new(AtomicBool::new(true));
    let health = Health::start(HealthOptions {
        liveness: probe("/healthz", toggled(Arc::clone(&up))),
        ..Default::default()
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(health.is_healthy().is_ok());

    up.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(health.is_healthy().is_err());

    up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(health.is_healthy().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_final() {
    let health = Health::start(HealthOptions {
        readiness: probe("/readyz", passing()),
        liveness: probe("/healthz", passing()),
        ..Default::default()
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(health.is_ready_and_healthy().is_ok());

    health.stop();
    health.stop();
    assert!(matches!(
        health.is_ready_and_healthy(),
        Err(HealthError::NotReadyAndHealthy)
    ));

    tokio::time::timeout(Duration::from_secs(1), health.wait_stopped())
        .await
        .expect("probe loops should exit after stop");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(health.is_ready().is_err());
    assert!(health.is_healthy().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stop_with_disabled_probes() {
    let health = Health::start(HealthOptions::default()).unwrap();

    health.stop();
    health.wait_stopped().await;

    assert!(health.is_ready().is_err());
    assert!(health.is_healthy().is_err());
}

#[tokio::test]
async fn test_enabled_probe_without_check_fails_fast() {
    let options = HealthOptions {
        liveness: ProbeSpec {
            enabled: true,
            ..ProbeSpec::disabled("/healthz")
        },
        ..Default::default()
    };

    let err = Health::init(options).await.unwrap_err();
    assert!(matches!(err, HealthError::MissingCheck(ProbeKind::Liveness)));
    assert_eq!(err.to_status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
}
