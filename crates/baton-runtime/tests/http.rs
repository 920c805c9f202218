use baton_core::{Error, ListenerDescriptor, TransportMode};
use baton_health::prelude::*;
use baton_runtime::prelude::*;
use baton_runtime::NotFound;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn passing_probe(endpoint: &str) -> ProbeSpec {
    ProbeSpec::enabled(endpoint, check_fn(|_ctx| async { Ok::<(), CheckError>(()) }))
        .thresholds(0, 0)
        .timing(
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(50),
        )
}

#[tokio::test]
async fn test_probe_endpoints_and_gate_over_http() {
    let health = Health::start(HealthOptions {
        readiness: passing_probe("/readyz"),
        liveness: passing_probe("/healthz"),
        ..Default::default()
    })
    .unwrap();

    let handler = HealthHandler::new(
        health.status().clone(),
        health.ready_endpoint(),
        health.health_endpoint(),
        Arc::new(NotFound),
    );
    let server = Arc::new(
        HttpServer::new("api", Arc::new(handler))
            .listen(ListenerDescriptor::plain("127.0.0.1:0")),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(TransportMode::Plain, listener).await })
    };

    let response = get(addr, "/readyz").await;
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");

    let response = get(addr, "/orders").await;
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");
    assert!(response.ends_with("Service is Unavailable"), "{response}");

    health
        .wait_until_ready_and_healthy(Duration::from_secs(5))
        .await
        .unwrap();

    let response = get(addr, "/readyz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let response = get(addr, "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let response = get(addr, "/orders").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    health.stop();
    let response = get(addr, "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");

    server.shutdown().await.unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_occupied_address_fails_bind() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = occupied.local_addr().unwrap().to_string();

    let mut registry = ServerRegistry::new();
    registry
        .register(Arc::new(
            HttpServer::new("api", Arc::new(NotFound))
                .listen(ListenerDescriptor::plain(address.clone())),
        ))
        .unwrap();

    let upgrader = Upgrader::new(UpgraderOptions::default()).unwrap();
    let coordinator =
        UpgradeCoordinator::new(registry, Arc::new(upgrader), CoordinatorOptions::default());

    let (_sender, triggers) = ChannelTriggers::new(1);
    let err = coordinator.run(triggers).await.unwrap_err();

    match err {
        Error::Bind { descriptor, .. } => assert_eq!(descriptor.address, address),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(coordinator.state(), CoordinatorState::Exited);
    drop(occupied);
}
