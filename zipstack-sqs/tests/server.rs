//! Lifecycle tests for the embedded server

use std::net::{IpAddr, Ipv4Addr};

use zipstack_sqs::{EmbeddedSqsServer, ServerError, SqsLimits};

#[tokio::test]
async fn test_start_reports_ready_and_stops() {
    let mut server = EmbeddedSqsServer::builder()
        .limits(SqsLimits::Strict)
        .queue("zipkin")
        .start()
        .await
        .unwrap();

    assert_ne!(server.port(), 0);
    assert!(server.is_running());
    assert_eq!(server.url(), format!("http://localhost:{}", server.port()));

    let queue = server.state().storage.get_queue("zipkin").unwrap();
    assert_eq!(
        queue.url,
        format!("http://localhost:{}/000000000000/zipkin", server.port())
    );

    let health = reqwest::get(format!("http://127.0.0.1:{}/health", server.port()))
        .await
        .unwrap();
    assert!(health.status().is_success());

    server.stop_and_wait().await.unwrap();
    assert!(!server.is_running());
    assert!(reqwest::get(format!("http://127.0.0.1:{}/health", server.port()))
        .await
        .is_err());

    // second stop is a no-op
    server.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_port_can_be_reused_after_stop() {
    let port = portpicker::pick_unused_port().unwrap();

    let mut first = EmbeddedSqsServer::builder().port(port).start().await.unwrap();
    assert_eq!(first.port(), port);
    first.stop_and_wait().await.unwrap();

    let mut second = EmbeddedSqsServer::builder().port(port).start().await.unwrap();
    assert_eq!(second.port(), port);
    second.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_bind_conflict() {
    let mut running = EmbeddedSqsServer::builder()
        .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .start()
        .await
        .unwrap();

    let err = EmbeddedSqsServer::builder()
        .port(running.port())
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));

    running.stop_and_wait().await.unwrap();
}

#[tokio::test]
async fn test_invalid_queue_name_fails_start() {
    let err = EmbeddedSqsServer::builder()
        .queue("not a queue")
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Sqs(_)));
}
