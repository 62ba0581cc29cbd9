//! Integration tests for the SQS fixture
//!
//! These tests drive `SqsRule` against the embedded server through the AWS SDK.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use zipstack_span::{
    decode_list, encode_list, encode_message_body, CodecError, Kind, Span, SpanEncoding,
};
use zipstack_sqs::{RunningSqsServer, ServerError, SqsLimits};
use zipstack_test::{
    free_port, init_test_tracing, DeleteTiming, EmbeddedSqsLauncher, FixtureError,
    QueueServerLauncher, RuleConfig, SqsRule, TestLifecycle,
};

/// Counts launches and delegates to the embedded server
#[derive(Default, Clone)]
struct CountingLauncher {
    launches: Arc<AtomicUsize>,
}

#[async_trait]
impl QueueServerLauncher for CountingLauncher {
    type Handle = RunningSqsServer;

    async fn launch(&self, port: u16, limits: SqsLimits) -> Result<Self::Handle, ServerError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        EmbeddedSqsLauncher.launch(port, limits).await
    }
}

struct FailingLauncher;

#[async_trait]
impl QueueServerLauncher for FailingLauncher {
    type Handle = RunningSqsServer;

    async fn launch(&self, _port: u16, _limits: SqsLimits) -> Result<Self::Handle, ServerError> {
        Err(ServerError::HealthCheckFailed(0))
    }
}

fn span(trace_id: &str, id: &str, name: &str) -> Span {
    let mut span = Span::new(trace_id, id);
    span.name = Some(name.to_string());
    span.kind = Some(Kind::Producer);
    span.timestamp = Some(1_472_470_996_199_000);
    span
}

fn json_body(spans: &[Span]) -> String {
    encode_message_body(SpanEncoding::Json, spans).unwrap()
}

async fn started(config: RuleConfig) -> SqsRule {
    init_test_tracing();
    let mut rule = SqsRule::with_config(config);
    rule.start(free_port().unwrap()).await.unwrap();
    rule.before().await.unwrap();
    rule
}

#[tokio::test]
async fn test_start_records_stable_queue_url() {
    let launcher = CountingLauncher::default();
    let launches = Arc::clone(&launcher.launches);
    let mut rule = SqsRule::with_launcher(launcher, RuleConfig::default());
    let port = free_port().unwrap();

    assert!(rule.queue_url().is_none());

    rule.start(port).await.unwrap();
    let url = rule.queue_url().unwrap().to_string();
    assert!(url.ends_with("/zipkin"));
    assert!(url.contains(&port.to_string()));

    // second start reuses server and queue
    rule.start(port).await.unwrap();
    assert_eq!(rule.queue_url(), Some(url.as_str()));
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    let queues = rule
        .client()
        .unwrap()
        .list_queues()
        .send()
        .await
        .unwrap();
    assert_eq!(queues.queue_urls().to_vec(), vec![url]);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_before_purges_queue() {
    let mut rule = started(RuleConfig::default()).await;

    for i in 1..=3 {
        rule.send(json_body(&[span("1", &format!("{i:x}"), "op")]))
            .await
            .unwrap();
    }
    assert_eq!(rule.queue_count().await.unwrap(), 3);

    rule.before().await.unwrap();
    assert_eq!(rule.queue_count().await.unwrap(), 0);
    assert_eq!(rule.not_visible_count().await.unwrap(), 0);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_fresh_queue_has_no_messages() {
    let mut rule = started(RuleConfig::default()).await;

    assert_eq!(rule.queue_count().await.unwrap(), 0);
    assert_eq!(rule.not_visible_count().await.unwrap(), 0);
    assert!(rule.get_spans(false).await.unwrap().is_empty());

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_get_spans_without_delete_keeps_messages_in_flight() {
    let mut rule = started(RuleConfig::default()).await;

    let first = vec![span("a", "1", "first"), span("a", "2", "second")];
    let second = vec![span("b", "3", "third")];
    rule.send(json_body(&first)).await.unwrap();
    rule.send(json_body(&second)).await.unwrap();

    let spans = rule.get_spans(false).await.unwrap();
    let names: Vec<_> = spans.iter().filter_map(|s| s.name.as_deref()).collect();
    assert_eq!(names, ["first", "second", "third"]);
    assert_eq!(spans[0].trace_id, "000000000000000a");

    assert_eq!(rule.queue_count().await.unwrap(), 0);
    assert_eq!(rule.not_visible_count().await.unwrap(), 2);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_base64_proto_body_decodes_like_raw_proto() {
    let mut rule = started(RuleConfig::default()).await;

    let spans = vec![span("463ac35c9f6413ad48485a3953bb6124", "a2fb4a1d1a96d312", "rpc")];
    let raw = encode_list(SpanEncoding::Proto3, &spans).unwrap();
    rule.send(STANDARD.encode(&raw)).await.unwrap();

    let drained = rule.get_spans(false).await.unwrap();
    assert_eq!(drained, decode_list(SpanEncoding::Proto3, &raw).unwrap());
    assert_eq!(drained, spans);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_base64_json_body() {
    let mut rule = started(RuleConfig::default()).await;

    let spans = vec![span("1", "2", "encoded")];
    rule.send(STANDARD.encode(json_body(&spans))).await.unwrap();

    let drained = rule.get_spans(false).await.unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].name.as_deref(), Some("encoded"));

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_deferred_delete_leaves_first_batch_in_flight() {
    let mut rule = started(RuleConfig::default()).await;

    for i in 1..=3 {
        rule.send(json_body(&[span("1", &format!("{i}"), "op")]))
            .await
            .unwrap();
    }

    let spans = rule.get_spans(true).await.unwrap();
    assert_eq!(spans.len(), 3);

    // batches 2 and 3 were deleted, batch 1 was not
    assert_eq!(rule.queue_count().await.unwrap(), 0);
    assert_eq!(rule.not_visible_count().await.unwrap(), 1);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_immediate_delete_removes_every_batch() {
    let config = RuleConfig::default().with_delete_timing(DeleteTiming::Immediate);
    let mut rule = started(config).await;

    for i in 1..=3 {
        rule.send(json_body(&[span("1", &format!("{i}"), "op")]))
            .await
            .unwrap();
    }

    let spans = rule.get_spans(true).await.unwrap();
    assert_eq!(spans.len(), 3);
    assert_eq!(rule.queue_count().await.unwrap(), 0);
    assert_eq!(rule.not_visible_count().await.unwrap(), 0);

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_malformed_body_fails_drain() {
    let mut rule = started(RuleConfig::default()).await;

    rule.send("[{\"traceId\":").await.unwrap();

    let err = rule.get_spans(false).await.unwrap_err();
    assert!(matches!(err, FixtureError::Codec(CodecError::Json(_))));

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_empty_body_fails_drain() {
    let config = RuleConfig {
        limits: SqsLimits::Relaxed,
        ..RuleConfig::default()
    };
    let mut rule = started(config).await;

    rule.send("").await.unwrap();

    let err = rule.get_spans(false).await.unwrap_err();
    assert!(matches!(err, FixtureError::Codec(CodecError::EmptyBody)));

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_strict_limits_reject_empty_body() {
    let mut rule = started(RuleConfig::default()).await;

    let err = rule.send("").await.unwrap_err();
    assert!(matches!(err, FixtureError::Sqs(_)));

    rule.after().await.unwrap();
}

#[tokio::test]
async fn test_operations_before_start() {
    let mut rule = SqsRule::new();

    assert!(matches!(rule.queue_count().await, Err(FixtureError::NotStarted)));
    assert!(matches!(
        rule.not_visible_count().await,
        Err(FixtureError::NotStarted)
    ));
    assert!(matches!(rule.get_spans(true).await, Err(FixtureError::NotStarted)));
    assert!(matches!(rule.send("[]").await, Err(FixtureError::NotStarted)));

    // hooks are no-ops
    rule.before().await.unwrap();
    rule.after().await.unwrap();
    assert!(rule.queue_url().is_none());
}

#[tokio::test]
async fn test_start_after_stop_fails() {
    let port = free_port().unwrap();
    let mut rule = SqsRule::new();
    rule.start(port).await.unwrap();
    rule.after().await.unwrap();
    assert!(!rule.is_running());

    assert!(matches!(rule.start(port).await, Err(FixtureError::Stopped)));
    assert!(matches!(rule.queue_count().await, Err(FixtureError::Stopped)));
    rule.after().await.unwrap();

    // the port is free again
    let mut next = SqsRule::new();
    next.start(port).await.unwrap();
    assert_eq!(next.queue_count().await.unwrap(), 0);
    next.after().await.unwrap();
}

#[tokio::test]
async fn test_failed_launch_leaves_fixture_unstarted() {
    let mut rule = SqsRule::with_launcher(FailingLauncher, RuleConfig::default());

    let err = rule.start(free_port().unwrap()).await.err().unwrap();
    assert!(matches!(err, FixtureError::Server(ServerError::HealthCheckFailed(0))));
    assert!(rule.queue_url().is_none());
    assert!(matches!(rule.queue_count().await, Err(FixtureError::NotStarted)));
}

#[tokio::test]
async fn test_lifecycle_hooks() {
    let mut rule = SqsRule::new();
    let port = free_port().unwrap();

    TestLifecycle::start(&mut rule, port).await.unwrap();
    rule.send(json_body(&[span("1", "2", "op")])).await.unwrap();

    rule.before_each().await.unwrap();
    assert_eq!(rule.queue_count().await.unwrap(), 0);

    rule.after_all().await.unwrap();
    assert!(!rule.is_running());
}

#[tokio::test]
async fn test_custom_queue_name() {
    let config = RuleConfig::default().with_queue_name("spans");
    let mut rule = started(config).await;

    assert!(rule.queue_url().unwrap().ends_with("/spans"));

    rule.after().await.unwrap();
}
