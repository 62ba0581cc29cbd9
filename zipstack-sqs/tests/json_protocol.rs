//! Router-level tests of the AWS JSON 1.0 protocol

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use zipstack_sqs::{router, SqsLimits, SqsState};

const BASE_URL: &str = "http://localhost:9324";
const QUEUE_URL: &str = "http://localhost:9324/000000000000/zipkin";

fn app(limits: SqsLimits) -> Router {
    router(Arc::new(SqsState::new(BASE_URL, limits)))
}

async fn call(app: &Router, operation: &str, body: Value) -> (StatusCode, Value, Option<String>) {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("X-Amz-Target", format!("AmazonSQS.{operation}"))
        .header("Content-Type", "application/x-amz-json-1.0")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    assert!(response.headers().contains_key("x-amzn-requestid"));
    let query_error = response
        .headers()
        .get("x-amzn-query-error")
        .map(|v| v.to_str().unwrap().to_string());

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, query_error)
}

async fn create_zipkin(app: &Router) {
    let (status, body, _) = call(app, "CreateQueue", json!({"QueueName": "zipkin"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["QueueUrl"], QUEUE_URL);
}

#[tokio::test]
async fn test_health() {
    let response = app(SqsLimits::Strict)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_queue_is_idempotent() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;
    create_zipkin(&app).await;

    let (_, body, _) = call(&app, "ListQueues", json!({})).await;
    assert_eq!(body["QueueUrls"], json!([QUEUE_URL]));

    let (_, body, _) = call(&app, "GetQueueUrl", json!({"QueueName": "zipkin"})).await;
    assert_eq!(body["QueueUrl"], QUEUE_URL);
}

#[tokio::test]
async fn test_send_receive_delete() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;

    let (status, sent, _) = call(
        &app,
        "SendMessage",
        json!({"QueueUrl": QUEUE_URL, "MessageBody": "[]"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // md5("[]")
    assert_eq!(sent["MD5OfMessageBody"], "d751713988987e9331980363e24189ce");

    let (_, received, _) = call(
        &app,
        "ReceiveMessage",
        json!({"QueueUrl": QUEUE_URL, "AttributeNames": ["All"]}),
    )
    .await;
    let messages = received["Messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["Body"], "[]");
    assert_eq!(messages[0]["MessageId"], sent["MessageId"]);
    assert_eq!(messages[0]["Attributes"]["ApproximateReceiveCount"], "1");
    let receipt_handle = messages[0]["ReceiptHandle"].as_str().unwrap().to_string();

    // in flight: nothing else to receive
    let (_, received, _) = call(&app, "ReceiveMessage", json!({"QueueUrl": QUEUE_URL})).await;
    assert!(received.get("Messages").is_none());

    let (_, attrs, _) = call(
        &app,
        "GetQueueAttributes",
        json!({"QueueUrl": QUEUE_URL, "AttributeNames": ["All"]}),
    )
    .await;
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessages"], "0");
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessagesNotVisible"], "1");

    let (status, _, _) = call(
        &app,
        "DeleteMessage",
        json!({"QueueUrl": QUEUE_URL, "ReceiptHandle": receipt_handle}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, attrs, _) = call(
        &app,
        "GetQueueAttributes",
        json!({"QueueUrl": QUEUE_URL, "AttributeNames": ["ApproximateNumberOfMessagesNotVisible"]}),
    )
    .await;
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessagesNotVisible"], "0");
}

#[tokio::test]
async fn test_change_visibility_makes_message_receivable() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;
    call(
        &app,
        "SendMessage",
        json!({"QueueUrl": QUEUE_URL, "MessageBody": "hello"}),
    )
    .await;

    let (_, received, _) = call(&app, "ReceiveMessage", json!({"QueueUrl": QUEUE_URL})).await;
    let receipt_handle = received["Messages"][0]["ReceiptHandle"].clone();

    let (status, _, _) = call(
        &app,
        "ChangeMessageVisibility",
        json!({"QueueUrl": QUEUE_URL, "ReceiptHandle": receipt_handle, "VisibilityTimeout": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, received, _) = call(&app, "ReceiveMessage", json!({"QueueUrl": QUEUE_URL})).await;
    assert_eq!(received["Messages"][0]["Body"], "hello");
}

#[tokio::test]
async fn test_purge_queue() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;
    for _ in 0..3 {
        call(
            &app,
            "SendMessage",
            json!({"QueueUrl": QUEUE_URL, "MessageBody": "[]"}),
        )
        .await;
    }

    let (status, _, _) = call(&app, "PurgeQueue", json!({"QueueUrl": QUEUE_URL})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, attrs, _) = call(
        &app,
        "GetQueueAttributes",
        json!({"QueueUrl": QUEUE_URL, "AttributeNames": ["ApproximateNumberOfMessages"]}),
    )
    .await;
    assert_eq!(attrs["Attributes"]["ApproximateNumberOfMessages"], "0");
}

#[tokio::test]
async fn test_long_poll_returns_when_wait_elapses() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;

    let started = std::time::Instant::now();
    let (status, received, _) = call(
        &app,
        "ReceiveMessage",
        json!({"QueueUrl": QUEUE_URL, "WaitTimeSeconds": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(received.get("Messages").is_none());
    assert!(started.elapsed() >= std::time::Duration::from_millis(900));
}

#[tokio::test]
async fn test_errors() {
    let app = app(SqsLimits::Strict);

    let (status, body, query_error) = call(
        &app,
        "SendMessage",
        json!({"QueueUrl": QUEUE_URL, "MessageBody": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["__type"], "com.amazonaws.sqs#QueueDoesNotExist");
    assert_eq!(
        query_error.as_deref(),
        Some("AWS.SimpleQueueService.NonExistentQueue;Sender")
    );

    create_zipkin(&app).await;

    let (status, body, _) = call(&app, "SendMessage", json!({"QueueUrl": QUEUE_URL})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["__type"], "com.amazonaws.sqs#MissingParameter");

    let (_, body, _) = call(
        &app,
        "ReceiveMessage",
        json!({"QueueUrl": QUEUE_URL, "MaxNumberOfMessages": 11}),
    )
    .await;
    assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidParameterValue");

    let (_, body, _) = call(
        &app,
        "DeleteMessage",
        json!({"QueueUrl": QUEUE_URL, "ReceiptHandle": "bogus"}),
    )
    .await;
    assert_eq!(body["__type"], "com.amazonaws.sqs#ReceiptHandleIsInvalid");

    let (_, body, _) = call(&app, "TagQueue", json!({})).await;
    assert_eq!(body["__type"], "com.amazonaws.sqs#UnknownOperationException");
}

#[tokio::test]
async fn test_relaxed_limits_clamp_receive_count() {
    let app = app(SqsLimits::Relaxed);
    create_zipkin(&app).await;
    for _ in 0..12 {
        call(
            &app,
            "SendMessage",
            json!({"QueueUrl": QUEUE_URL, "MessageBody": "[]"}),
        )
        .await;
    }

    let (status, received, _) = call(
        &app,
        "ReceiveMessage",
        json!({"QueueUrl": QUEUE_URL, "MaxNumberOfMessages": 50}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["Messages"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_relaxed_limits_accept_bodies_over_default_cap() {
    let app = app(SqsLimits::Relaxed);
    create_zipkin(&app).await;

    let body = "x".repeat(3 * 1024 * 1024);
    let (status, _, _) = call(
        &app,
        "SendMessage",
        json!({"QueueUrl": QUEUE_URL, "MessageBody": body}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, received, _) = call(&app, "ReceiveMessage", json!({"QueueUrl": QUEUE_URL})).await;
    assert_eq!(received["Messages"][0]["Body"].as_str().map(str::len), Some(body.len()));
}

#[tokio::test]
async fn test_strict_limits_reject_oversized_body_with_sqs_error() {
    let app = app(SqsLimits::Strict);
    create_zipkin(&app).await;

    let (status, body, _) = call(
        &app,
        "SendMessage",
        json!({"QueueUrl": QUEUE_URL, "MessageBody": "x".repeat(300 * 1024)}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["__type"], "com.amazonaws.sqs#InvalidParameterValue");
}
