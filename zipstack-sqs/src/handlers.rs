//! HTTP handlers for SQS (AWS JSON 1.0 protocol)

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zipstack_core::{AwsError, ErrorCode, RequestId};

use crate::limits::WAIT_TIME_RANGE;
use crate::storage::{SqsError, SqsState};

const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "AmazonSQS.";
const LONG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle SQS requests based on X-Amz-Target header
pub async fn handle_request(
    State(state): State<Arc<SqsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = headers
        .get("x-amz-target")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let operation = target.strip_prefix(TARGET_PREFIX).unwrap_or(target);

    info!(operation = %operation, "SQS request");

    let result = match operation {
        "CreateQueue" => handle_create_queue(&state, &body),
        "DeleteQueue" => handle_delete_queue(&state, &body),
        "ListQueues" => handle_list_queues(&state, &body),
        "GetQueueUrl" => handle_get_queue_url(&state, &body),
        "PurgeQueue" => handle_purge_queue(&state, &body),
        "SendMessage" => handle_send_message(&state, &body),
        "ReceiveMessage" => handle_receive_message(&state, &body).await,
        "DeleteMessage" => handle_delete_message(&state, &body),
        "ChangeMessageVisibility" => handle_change_message_visibility(&state, &body),
        "GetQueueAttributes" => handle_get_queue_attributes(&state, &body),
        "SetQueueAttributes" => handle_set_queue_attributes(&state, &body),
        _ => {
            warn!(target = %target, "Unknown SQS operation");
            Err(AwsError::new(
                ErrorCode::UnknownOperation,
                format!("Unknown operation: {target}"),
            ))
        }
    };

    let mut response = result.unwrap_or_else(|e| error_response(&e));
    if let Ok(request_id) = HeaderValue::from_str(RequestId::new().as_str()) {
        response.headers_mut().insert("x-amzn-requestid", request_id);
    }
    response
}

/// Liveness probe for readiness polling
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, r#"{"status": "running", "services": ["sqs"]}"#)
}

// === Request/Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateQueueRequest {
    queue_name: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlRequest {
    queue_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListQueuesRequest {
    queue_name_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueUrlRequest {
    queue_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueueUrlResponse {
    queue_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListQueuesResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    queue_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest {
    queue_url: Option<String>,
    message_body: Option<String>,
    delay_seconds: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageResponse {
    #[serde(rename = "MD5OfMessageBody")]
    md5_of_message_body: String,
    message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageRequest {
    queue_url: Option<String>,
    max_number_of_messages: Option<i32>,
    visibility_timeout: Option<i32>,
    wait_time_seconds: Option<i32>,
    #[serde(default)]
    attribute_names: Vec<String>,
    #[serde(default)]
    message_system_attribute_names: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<MessageOutput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageOutput {
    message_id: String,
    receipt_handle: String,
    #[serde(rename = "MD5OfBody")]
    md5_of_body: String,
    body: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiptHandleRequest {
    queue_url: Option<String>,
    receipt_handle: Option<String>,
    visibility_timeout: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesRequest {
    queue_url: Option<String>,
    #[serde(default)]
    attribute_names: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetQueueAttributesRequest {
    queue_url: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct EmptyResponse {}

// === Request helpers ===

fn parse_request<T: DeserializeOwned>(body: &Bytes) -> Result<T, AwsError> {
    let body: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(body).map_err(|e| {
        AwsError::new(
            ErrorCode::SerializationException,
            format!("Malformed request body: {e}"),
        )
    })
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, AwsError> {
    value.ok_or_else(|| AwsError::missing_parameter(name))
}

/// Queue name from a queue URL; a bare name is accepted as-is
fn queue_name_from_url(queue_url: &str) -> &str {
    queue_url
        .trim_end_matches('/')
        .split('/')
        .next_back()
        .unwrap_or(queue_url)
}

fn wants_attribute(requested: &[String], name: &str) -> bool {
    requested.iter().any(|n| n == "All" || n == name)
}

// === Handlers ===

fn handle_create_queue(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: CreateQueueRequest = parse_request(body)?;
    let queue_name = required(req.queue_name, "QueueName")?;

    let queue = match state.storage.create_queue(&queue_name, &req.attributes) {
        Ok(queue) => queue,
        Err(SqsError::QueueAlreadyExists(name)) => state.storage.get_queue(&name)?,
        Err(e) => return Err(e.into()),
    };

    json_response(&QueueUrlResponse {
        queue_url: queue.url,
    })
}

fn handle_delete_queue(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: QueueUrlRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;

    state.storage.delete_queue(queue_name_from_url(&queue_url))?;
    json_response(&EmptyResponse {})
}

fn handle_list_queues(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: ListQueuesRequest = parse_request(body)?;

    json_response(&ListQueuesResponse {
        queue_urls: state.storage.list_queues(req.queue_name_prefix.as_deref()),
    })
}

fn handle_get_queue_url(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: GetQueueUrlRequest = parse_request(body)?;
    let queue_name = required(req.queue_name, "QueueName")?;

    let queue = state.storage.get_queue(&queue_name)?;
    json_response(&QueueUrlResponse {
        queue_url: queue.url,
    })
}

fn handle_purge_queue(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: QueueUrlRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;

    state.storage.purge_queue(queue_name_from_url(&queue_url))?;
    json_response(&EmptyResponse {})
}

fn handle_send_message(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: SendMessageRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;
    let message_body = required(req.message_body, "MessageBody")?;

    let msg = state.storage.send_message(
        queue_name_from_url(&queue_url),
        message_body,
        req.delay_seconds,
    )?;

    json_response(&SendMessageResponse {
        md5_of_message_body: msg.md5_of_body,
        message_id: msg.message_id,
    })
}

async fn handle_receive_message(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: ReceiveMessageRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;
    let queue_name = queue_name_from_url(&queue_url);

    let limits = state.storage.limits();
    let max_messages = limits.receive_count(req.max_number_of_messages)?;
    let wait_seconds = match req.wait_time_seconds {
        Some(w) => limits.check_range("WaitTimeSeconds", w, &WAIT_TIME_RANGE)?,
        None => {
            state
                .storage
                .get_queue(queue_name)?
                .receive_message_wait_time_seconds
        }
    };

    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(u64::try_from(wait_seconds).unwrap_or(0));
    let messages = loop {
        let messages =
            state
                .storage
                .receive_message(queue_name, max_messages, req.visibility_timeout)?;
        if !messages.is_empty() || tokio::time::Instant::now() >= deadline {
            break messages;
        }
        tokio::time::sleep(LONG_POLL_INTERVAL).await;
    };

    let requested: Vec<String> = req
        .attribute_names
        .into_iter()
        .chain(req.message_system_attribute_names)
        .collect();

    let messages = messages
        .into_iter()
        .map(|msg| {
            let attributes = msg
                .system_attributes()
                .into_iter()
                .filter(|(name, _)| wants_attribute(&requested, name))
                .collect();
            MessageOutput {
                message_id: msg.message_id,
                receipt_handle: msg.receipt_handle.unwrap_or_default(),
                md5_of_body: msg.md5_of_body,
                body: msg.body,
                attributes,
            }
        })
        .collect();

    json_response(&ReceiveMessageResponse { messages })
}

fn handle_delete_message(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: ReceiptHandleRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;
    let receipt_handle = required(req.receipt_handle, "ReceiptHandle")?;

    state
        .storage
        .delete_message(queue_name_from_url(&queue_url), &receipt_handle)?;
    json_response(&EmptyResponse {})
}

fn handle_change_message_visibility(
    state: &SqsState,
    body: &Bytes,
) -> Result<Response, AwsError> {
    let req: ReceiptHandleRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;
    let receipt_handle = required(req.receipt_handle, "ReceiptHandle")?;
    let visibility_timeout = required(req.visibility_timeout, "VisibilityTimeout")?;

    state.storage.change_message_visibility(
        queue_name_from_url(&queue_url),
        &receipt_handle,
        visibility_timeout,
    )?;
    json_response(&EmptyResponse {})
}

fn handle_get_queue_attributes(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: GetQueueAttributesRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;

    let attributes = state
        .storage
        .get_queue_attributes(queue_name_from_url(&queue_url), &req.attribute_names)?;
    json_response(&GetQueueAttributesResponse { attributes })
}

fn handle_set_queue_attributes(state: &SqsState, body: &Bytes) -> Result<Response, AwsError> {
    let req: SetQueueAttributesRequest = parse_request(body)?;
    let queue_url = required(req.queue_url, "QueueUrl")?;

    state
        .storage
        .set_queue_attributes(queue_name_from_url(&queue_url), &req.attributes)?;
    json_response(&EmptyResponse {})
}

// === Response helpers ===

fn json_response<T: Serialize>(body: &T) -> Result<Response, AwsError> {
    let json = serde_json::to_vec(body)
        .map_err(|e| AwsError::new(ErrorCode::InternalError, e.to_string()))?;

    let mut response = Response::new(Body::from(json));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_JSON),
    );
    Ok(response)
}

fn error_response(error: &AwsError) -> Response {
    let mut response = Response::new(Body::from(error.to_json()));
    *response.status_mut() =
        StatusCode::from_u16(error.code.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_JSON),
    );
    if let Ok(query_error) = HeaderValue::from_str(&error.query_error()) {
        response
            .headers_mut()
            .insert("x-amzn-query-error", query_error);
    }
    response
}
