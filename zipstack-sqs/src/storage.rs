//! SQS in-memory storage

use dashmap::{mapref::entry::Entry, DashMap};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info};
use zipstack_core::{AwsError, ErrorCode};

use crate::limits::{
    SqsLimits, DELAY_SECONDS_RANGE, MAXIMUM_MESSAGE_SIZE_RANGE, MAX_MESSAGE_SIZE,
    RETENTION_PERIOD_RANGE, VISIBILITY_TIMEOUT_RANGE, WAIT_TIME_RANGE,
};

pub const ACCOUNT_ID: &str = "000000000000";
pub const REGION: &str = "us-east-1";

/// Queue attributes reported for `All`, in response order
pub const QUEUE_ATTRIBUTE_NAMES: [&str; 11] = [
    "QueueArn",
    "ApproximateNumberOfMessages",
    "ApproximateNumberOfMessagesNotVisible",
    "ApproximateNumberOfMessagesDelayed",
    "CreatedTimestamp",
    "LastModifiedTimestamp",
    "VisibilityTimeout",
    "DelaySeconds",
    "ReceiveMessageWaitTimeSeconds",
    "MessageRetentionPeriod",
    "MaximumMessageSize",
];

/// Settable attributes that are accepted but have no effect here
const IGNORED_ATTRIBUTE_NAMES: [&str; 10] = [
    "Policy",
    "RedrivePolicy",
    "RedriveAllowPolicy",
    "KmsMasterKeyId",
    "KmsDataKeyReusePeriodSeconds",
    "SqsManagedSseEnabled",
    "FifoQueue",
    "ContentBasedDeduplication",
    "DeduplicationScope",
    "FifoThroughputLimit",
];

#[derive(Error, Debug)]
pub enum SqsError {
    #[error("Queue does not exist: {0}")]
    QueueNotFound(String),
    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unknown attribute: {0}")]
    InvalidAttributeName(String),
    #[error("Invalid message contents: {0}")]
    InvalidMessageContents(String),
    #[error("Receipt handle is invalid: {0}")]
    ReceiptHandleInvalid(String),
    #[error("Message is not in flight: {0}")]
    MessageNotInflight(String),
}

impl From<SqsError> for AwsError {
    fn from(e: SqsError) -> Self {
        match e {
            SqsError::QueueNotFound(_) => AwsError::queue_does_not_exist(),
            SqsError::QueueAlreadyExists(name) => AwsError::new(
                ErrorCode::QueueNameExists,
                format!("A queue already exists with the same name: {name}"),
            ),
            SqsError::InvalidParameter(message) => AwsError::invalid_parameter(message),
            SqsError::InvalidAttributeName(name) => AwsError::new(
                ErrorCode::InvalidAttributeName,
                format!("Unknown Attribute {name}."),
            ),
            SqsError::InvalidMessageContents(message) => {
                AwsError::new(ErrorCode::InvalidMessageContents, message)
            }
            SqsError::ReceiptHandleInvalid(handle) => AwsError::new(
                ErrorCode::ReceiptHandleIsInvalid,
                format!("The input receipt handle \"{handle}\" is not a valid receipt handle."),
            ),
            SqsError::MessageNotInflight(_) => AwsError::new(
                ErrorCode::MessageNotInflight,
                "The specified message isn't in flight.",
            ),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn seconds_to_millis(seconds: i32) -> i64 {
    i64::from(seconds) * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub url: String,
    pub arn: String,
    pub created_timestamp: i64,
    pub last_modified_timestamp: i64,
    pub visibility_timeout: i32,
    pub delay_seconds: i32,
    pub receive_message_wait_time_seconds: i32,
    pub message_retention_period: i32,
    pub maximum_message_size: i32,
}

impl Queue {
    pub fn new(name: String, base_url: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            url: format!("{base_url}/{ACCOUNT_ID}/{name}"),
            arn: format!("arn:aws:sqs:{REGION}:{ACCOUNT_ID}:{name}"),
            name,
            created_timestamp: now,
            last_modified_timestamp: now,
            visibility_timeout: 30,
            delay_seconds: 0,
            receive_message_wait_time_seconds: 0,
            message_retention_period: 345_600, // 4 days
            maximum_message_size: 262_144,     // 256KB
        }
    }

    /// Apply settable attributes, validating each against `limits`.
    pub fn apply_attributes(
        &mut self,
        attributes: &HashMap<String, String>,
        limits: SqsLimits,
    ) -> Result<(), SqsError> {
        for (name, value) in attributes {
            let parse = |range: &RangeInclusive<i32>| -> Result<i32, SqsError> {
                let parsed = value.trim().parse::<i32>().map_err(|_| {
                    SqsError::InvalidParameter(format!(
                        "Invalid value for the parameter {name}: {value}"
                    ))
                })?;
                limits.check_range(name, parsed, range)
            };

            match name.as_str() {
                "VisibilityTimeout" => self.visibility_timeout = parse(&VISIBILITY_TIMEOUT_RANGE)?,
                "DelaySeconds" => self.delay_seconds = parse(&DELAY_SECONDS_RANGE)?,
                "ReceiveMessageWaitTimeSeconds" => {
                    self.receive_message_wait_time_seconds = parse(&WAIT_TIME_RANGE)?;
                }
                "MessageRetentionPeriod" => {
                    self.message_retention_period = parse(&RETENTION_PERIOD_RANGE)?;
                }
                "MaximumMessageSize" => {
                    self.maximum_message_size = parse(&MAXIMUM_MESSAGE_SIZE_RANGE)?;
                }
                other if IGNORED_ATTRIBUTE_NAMES.contains(&other) => {
                    debug!(queue = %self.name, attribute = %other, "Ignoring queue attribute");
                }
                other if limits.is_strict() => {
                    return Err(SqsError::InvalidAttributeName(other.to_string()));
                }
                _ => {}
            }
        }
        self.last_modified_timestamp = chrono::Utc::now().timestamp();
        Ok(())
    }

    fn maximum_body_size(&self) -> usize {
        usize::try_from(self.maximum_message_size).unwrap_or(MAX_MESSAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    /// Handle issued by the latest receive; `None` until first received
    pub receipt_handle: Option<String>,
    pub body: String,
    pub md5_of_body: String,
    pub sent_timestamp: i64,
    /// Epoch millis from which the message may be received
    pub visible_from: i64,
    pub approximate_receive_count: i32,
    pub approximate_first_receive_timestamp: Option<i64>,
}

impl Message {
    pub fn new(body: String, delay_seconds: i32) -> Self {
        use uuid::Uuid;

        let sent_timestamp = now_millis();
        Self {
            message_id: Uuid::new_v4().to_string(),
            receipt_handle: None,
            md5_of_body: md5_hex(&body),
            body,
            sent_timestamp,
            visible_from: sent_timestamp + seconds_to_millis(delay_seconds),
            approximate_receive_count: 0,
            approximate_first_receive_timestamp: None,
        }
    }

    pub fn is_visible(&self, now: i64) -> bool {
        self.visible_from <= now
    }

    /// Received and still hidden by its visibility timeout
    pub fn is_in_flight(&self, now: i64) -> bool {
        self.approximate_receive_count > 0 && !self.is_visible(now)
    }

    /// Never received and still inside its delivery delay
    pub fn is_delayed(&self, now: i64) -> bool {
        self.approximate_receive_count == 0 && !self.is_visible(now)
    }

    /// System attributes, as returned by ReceiveMessage
    pub fn system_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        attributes.insert("SenderId".to_string(), ACCOUNT_ID.to_string());
        attributes.insert("SentTimestamp".to_string(), self.sent_timestamp.to_string());
        attributes.insert(
            "ApproximateReceiveCount".to_string(),
            self.approximate_receive_count.to_string(),
        );
        if let Some(first) = self.approximate_first_receive_timestamp {
            attributes.insert(
                "ApproximateFirstReceiveTimestamp".to_string(),
                first.to_string(),
            );
        }
        attributes
    }
}

pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Approximate message counts of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    pub visible: usize,
    pub not_visible: usize,
    pub delayed: usize,
}

#[derive(Debug)]
pub struct SqsStorage {
    base_url: String,
    limits: SqsLimits,
    queues: DashMap<String, Queue>,
    messages: DashMap<String, VecDeque<Message>>,
}

impl SqsStorage {
    pub fn new(base_url: impl Into<String>, limits: SqsLimits) -> Self {
        Self {
            base_url: base_url.into(),
            limits,
            queues: DashMap::new(),
            messages: DashMap::new(),
        }
    }

    pub fn limits(&self) -> SqsLimits {
        self.limits
    }

    pub fn create_queue(
        &self,
        name: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<Queue, SqsError> {
        self.limits.validate_queue_name(name)?;

        // The entry stays locked until both maps are populated
        let Entry::Vacant(entry) = self.queues.entry(name.to_string()) else {
            return Err(SqsError::QueueAlreadyExists(name.to_string()));
        };

        let mut queue = Queue::new(name.to_string(), &self.base_url);
        queue.apply_attributes(attributes, self.limits)?;

        info!(name = %name, url = %queue.url, "Creating queue");
        self.messages.insert(name.to_string(), VecDeque::new());
        entry.insert(queue.clone());
        Ok(queue)
    }

    pub fn delete_queue(&self, name: &str) -> Result<(), SqsError> {
        if !self.queues.contains_key(name) {
            return Err(SqsError::QueueNotFound(name.to_string()));
        }

        info!(name = %name, "Deleting queue");
        self.queues.remove(name);
        self.messages.remove(name);
        Ok(())
    }

    pub fn get_queue(&self, name: &str) -> Result<Queue, SqsError> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .ok_or_else(|| SqsError::QueueNotFound(name.to_string()))
    }

    pub fn list_queues(&self, prefix: Option<&str>) -> Vec<String> {
        let mut urls: Vec<String> = self
            .queues
            .iter()
            .filter(|q| prefix.map_or(true, |p| q.key().starts_with(p)))
            .map(|q| q.value().url.clone())
            .collect();
        urls.sort();
        urls
    }

    pub fn set_queue_attributes(
        &self,
        name: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), SqsError> {
        let mut queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| SqsError::QueueNotFound(name.to_string()))?;
        queue.apply_attributes(attributes, self.limits)?;
        info!(name = %name, count = attributes.len(), "Updated queue attributes");
        Ok(())
    }

    pub fn message_counts(&self, name: &str) -> Result<MessageCounts, SqsError> {
        let messages = self
            .messages
            .get(name)
            .ok_or_else(|| SqsError::QueueNotFound(name.to_string()))?;

        let now = now_millis();
        Ok(messages.iter().fold(MessageCounts::default(), |mut counts, m| {
            if m.is_visible(now) {
                counts.visible += 1;
            } else if m.is_in_flight(now) {
                counts.not_visible += 1;
            } else {
                counts.delayed += 1;
            }
            counts
        }))
    }

    /// Resolve requested attribute names (`All` expands to every attribute).
    pub fn get_queue_attributes(
        &self,
        name: &str,
        requested: &[String],
    ) -> Result<BTreeMap<String, String>, SqsError> {
        let queue = self.get_queue(name)?;
        let counts = self.message_counts(name)?;

        let names: Vec<&str> = if requested.iter().any(|n| n == "All") {
            QUEUE_ATTRIBUTE_NAMES.to_vec()
        } else {
            requested.iter().map(String::as_str).collect()
        };

        let mut attributes = BTreeMap::new();
        for attribute in names {
            let value = match attribute {
                "QueueArn" => queue.arn.clone(),
                "ApproximateNumberOfMessages" => counts.visible.to_string(),
                "ApproximateNumberOfMessagesNotVisible" => counts.not_visible.to_string(),
                "ApproximateNumberOfMessagesDelayed" => counts.delayed.to_string(),
                "CreatedTimestamp" => queue.created_timestamp.to_string(),
                "LastModifiedTimestamp" => queue.last_modified_timestamp.to_string(),
                "VisibilityTimeout" => queue.visibility_timeout.to_string(),
                "DelaySeconds" => queue.delay_seconds.to_string(),
                "ReceiveMessageWaitTimeSeconds" => {
                    queue.receive_message_wait_time_seconds.to_string()
                }
                "MessageRetentionPeriod" => queue.message_retention_period.to_string(),
                "MaximumMessageSize" => queue.maximum_message_size.to_string(),
                other if self.limits.is_strict() => {
                    return Err(SqsError::InvalidAttributeName(other.to_string()));
                }
                _ => continue,
            };
            attributes.insert(attribute.to_string(), value);
        }
        Ok(attributes)
    }

    pub fn send_message(
        &self,
        queue_name: &str,
        body: String,
        delay_seconds: Option<i32>,
    ) -> Result<Message, SqsError> {
        let queue = self.get_queue(queue_name)?;
        self.limits.validate_body(&body, queue.maximum_body_size())?;
        let delay = match delay_seconds {
            Some(d) => self.limits.check_range("DelaySeconds", d, &DELAY_SECONDS_RANGE)?,
            None => queue.delay_seconds,
        };

        let message = Message::new(body, delay);

        if let Some(mut msgs) = self.messages.get_mut(queue_name) {
            msgs.push_back(message.clone());
        }

        info!(queue = %queue_name, message_id = %message.message_id, "Sent message");
        Ok(message)
    }

    /// Receive up to `max_messages` visible messages, hiding each for the
    /// given visibility timeout (or the queue's default).
    pub fn receive_message(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Option<i32>,
    ) -> Result<Vec<Message>, SqsError> {
        let queue = self.get_queue(queue_name)?;
        let timeout = match visibility_timeout {
            Some(t) => {
                self.limits
                    .check_range("VisibilityTimeout", t, &VISIBILITY_TIMEOUT_RANGE)?
            }
            None => queue.visibility_timeout,
        };

        let now = now_millis();
        let mut result = Vec::new();

        if let Some(mut messages) = self.messages.get_mut(queue_name) {
            let retention = seconds_to_millis(queue.message_retention_period);
            messages.retain(|m| m.sent_timestamp + retention > now);

            for msg in messages
                .iter_mut()
                .filter(|m| m.is_visible(now))
                .take(max_messages)
            {
                msg.approximate_receive_count += 1;
                if msg.approximate_first_receive_timestamp.is_none() {
                    msg.approximate_first_receive_timestamp = Some(now);
                }
                msg.visible_from = now + seconds_to_millis(timeout);
                // Each receive invalidates the previous handle
                msg.receipt_handle = Some(uuid::Uuid::new_v4().to_string());
                result.push(msg.clone());
            }
        }

        debug!(queue = %queue_name, count = result.len(), "Received messages");
        Ok(result)
    }

    pub fn delete_message(&self, queue_name: &str, receipt_handle: &str) -> Result<(), SqsError> {
        let mut messages = self
            .messages
            .get_mut(queue_name)
            .ok_or_else(|| SqsError::QueueNotFound(queue_name.to_string()))?;

        let original_len = messages.len();
        messages.retain(|m| m.receipt_handle.as_deref() != Some(receipt_handle));

        if messages.len() == original_len {
            return Err(SqsError::ReceiptHandleInvalid(receipt_handle.to_string()));
        }

        info!(queue = %queue_name, receipt = %receipt_handle, "Deleted message");
        Ok(())
    }

    pub fn change_message_visibility(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), SqsError> {
        let timeout =
            self.limits
                .check_range("VisibilityTimeout", visibility_timeout, &VISIBILITY_TIMEOUT_RANGE)?;

        let mut messages = self
            .messages
            .get_mut(queue_name)
            .ok_or_else(|| SqsError::QueueNotFound(queue_name.to_string()))?;

        let now = now_millis();
        let message = messages
            .iter_mut()
            .find(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| SqsError::ReceiptHandleInvalid(receipt_handle.to_string()))?;

        if !message.is_in_flight(now) {
            return Err(SqsError::MessageNotInflight(receipt_handle.to_string()));
        }

        message.visible_from = now + seconds_to_millis(timeout);
        debug!(queue = %queue_name, timeout, "Changed message visibility");
        Ok(())
    }

    pub fn purge_queue(&self, queue_name: &str) -> Result<usize, SqsError> {
        let mut messages = self
            .messages
            .get_mut(queue_name)
            .ok_or_else(|| SqsError::QueueNotFound(queue_name.to_string()))?;

        let purged = messages.len();
        messages.clear();

        info!(queue = %queue_name, purged, "Purged queue");
        Ok(purged)
    }
}

/// State for SQS handlers
#[derive(Debug)]
pub struct SqsState {
    pub storage: SqsStorage,
}

impl SqsState {
    pub fn new(base_url: impl Into<String>, limits: SqsLimits) -> Self {
        Self {
            storage: SqsStorage::new(base_url, limits),
        }
    }
}
