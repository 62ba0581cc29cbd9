//! AWS error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Namespace prefix of SQS error shapes in the JSON protocol
const SQS_SHAPE_PREFIX: &str = "com.amazonaws.sqs#";

/// SQS error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    QueueDoesNotExist,
    QueueNameExists,
    ReceiptHandleIsInvalid,
    MessageNotInflight,
    InvalidParameterValue,
    InvalidAttributeName,
    InvalidMessageContents,
    MissingParameter,
    UnsupportedOperation,
    SerializationException,
    UnknownOperation,
    InternalError,
}

impl ErrorCode {
    /// Shape name, as carried in the `__type` field of a JSON error
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueDoesNotExist => "QueueDoesNotExist",
            Self::QueueNameExists => "QueueNameExists",
            Self::ReceiptHandleIsInvalid => "ReceiptHandleIsInvalid",
            Self::MessageNotInflight => "MessageNotInflight",
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::InvalidAttributeName => "InvalidAttributeName",
            Self::InvalidMessageContents => "InvalidMessageContents",
            Self::MissingParameter => "MissingParameter",
            Self::UnsupportedOperation => "UnsupportedOperation",
            Self::SerializationException => "SerializationException",
            Self::UnknownOperation => "UnknownOperationException",
            Self::InternalError => "InternalError",
        }
    }

    /// Legacy query-protocol code, sent in the `x-amzn-query-error` header
    pub fn query_code(&self) -> &'static str {
        match self {
            Self::QueueDoesNotExist => "AWS.SimpleQueueService.NonExistentQueue",
            Self::QueueNameExists => "QueueAlreadyExists",
            Self::MessageNotInflight => "AWS.SimpleQueueService.MessageNotInflight",
            Self::UnsupportedOperation => "AWS.SimpleQueueService.UnsupportedOperation",
            other => other.as_str(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InternalError => 500,
            _ => 400,
        }
    }

    /// Which side of the call caused the error
    pub fn fault(&self) -> &'static str {
        if self.http_status() >= 500 {
            "Receiver"
        } else {
            "Sender"
        }
    }
}

/// AWS-style error
#[derive(Debug, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct AwsError {
    pub code: ErrorCode,
    pub message: String,
}

impl AwsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn queue_does_not_exist() -> Self {
        Self::new(
            ErrorCode::QueueDoesNotExist,
            "The specified queue does not exist.",
        )
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameterValue, message)
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(
            ErrorCode::MissingParameter,
            format!("The request must contain the parameter {name}."),
        )
    }

    /// Value of the `x-amzn-query-error` header
    pub fn query_error(&self) -> String {
        format!("{};{}", self.code.query_code(), self.code.fault())
    }

    /// Format as an AWS JSON 1.0 error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            #[serde(rename = "__type")]
            error_type: String,
            message: &'a str,
        }

        let error = JsonError {
            error_type: format!("{SQS_SHAPE_PREFIX}{}", self.code.as_str()),
            message: &self.message,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"__type":"{SQS_SHAPE_PREFIX}{}","message":"{}"}}"#,
                self.code.as_str(),
                self.message
            )
        })
    }
}
