//! Fixture errors

use thiserror::Error;
use zipstack_span::CodecError;
use zipstack_sqs::ServerError;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Fixture has not been started")]
    NotStarted,

    #[error("Fixture has already been stopped")]
    Stopped,

    #[error("No available port found")]
    NoPortAvailable,

    #[error("Queue server error: {0}")]
    Server(#[from] ServerError),

    #[error("SQS request failed: {0}")]
    Sqs(#[source] Box<aws_sdk_sqs::Error>),

    #[error("Failed to decode spans: {0}")]
    Codec(#[from] CodecError),

    #[error("CreateQueue returned no queue URL")]
    MissingQueueUrl,

    #[error("Queue attribute {0} missing from response")]
    MissingAttribute(&'static str),

    #[error("Queue attribute {name} has invalid value {value:?}")]
    InvalidAttribute { name: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<aws_sdk_sqs::Error> for FixtureError {
    fn from(e: aws_sdk_sqs::Error) -> Self {
        Self::Sqs(Box::new(e))
    }
}
