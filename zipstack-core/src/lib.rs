//! Core types for zipstack
//!
//! This crate provides the AWS wire error model and request ids used by the
//! embedded SQS server.

pub mod error;
pub mod request_id;

pub use error::{AwsError, ErrorCode};
pub use request_id::RequestId;
