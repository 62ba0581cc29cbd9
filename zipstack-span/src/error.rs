//! Codec errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message body is empty")]
    EmptyBody,
    #[error("Invalid base64 message body: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Malformed JSON span list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed proto3 span list: {0}")]
    Proto(#[from] prost::DecodeError),
    #[error("Expected a proto3 ListOfSpans, found leading byte 0x{0:02x}")]
    NotAListOfSpans(u8),
    #[error("Invalid {field}: {value}")]
    InvalidId { field: &'static str, value: String },
    #[error("Invalid endpoint address of {0} bytes")]
    InvalidAddress(usize),
}
