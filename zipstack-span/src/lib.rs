//! Span records and the codecs used for queue message bodies
//!
//! Provides:
//! - The v2 span model, serialized as JSON
//! - The proto3 `ListOfSpans` wire format
//! - Leading-byte sniffing between the two, and message-body decoding
//!   (raw JSON text or base64 of either encoding)

mod codec;
mod error;
mod model;
pub mod proto;

pub use codec::{
    classify, decode_list, decode_message_body, encode_list, encode_message_body, SpanEncoding,
};
pub use error::CodecError;
pub use model::{Annotation, Endpoint, Kind, Span};
