//! Span-list codecs and message-body sniffing

use base64::{engine::general_purpose::STANDARD, Engine as _};
use prost::Message;

use crate::error::CodecError;
use crate::model::Span;
use crate::proto::{ListOfSpans, ProtoSpan, LIST_OF_SPANS_KEY};

/// Wire encoding of a span list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEncoding {
    /// JSON array of v2 spans
    Json,
    /// proto3 `ListOfSpans`
    Proto3,
}

/// Pick the codec for an encoded span list by its leading byte.
///
/// `[` selects JSON; anything else, including empty input, selects proto3.
pub fn classify(bytes: &[u8]) -> SpanEncoding {
    match bytes.first() {
        Some(b'[') => SpanEncoding::Json,
        _ => SpanEncoding::Proto3,
    }
}

pub fn decode_list(encoding: SpanEncoding, bytes: &[u8]) -> Result<Vec<Span>, CodecError> {
    match encoding {
        SpanEncoding::Json => serde_json::from_slice::<Vec<Span>>(bytes)?
            .into_iter()
            .map(Span::normalize)
            .collect(),
        SpanEncoding::Proto3 => {
            if let Some(&first) = bytes.first() {
                if first != LIST_OF_SPANS_KEY {
                    return Err(CodecError::NotAListOfSpans(first));
                }
            }
            ListOfSpans::decode(bytes)?
                .spans
                .into_iter()
                .map(|span| Span::try_from(span).and_then(Span::normalize))
                .collect()
        }
    }
}

/// Encode spans, normalizing their ids first so both encodings accept the
/// same input.
pub fn encode_list(encoding: SpanEncoding, spans: &[Span]) -> Result<Vec<u8>, CodecError> {
    let spans = spans
        .iter()
        .cloned()
        .map(Span::normalize)
        .collect::<Result<Vec<_>, _>>()?;

    match encoding {
        SpanEncoding::Json => Ok(serde_json::to_vec(&spans)?),
        SpanEncoding::Proto3 => {
            let list = ListOfSpans {
                spans: spans
                    .iter()
                    .map(ProtoSpan::try_from)
                    .collect::<Result<_, _>>()?,
            };
            Ok(list.encode_to_vec())
        }
    }
}

/// Decode the body of a queue message into spans.
///
/// A body starting with `[` is taken as UTF-8 JSON text; any other body is
/// base64 and its decoded bytes are classified again.
pub fn decode_message_body(body: &str) -> Result<Vec<Span>, CodecError> {
    let bytes = match body.as_bytes().first() {
        None => return Err(CodecError::EmptyBody),
        Some(b'[') => body.as_bytes().to_vec(),
        Some(_) => STANDARD.decode(body)?,
    };

    if bytes.is_empty() {
        return Err(CodecError::EmptyBody);
    }

    decode_list(classify(&bytes), &bytes)
}

/// Encode spans as a queue message body: JSON as raw text, proto3 as base64.
pub fn encode_message_body(encoding: SpanEncoding, spans: &[Span]) -> Result<String, CodecError> {
    let bytes = encode_list(encoding, spans)?;
    match encoding {
        SpanEncoding::Json => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        SpanEncoding::Proto3 => Ok(STANDARD.encode(bytes)),
    }
}
