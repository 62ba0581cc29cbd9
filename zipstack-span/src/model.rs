//! Span model (v2)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;

/// Role of a span in an RPC or messaging interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Client,
    Server,
    Producer,
    Consumer,
}

/// Network location of a traced service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Timestamped event within a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Epoch microseconds
    pub timestamp: u64,
    pub value: String,
}

/// A single operation in a trace
///
/// Identifiers are lower-hex: `trace_id` is 16 or 32 characters, `id` and
/// `parent_id` are 16.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Epoch microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Microseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
}

impl Span {
    pub fn new(trace_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Validate identifiers and bring them to canonical width.
    ///
    /// Ids must be non-zero lower-hex. Short ids are left-padded with zeros
    /// to 16 or 32 characters, and a 128-bit trace id whose high half is
    /// zero is shortened to its low 64 bits. An all-zero parent id means
    /// no parent.
    pub(crate) fn normalize(mut self) -> Result<Self, CodecError> {
        self.trace_id = normalize_id("traceId", &self.trace_id, 32)?;
        self.id = normalize_id("id", &self.id, 16)?;
        self.parent_id = self
            .parent_id
            .filter(|p| p.is_empty() || !is_all_zeros(p))
            .map(|p| normalize_id("parentId", &p, 16))
            .transpose()?;
        Ok(self)
    }
}

fn is_all_zeros(value: &str) -> bool {
    value.bytes().all(|b| b == b'0')
}

fn normalize_id(field: &'static str, value: &str, max_len: usize) -> Result<String, CodecError> {
    let is_lower_hex = value
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));

    if value.is_empty() || value.len() > max_len || !is_lower_hex || is_all_zeros(value) {
        return Err(CodecError::InvalidId {
            field,
            value: value.to_string(),
        });
    }

    let width = if value.len() <= 16 { 16 } else { 32 };
    let padded = format!("{value:0>width$}");
    match padded.split_at(16) {
        (high, low) if width == 32 && is_all_zeros(high) => Ok(low.to_string()),
        _ => Ok(padded),
    }
}
