//! proto3 wire messages (`zipkin.proto3`)
//!
//! Zero values stand for absent fields: an empty `parent_id`, a zero
//! `timestamp`, an unspecified `kind` and so on.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;
use crate::model::{Annotation, Endpoint, Kind, Span};

/// Wire key of field 1 with length-delimited type: the first byte of any
/// non-empty `ListOfSpans`.
pub const LIST_OF_SPANS_KEY: u8 = 0x0a;

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListOfSpans {
    #[prost(message, repeated, tag = "1")]
    pub spans: Vec<ProtoSpan>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoSpan {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub parent_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub id: Vec<u8>,
    #[prost(enumeration = "ProtoKind", tag = "4")]
    pub kind: i32,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(fixed64, tag = "6")]
    pub timestamp: u64,
    #[prost(uint64, tag = "7")]
    pub duration: u64,
    #[prost(message, optional, tag = "8")]
    pub local_endpoint: Option<ProtoEndpoint>,
    #[prost(message, optional, tag = "9")]
    pub remote_endpoint: Option<ProtoEndpoint>,
    #[prost(message, repeated, tag = "10")]
    pub annotations: Vec<ProtoAnnotation>,
    #[prost(map = "string, string", tag = "11")]
    pub tags: HashMap<String, String>,
    #[prost(bool, tag = "12")]
    pub debug: bool,
    #[prost(bool, tag = "13")]
    pub shared: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoEndpoint {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub ipv4: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ipv6: Vec<u8>,
    #[prost(int32, tag = "4")]
    pub port: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoAnnotation {
    #[prost(fixed64, tag = "1")]
    pub timestamp: u64,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoKind {
    SpanKindUnspecified = 0,
    Client = 1,
    Server = 2,
    Producer = 3,
    Consumer = 4,
}

impl From<Kind> for ProtoKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Client => Self::Client,
            Kind::Server => Self::Server,
            Kind::Producer => Self::Producer,
            Kind::Consumer => Self::Consumer,
        }
    }
}

fn kind_from_wire(value: i32) -> Option<Kind> {
    match ProtoKind::try_from(value).ok()? {
        ProtoKind::SpanKindUnspecified => None,
        ProtoKind::Client => Some(Kind::Client),
        ProtoKind::Server => Some(Kind::Server),
        ProtoKind::Producer => Some(Kind::Producer),
        ProtoKind::Consumer => Some(Kind::Consumer),
    }
}

fn id_to_hex(field: &'static str, bytes: &[u8], allowed: &[usize]) -> Result<String, CodecError> {
    if allowed.contains(&bytes.len()) {
        Ok(hex::encode(bytes))
    } else {
        Err(CodecError::InvalidId {
            field,
            value: hex::encode(bytes),
        })
    }
}

fn id_from_hex(field: &'static str, id: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(id).map_err(|_| CodecError::InvalidId {
        field,
        value: id.to_string(),
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl TryFrom<ProtoEndpoint> for Endpoint {
    type Error = CodecError;

    fn try_from(endpoint: ProtoEndpoint) -> Result<Self, Self::Error> {
        let ipv4 = match endpoint.ipv4.len() {
            0 => None,
            4 => Some(Ipv4Addr::new(
                endpoint.ipv4[0],
                endpoint.ipv4[1],
                endpoint.ipv4[2],
                endpoint.ipv4[3],
            )),
            n => return Err(CodecError::InvalidAddress(n)),
        };
        let ipv6 = match endpoint.ipv6.len() {
            0 => None,
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&endpoint.ipv6);
                Some(Ipv6Addr::from(octets))
            }
            n => return Err(CodecError::InvalidAddress(n)),
        };

        Ok(Self {
            service_name: non_empty(endpoint.service_name),
            ipv4,
            ipv6,
            port: u16::try_from(endpoint.port).ok().filter(|p| *p != 0),
        })
    }
}

impl From<&Endpoint> for ProtoEndpoint {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            service_name: endpoint.service_name.clone().unwrap_or_default(),
            ipv4: endpoint.ipv4.map(|ip| ip.octets().to_vec()).unwrap_or_default(),
            ipv6: endpoint.ipv6.map(|ip| ip.octets().to_vec()).unwrap_or_default(),
            port: endpoint.port.map(i32::from).unwrap_or_default(),
        }
    }
}

impl TryFrom<ProtoSpan> for Span {
    type Error = CodecError;

    fn try_from(span: ProtoSpan) -> Result<Self, Self::Error> {
        let parent_id = if span.parent_id.is_empty() {
            None
        } else {
            Some(id_to_hex("parentId", &span.parent_id, &[8])?)
        };

        Ok(Self {
            trace_id: id_to_hex("traceId", &span.trace_id, &[8, 16])?,
            parent_id,
            id: id_to_hex("id", &span.id, &[8])?,
            kind: kind_from_wire(span.kind),
            name: non_empty(span.name),
            timestamp: Some(span.timestamp).filter(|t| *t != 0),
            duration: Some(span.duration).filter(|d| *d != 0),
            local_endpoint: span.local_endpoint.map(Endpoint::try_from).transpose()?,
            remote_endpoint: span.remote_endpoint.map(Endpoint::try_from).transpose()?,
            annotations: span
                .annotations
                .into_iter()
                .map(|a| Annotation {
                    timestamp: a.timestamp,
                    value: a.value,
                })
                .collect(),
            tags: span.tags.into_iter().collect(),
            debug: Some(true).filter(|_| span.debug),
            shared: Some(true).filter(|_| span.shared),
        })
    }
}

impl TryFrom<&Span> for ProtoSpan {
    type Error = CodecError;

    fn try_from(span: &Span) -> Result<Self, Self::Error> {
        Ok(Self {
            trace_id: id_from_hex("traceId", &span.trace_id)?,
            parent_id: span
                .parent_id
                .as_deref()
                .map(|p| id_from_hex("parentId", p))
                .transpose()?
                .unwrap_or_default(),
            id: id_from_hex("id", &span.id)?,
            kind: span
                .kind
                .map_or(ProtoKind::SpanKindUnspecified, ProtoKind::from) as i32,
            name: span.name.clone().unwrap_or_default(),
            timestamp: span.timestamp.unwrap_or_default(),
            duration: span.duration.unwrap_or_default(),
            local_endpoint: span.local_endpoint.as_ref().map(ProtoEndpoint::from),
            remote_endpoint: span.remote_endpoint.as_ref().map(ProtoEndpoint::from),
            annotations: span
                .annotations
                .iter()
                .map(|a| ProtoAnnotation {
                    timestamp: a.timestamp,
                    value: a.value.clone(),
                })
                .collect(),
            tags: span
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            debug: span.debug.unwrap_or_default(),
            shared: span.shared.unwrap_or_default(),
        })
    }
}
