//! Span data model.
//!
//! [`SpanRecord`] is the immutable value object a span producer hands to the
//! pipeline once a traced call has completed. The pipeline never creates or
//! ends spans itself; it only serializes, buffers, and ships them.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub(crate) mod wire;

/// Ordered map of attribute keys to scalar or nested JSON values.
///
/// Keys are unique within one span; insertion order is preserved through
/// serialization.
pub type AttributeMap = serde_json::Map<String, Value>;

/// Error returned when parsing a span or trace id from hex fails.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("id is not a hex string of the expected length")]
pub struct ParseIdError;

/// A 16-byte identifier shared by every span of one trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid (all zeroes) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Construct a trace id from its 16-byte big-endian representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// The 16-byte big-endian representation of this id.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parse a 32-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIdError> {
        if hex.len() != 32 {
            return Err(ParseIdError);
        }
        u128::from_str_radix(hex, 16)
            .map(TraceId)
            .map_err(|_| ParseIdError)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({:032x})", self.0)
    }
}

/// An 8-byte identifier unique to one span within a trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid (all zeroes) span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Construct a span id from its 8-byte big-endian representation.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// The 8-byte big-endian representation of this id.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse a 16-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIdError> {
        if hex.len() != 16 {
            return Err(ParseIdError);
        }
        u64::from_str_radix(hex, 16)
            .map(SpanId)
            .map_err(|_| ParseIdError)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({:016x})", self.0)
    }
}

/// The role a span plays relative to its trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Internal operation within an application.
    Internal,
    /// Server-side handling of a remote request.
    Server,
    /// Client-side wrapper of a remote request.
    Client,
    /// Initiator of an asynchronous message.
    Producer,
    /// Handler of an asynchronous message.
    Consumer,
}

impl SpanKind {
    pub(crate) fn as_wire(self) -> i32 {
        match self {
            SpanKind::Internal => 0,
            SpanKind::Server => 1,
            SpanKind::Client => 2,
            SpanKind::Producer => 3,
            SpanKind::Consumer => 4,
        }
    }
}

/// Span status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    /// The default status.
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error,
}

impl StatusCode {
    pub(crate) fn as_wire(self) -> i32 {
        match self {
            StatusCode::Unset => 0,
            StatusCode::Ok => 1,
            StatusCode::Error => 2,
        }
    }
}

/// Status of a finished span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanStatus {
    /// The status code.
    pub code: StatusCode,
    /// Optional description, usually only set on errors.
    pub message: Option<String>,
}

impl SpanStatus {
    /// The default, unset status.
    pub fn unset() -> Self {
        SpanStatus {
            code: StatusCode::Unset,
            message: None,
        }
    }

    /// A successful status.
    pub fn ok() -> Self {
        SpanStatus {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// An error status carrying a description.
    pub fn error(message: impl Into<String>) -> Self {
        SpanStatus {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

impl Default for SpanStatus {
    fn default() -> Self {
        SpanStatus::unset()
    }
}

/// A timestamped event recorded on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// When the event occurred.
    pub time: SystemTime,
    /// Event attributes.
    pub attributes: AttributeMap,
}

/// A reference from one span to another, without ownership.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanLink {
    /// Trace id of the referenced span.
    pub trace_id: TraceId,
    /// Id of the referenced span.
    pub span_id: SpanId,
    /// Link attributes.
    pub attributes: AttributeMap,
}

/// Name and version of the instrumentation that produced a span.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct InstrumentationScope {
    /// Instrumentation library name.
    pub name: String,
    /// Instrumentation library version, if known.
    pub version: Option<String>,
}

impl InstrumentationScope {
    /// Create a new instrumentation descriptor.
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        InstrumentationScope {
            name: name.into(),
            version,
        }
    }
}

/// One finished span, created by the span producer and immutable thereafter.
///
/// Invariant: `end_time >= start_time`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanRecord {
    /// Span name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// Id of this span, unique within the trace.
    pub span_id: SpanId,
    /// Id of the parent span, if any.
    pub parent_span_id: Option<SpanId>,
    /// Trace flags byte propagated with the span context.
    pub trace_flags: u8,
    /// When the traced call started.
    pub start_time: SystemTime,
    /// When the traced call completed.
    pub end_time: SystemTime,
    /// Final status.
    pub status: SpanStatus,
    /// Span attributes, already reduced to JSON values by the producer.
    pub attributes: AttributeMap,
    /// Events recorded while the span was live.
    pub events: Vec<SpanEvent>,
    /// References to related spans.
    pub links: Vec<SpanLink>,
    /// Resource attributes shared by all spans of this process.
    pub resource: AttributeMap,
    /// Instrumentation that produced the span.
    pub scope: InstrumentationScope,
}

impl SpanRecord {
    /// Wall-clock duration of the traced call, saturating at zero.
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

/// Serialize an arbitrary value into a span attribute.
///
/// Values that cannot be JSON-encoded fall back to their `Debug`
/// representation rather than failing the span.
pub fn serialize_attribute<T>(value: &T) -> Value
where
    T: Serialize + fmt::Debug,
{
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn trace_id_hex_round_trip() {
        let id = TraceId::from_bytes([
            0x0a, 0xf7, 0x65, 0x19, 0x16, 0xcd, 0x43, 0xdd, 0x84, 0x48, 0xeb, 0x21, 0x1c, 0x80,
            0x31, 0x9c,
        ]);
        assert_eq!(id.to_string(), "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(TraceId::from_hex("0af7651916cd43dd8448eb211c80319c"), Ok(id));
    }

    #[test]
    fn span_id_hex_round_trip() {
        let id = SpanId::from_bytes([0xb7, 0xad, 0x6b, 0x71, 0x69, 0x20, 0x33, 0x31]);
        assert_eq!(id.to_string(), "b7ad6b7169203331");
        assert_eq!(SpanId::from_hex("b7ad6b7169203331"), Ok(id));
    }

    #[test]
    fn id_parsing_rejects_bad_input() {
        assert_eq!(TraceId::from_hex("abc"), Err(ParseIdError));
        assert_eq!(TraceId::from_hex(&"zz".repeat(16)), Err(ParseIdError));
        assert_eq!(SpanId::from_hex(""), Err(ParseIdError));
    }

    #[test]
    fn invalid_ids_render_as_zeroes() {
        assert_eq!(TraceId::INVALID.to_string(), "0".repeat(32));
        assert_eq!(SpanId::INVALID.to_string(), "0".repeat(16));
    }

    #[test]
    fn duration_saturates_at_zero() {
        let span = SpanRecord {
            name: "backwards".to_owned(),
            kind: SpanKind::Internal,
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            parent_span_id: None,
            trace_flags: 0,
            start_time: UNIX_EPOCH + Duration::from_secs(10),
            end_time: UNIX_EPOCH + Duration::from_secs(5),
            status: SpanStatus::unset(),
            attributes: AttributeMap::new(),
            events: Vec::new(),
            links: Vec::new(),
            resource: AttributeMap::new(),
            scope: InstrumentationScope::default(),
        };
        assert_eq!(span.duration(), Duration::ZERO);
    }

    #[test]
    fn attribute_serialization_falls_back_to_debug() {
        #[derive(Debug)]
        struct Opaque;

        impl Serialize for Opaque {
            fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                Err(serde::ser::Error::custom("not serializable"))
            }
        }

        assert_eq!(serialize_attribute(&42u32), Value::from(42u32));
        assert_eq!(serialize_attribute(&Opaque), Value::String("Opaque".to_owned()));
    }
}
