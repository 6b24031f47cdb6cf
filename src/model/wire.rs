//! Wire representation of finished spans.
//!
//! Spans are serialized once, on the add path, into the JSON shape the
//! ingestion endpoint accepts. Redaction filters run here, over span, event,
//! link, and resource attributes, so sensitive values never sit in the
//! buffer in the clear.

use crate::buffer::BufferedSpan;
use crate::model::{AttributeMap, SpanRecord};
use crate::redact::{redact_value, DataFilter};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Attribute key carrying the configured component tag.
pub(crate) const COMPONENT_ATTRIBUTE: &str = "component";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpan {
    name: String,
    kind: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<String>,
    start_time: [i64; 2],
    end_time: [i64; 2],
    duration: [i64; 2],
    status: WireStatus,
    attributes: AttributeMap,
    links: Vec<WireLink>,
    events: Vec<WireEvent>,
    resource: WireResource,
    trace_id: String,
    span_id: String,
    trace_flags: u8,
    ended: bool,
    instrumentation_library: WireScope,
}

#[derive(Debug, Serialize)]
struct WireStatus {
    code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireLink {
    context: WireSpanContext,
    attributes: AttributeMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpanContext {
    trace_id: String,
    span_id: String,
}

#[derive(Debug, Serialize)]
struct WireEvent {
    name: String,
    time: [i64; 2],
    attributes: AttributeMap,
}

#[derive(Debug, Serialize)]
struct WireResource {
    attributes: AttributeMap,
}

#[derive(Debug, Serialize)]
struct WireScope {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// Serialize one finished span for export, applying redaction and the
/// configured component tag.
pub(crate) fn serialize_span(
    span: &SpanRecord,
    filters: &[DataFilter],
    component_tag: Option<&str>,
) -> BufferedSpan {
    let mut attributes = span.attributes.clone();
    if let Some(tag) = component_tag {
        attributes.insert(COMPONENT_ATTRIBUTE.to_owned(), Value::String(tag.to_owned()));
    }

    let wire = WireSpan {
        name: span.name.clone(),
        kind: span.kind.as_wire(),
        parent_span_id: span.parent_span_id.map(|id| id.to_string()),
        start_time: time_parts(span.start_time),
        end_time: time_parts(span.end_time),
        duration: duration_parts(span.duration()),
        status: WireStatus {
            code: span.status.code.as_wire(),
            message: span.status.message.clone(),
        },
        attributes: redact_map(filters, attributes),
        links: span
            .links
            .iter()
            .map(|link| WireLink {
                context: WireSpanContext {
                    trace_id: link.trace_id.to_string(),
                    span_id: link.span_id.to_string(),
                },
                attributes: redact_map(filters, link.attributes.clone()),
            })
            .collect(),
        events: span
            .events
            .iter()
            .map(|event| WireEvent {
                name: event.name.clone(),
                time: time_parts(event.time),
                attributes: redact_map(filters, event.attributes.clone()),
            })
            .collect(),
        resource: WireResource {
            attributes: redact_map(filters, span.resource.clone()),
        },
        trace_id: span.trace_id.to_string(),
        span_id: span.span_id.to_string(),
        trace_flags: span.trace_flags,
        ended: span.end_time > span.start_time,
        instrumentation_library: WireScope {
            name: span.scope.name.clone(),
            version: span.scope.version.clone(),
        },
    };

    BufferedSpan {
        key: (span.trace_id, span.span_id),
        // Plain structs over JSON values always encode.
        body: serde_json::to_value(wire).unwrap_or_default(),
    }
}

fn redact_map(filters: &[DataFilter], attributes: AttributeMap) -> AttributeMap {
    if filters.is_empty() {
        return attributes;
    }
    attributes
        .into_iter()
        .map(|(key, value)| {
            let value = redact_value(filters, &key, value);
            (key, value)
        })
        .collect()
}

/// Split a timestamp into the `[seconds, nanoseconds]` pair the wire format
/// uses. Times before the epoch collapse to zero.
fn time_parts(time: SystemTime) -> [i64; 2] {
    duration_parts(time.duration_since(UNIX_EPOCH).unwrap_or_default())
}

fn duration_parts(duration: Duration) -> [i64; 2] {
    [duration.as_secs() as i64, i64::from(duration.subsec_nanos())]
}
