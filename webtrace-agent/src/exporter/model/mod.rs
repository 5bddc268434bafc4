use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::SystemTime;
use webtrace::trace::{
    Annotation, Link, LinkType, MessageEvent, MessageEventType, RootSpanData, SpanData, SpanId,
    SpanKind, Status, TraceState,
};
use webtrace::{AttributeValue, Attributes};

pub(crate) mod node;
pub(crate) mod span;

use node::Node;

/// Body of one request to the agent's trace endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct ExportRequest<'a> {
    pub(crate) node: &'a Node,
    pub(crate) spans: Vec<span::Span>,
}

/// Converts a finished trace into agent spans: the root first, then its
/// children in creation order.
pub(crate) fn adapt_root_span(root: &RootSpanData) -> Vec<span::Span> {
    root.iter().map(adapt_span).collect()
}

fn adapt_span(span_data: &SpanData) -> span::Span {
    let span_context = &span_data.span_context;
    let builder = span::Span::builder()
        .trace_id(STANDARD.encode(span_context.trace_id().to_bytes()))
        .span_id(STANDARD.encode(span_context.span_id().to_bytes()))
        .tracestate(adapt_trace_state(span_context.trace_state()))
        .parent_span_id(adapt_parent_span_id(span_data.parent_span_id))
        .name(span_data.name.as_ref())
        .kind(adapt_span_kind(span_data.span_kind))
        .start_time(adapt_time(span_data.start_time))
        .attributes(adapt_attributes(&span_data.attributes))
        .time_events(adapt_time_events(
            &span_data.annotations,
            &span_data.message_events,
        ))
        .links(span::Links {
            link: span_data.links.iter().map(adapt_link).collect(),
        })
        .status(adapt_status(&span_data.status))
        .same_process_as_parent_span(!span_data.parent_span_is_remote);

    // A child still open when its root ended is sent without an end time.
    match span_data.end_time {
        Some(end_time) => builder.end_time(adapt_time(end_time)).build(),
        None => builder.build(),
    }
}

fn adapt_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn adapt_parent_span_id(parent_span_id: SpanId) -> String {
    if parent_span_id == SpanId::INVALID {
        String::new()
    } else {
        STANDARD.encode(parent_span_id.to_bytes())
    }
}

fn adapt_trace_state(trace_state: &TraceState) -> std::collections::BTreeMap<String, String> {
    trace_state
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn adapt_span_kind(kind: SpanKind) -> i32 {
    match kind {
        SpanKind::Unspecified => 0,
        SpanKind::Server => 1,
        SpanKind::Client => 2,
    }
}

fn adapt_value(value: &AttributeValue) -> span::AttributeValue {
    match value {
        AttributeValue::String(value) => span::AttributeValue::StringValue(value.as_ref().into()),
        AttributeValue::Int(value) => span::AttributeValue::IntValue(*value),
        AttributeValue::Bool(value) => span::AttributeValue::BoolValue(*value),
        AttributeValue::Double(value) => span::AttributeValue::DoubleValue(*value),
    }
}

fn adapt_attributes(attributes: &Attributes) -> span::Attributes {
    span::Attributes {
        attribute_map: attributes
            .iter()
            .map(|(key, value)| (key.clone(), adapt_value(value)))
            .collect(),
    }
}

fn adapt_annotation(annotation: &Annotation) -> span::TimeEvent {
    span::TimeEvent::builder()
        .time(adapt_time(annotation.timestamp))
        .annotation(span::Annotation {
            description: annotation.description.as_ref().into(),
            attributes: adapt_attributes(&annotation.attributes),
        })
        .build()
}

fn adapt_message_event(message_event: &MessageEvent) -> span::TimeEvent {
    let event_type = match message_event.event_type {
        MessageEventType::Unspecified => 0,
        MessageEventType::Sent => 1,
        MessageEventType::Received => 2,
    };
    span::TimeEvent::builder()
        .time(adapt_time(message_event.timestamp))
        .message_event(span::MessageEvent {
            event_type,
            id: message_event.id.to_string(),
        })
        .build()
}

fn adapt_time_events(
    annotations: &[Annotation],
    message_events: &[MessageEvent],
) -> span::TimeEvents {
    span::TimeEvents {
        time_event: annotations
            .iter()
            .map(adapt_annotation)
            .chain(message_events.iter().map(adapt_message_event))
            .collect(),
    }
}

fn adapt_link(link: &Link) -> span::Link {
    span::Link {
        trace_id: STANDARD.encode(link.trace_id.to_bytes()),
        span_id: STANDARD.encode(link.span_id.to_bytes()),
        link_type: match link.link_type {
            LinkType::Unspecified => 0,
            LinkType::ChildLinkedSpan => 1,
            LinkType::ParentLinkedSpan => 2,
        },
        attributes: adapt_attributes(&link.attributes),
    }
}

fn adapt_status(status: &Status) -> span::Status {
    span::Status {
        code: status.code.as_i32(),
        message: status.message.as_ref().map(|message| message.to_string()),
    }
}
