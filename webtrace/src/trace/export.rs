//! Trace exporters
use crate::trace::{
    Annotation, ExportResult, Link, MessageEvent, SpanContext, SpanId, SpanKind, Status, TraceId,
};
use crate::Attributes;
use std::borrow::Cow;
use std::fmt::Debug;
use std::time::SystemTime;

/// `SpanExporter` defines the interface that protocol-specific exporters
/// implement to receive finished traces from a [`Tracer`].
///
/// The tracer calls [`SpanExporter::on_end_span`] synchronously on the host
/// event loop whenever a sampled root span ends, so implementations must not
/// block: buffer the trace, or hand it off, and return.
///
/// [`Tracer`]: crate::trace::Tracer
pub trait SpanExporter: Send + Sync + Debug {
    /// Called once for every sampled root span that ends.
    fn on_end_span(&self, root: RootSpanData);

    /// Sends the given traces right away, bypassing any buffering.
    ///
    /// Transmission itself is fire-and-forget: an `Ok` result means the
    /// request was handed to the transport, not that it was delivered.
    fn publish(&self, roots: Vec<RootSpanData>) -> ExportResult;
}

/// `SpanData` contains all the information collected by a `Span` and can be
/// used by exporters as a standard input.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, [`SpanId::INVALID`] if there is none
    pub parent_span_id: SpanId,
    /// Parent span lives in another process
    pub parent_span_is_remote: bool,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time, `None` if the span was still open when its trace ended
    pub end_time: Option<SystemTime>,
    /// Span attributes
    pub attributes: Attributes,
    /// Span annotations
    pub annotations: Vec<Annotation>,
    /// Span message events
    pub message_events: Vec<MessageEvent>,
    /// Span links
    pub links: Vec<Link>,
    /// Span status
    pub status: Status,
}

/// Snapshot of a finished trace: the root span and its children in creation
/// order.
#[derive(Clone, Debug, PartialEq)]
pub struct RootSpanData {
    /// The root span.
    pub span: SpanData,
    /// Child spans, in the order they were started.
    pub spans: Vec<SpanData>,
}

impl RootSpanData {
    /// The trace shared by the root and all of its children.
    pub fn trace_id(&self) -> TraceId {
        self.span.span_context.trace_id()
    }

    /// The root span followed by its children.
    pub fn iter(&self) -> impl Iterator<Item = &SpanData> {
        std::iter::once(&self.span).chain(self.spans.iter())
    }
}
