//! # Trace API
//!
//! A trace is a tree of spans describing one user interaction. Its top is a
//! [`RootSpan`], created by the [`Tracer`], which owns the ordered list of its
//! child [`Span`]s. When the root span ends, the tracer hands a
//! [`RootSpanData`] snapshot of the whole tree to every registered
//! [`SpanExporter`].
//!
//! Spans of unsampled traces can be used exactly like sampled ones, but they
//! record nothing and never reach an exporter.
//!
//! ```
//! # #[cfg(feature = "testing")]
//! # {
//! use webtrace::trace::{SpanKind, Tracer};
//! use webtrace::testing::InMemoryExporter;
//! use std::sync::Arc;
//!
//! let exporter = Arc::new(InMemoryExporter::default());
//! let tracer = Tracer::builder().build();
//! tracer.register_exporter(exporter.clone());
//!
//! let root = tracer.start_root_span("click", None);
//! root.start_child_span("/items", SpanKind::Client).end();
//! root.end();
//!
//! let exported = exporter.get_finished_roots().unwrap();
//! assert_eq!(exported.len(), 1);
//! assert_eq!(exported[0].spans.len(), 1);
//! # }
//! ```
use crate::Attributes;
use std::borrow::Cow;
use std::time::SystemTime;

pub mod attribute_keys;
mod error;
mod export;
mod id_generator;
mod root_span;
mod span;
mod span_context;
mod tracer;

pub use self::{
    error::{ExportResult, TraceError, TraceResult},
    export::{RootSpanData, SpanData, SpanExporter},
    id_generator::{IdGenerator, RandomIdGenerator},
    root_span::RootSpan,
    span::Span,
    span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState},
    tracer::{RootSpanBuilder, Tracer, TracerBuilder},
};

#[cfg(any(feature = "testing", test))]
pub use self::id_generator::IncrementIdGenerator;

/// Relationship of a span to the remote side of the operation it covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// No remote relationship.
    #[default]
    Unspecified = 0,
    /// Server-side handling of a remote request.
    Server = 1,
    /// Client side of a remote request, such as an XHR.
    Client = 2,
}

/// Relationship of a linked span to the span that holds the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// Unknown, or something other than parent/child.
    #[default]
    Unspecified = 0,
    /// The linked span is a child of this span.
    ChildLinkedSpan = 1,
    /// The linked span is a parent of this span.
    ParentLinkedSpan = 2,
}

/// Pointer from one span to another, possibly in a different trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// Trace of the linked span.
    pub trace_id: TraceId,
    /// The linked span.
    pub span_id: SpanId,
    /// How the linked span relates to this one.
    pub link_type: LinkType,
    /// Attributes describing the link.
    pub attributes: Attributes,
}

impl Link {
    /// Create a link without attributes.
    pub fn new(trace_id: TraceId, span_id: SpanId, link_type: LinkType) -> Self {
        Link {
            trace_id,
            span_id,
            link_type,
            attributes: Attributes::new(),
        }
    }
}

/// A timestamped description attached to a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// When the annotation was recorded.
    pub timestamp: SystemTime,
    /// Free-form description.
    pub description: Cow<'static, str>,
    /// Attributes describing the annotation.
    pub attributes: Attributes,
}

/// Direction of a [`MessageEvent`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MessageEventType {
    /// Unknown direction.
    #[default]
    Unspecified = 0,
    /// A message was sent.
    Sent = 1,
    /// A message was received.
    Received = 2,
}

/// A message sent or received while the span was active.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    /// When the message was observed.
    pub timestamp: SystemTime,
    /// Sent or received.
    pub event_type: MessageEventType,
    /// Identifier of the message, unique within the span.
    pub id: u64,
}

/// Canonical status codes, numbered as on the collector wire format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum CanonicalCode {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl CanonicalCode {
    /// Numeric value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Outcome of the operation a span covers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Status {
    /// Status code, `Ok` unless set otherwise.
    pub code: CanonicalCode,
    /// Optional developer-facing message.
    pub message: Option<Cow<'static, str>>,
}
