//! # Span
//!
//! A [`Span`] represents a single operation within a trace. Its start time is
//! taken from the tracer's clock on creation and its end time is set exactly
//! once by [`Span::end`]. Attributes, annotations, message events, links and
//! status can be changed until the span ends. Changes after that are ignored.
//!
//! `Span` is a cheap handle: clones share the same underlying data.
use crate::runtime::Clock;
use crate::trace::{
    Annotation, CanonicalCode, Link, MessageEvent, MessageEventType, SpanContext, SpanData,
    SpanId, SpanKind, Status, TraceId,
};
use crate::{wt_debug, AttributeValue, Attributes};
use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Single operation within a trace.
#[derive(Clone, Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Arc<Mutex<SpanRecord>>,
    recording: bool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct SpanRecord {
    parent_span_id: SpanId,
    parent_span_is_remote: bool,
    span_kind: SpanKind,
    name: Cow<'static, str>,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    attributes: Attributes,
    annotations: Vec<Annotation>,
    message_events: Vec<MessageEvent>,
    links: Vec<Link>,
    status: Status,
}

/// Identity and placement of a span being created.
#[derive(Debug)]
pub(crate) struct SpanStart {
    pub(crate) span_context: SpanContext,
    pub(crate) parent_span_id: SpanId,
    pub(crate) parent_span_is_remote: bool,
    pub(crate) name: Cow<'static, str>,
    pub(crate) span_kind: SpanKind,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) recording: bool,
}

impl Span {
    pub(crate) fn new(start: SpanStart, clock: Arc<dyn Clock>) -> Self {
        let start_time = start.start_time.unwrap_or_else(|| clock.now());
        Span {
            span_context: start.span_context,
            data: Arc::new(Mutex::new(SpanRecord {
                parent_span_id: start.parent_span_id,
                parent_span_is_remote: start.parent_span_is_remote,
                span_kind: start.span_kind,
                name: start.name,
                start_time,
                end_time: None,
                attributes: Attributes::new(),
                annotations: Vec::new(),
                message_events: Vec::new(),
                links: Vec::new(),
                status: Status::default(),
            })),
            recording: start.recording,
            clock,
        }
    }

    /// The span's context.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The span's own id.
    pub fn id(&self) -> SpanId {
        self.span_context.span_id()
    }

    /// The id of the trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.span_context.trace_id()
    }

    /// Returns `true` if the span records data for export, i.e. its trace is
    /// sampled.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The span's name.
    pub fn name(&self) -> Cow<'static, str> {
        self.with_data_ref(|data| data.name.clone())
            .unwrap_or_default()
    }

    /// The id of the parent span, [`SpanId::INVALID`] for a root span
    /// without a parent.
    pub fn parent_span_id(&self) -> SpanId {
        self.with_data_ref(|data| data.parent_span_id)
            .unwrap_or(SpanId::INVALID)
    }

    /// The span's kind.
    pub fn kind(&self) -> SpanKind {
        self.with_data_ref(|data| data.span_kind)
            .unwrap_or_default()
    }

    /// When the span started.
    pub fn start_time(&self) -> SystemTime {
        self.with_data_ref(|data| data.start_time)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// When the span ended, if it has.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.with_data_ref(|data| data.end_time).flatten()
    }

    /// Time between start and end. `None` until the span ends.
    pub fn duration(&self) -> Option<Duration> {
        self.with_data_ref(|data| {
            data.end_time
                .map(|end| end.duration_since(data.start_time).unwrap_or_default())
        })
        .flatten()
    }

    /// Returns `true` once [`Span::end`] has been called.
    pub fn is_ended(&self) -> bool {
        self.end_time().is_some()
    }

    /// Value of a previously set attribute.
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.with_data_ref(|data| data.attributes.get(key).cloned())
            .flatten()
    }

    /// Sets an attribute, replacing any previous value under the same key.
    pub fn add_attribute<K, V>(&self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        self.with_data(|data| {
            data.attributes.insert(key.into(), value.into());
        });
    }

    /// Records a timestamped annotation.
    pub fn add_annotation<T>(&self, description: T, attributes: Attributes)
    where
        T: Into<Cow<'static, str>>,
    {
        let timestamp = self.clock.now();
        self.with_data(|data| {
            data.annotations.push(Annotation {
                timestamp,
                description: description.into(),
                attributes,
            })
        });
    }

    /// Records a sent or received message.
    pub fn add_message_event(&self, event_type: MessageEventType, id: u64) {
        let timestamp = self.clock.now();
        self.with_data(|data| {
            data.message_events.push(MessageEvent {
                timestamp,
                event_type,
                id,
            })
        });
    }

    /// Adds a link to another span.
    pub fn add_link(&self, link: Link) {
        self.with_data(|data| data.links.push(link));
    }

    /// Sets the span's status.
    pub fn set_status<T>(&self, code: CanonicalCode, message: Option<T>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data(|data| {
            data.status = Status {
                code,
                message: message.map(Into::into),
            }
        });
    }

    /// Ends the span at the current time. Ending an already ended span does
    /// nothing.
    pub fn end(&self) {
        self.finish(self.clock.now());
    }

    /// Ends the span at `timestamp`. Ending an already ended span does
    /// nothing.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        self.finish(timestamp);
    }

    /// Sets the end time. Returns `true` only for the call that ended the
    /// span.
    pub(crate) fn finish(&self, timestamp: SystemTime) -> bool {
        let Ok(mut data) = self.data.lock() else {
            return false;
        };
        if data.end_time.is_some() {
            wt_debug!(
                name: "Span.EndIgnored",
                span_id = format!("{}", self.span_context.span_id()),
                reason = "span already ended"
            );
            return false;
        }
        data.end_time = Some(timestamp);
        true
    }

    /// Snapshot of the span for export. `None` for non-recording spans.
    pub fn exported_data(&self) -> Option<SpanData> {
        if !self.recording {
            return None;
        }
        let span_context = self.span_context.clone();
        self.with_data_ref(|data| SpanData {
            span_context,
            parent_span_id: data.parent_span_id,
            parent_span_is_remote: data.parent_span_is_remote,
            span_kind: data.span_kind,
            name: data.name.clone(),
            start_time: data.start_time,
            end_time: data.end_time,
            attributes: data.attributes.clone(),
            annotations: data.annotations.clone(),
            message_events: data.message_events.clone(),
            links: data.links.clone(),
            status: data.status.clone(),
        })
    }

    /// Clock the span reads its timestamps from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Operate on a shared reference to span data
    fn with_data_ref<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&SpanRecord) -> T,
    {
        self.data.lock().ok().map(|guard| f(&*guard))
    }

    /// Operate on a mutable reference to span data of a recording span that
    /// has not ended yet
    fn with_data<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SpanRecord) -> T,
    {
        if !self.recording {
            return None;
        }
        let mut guard = self.data.lock().ok()?;
        if guard.end_time.is_some() {
            wt_debug!(
                name: "Span.MutationIgnored",
                span_id = format!("{}", self.span_context.span_id()),
                reason = "span already ended"
            );
            return None;
        }
        Some(f(&mut *guard))
    }
}
