use crate::trace::span::SpanStart;
use crate::trace::{RootSpanData, Span, SpanContext, SpanKind, TraceId, Tracer};
use crate::wt_debug;
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Top span of a trace.
///
/// A root span owns the ordered list of its child spans. Ending it freezes
/// the trace: if the trace is sampled, a [`RootSpanData`] snapshot of the
/// root and its children is handed to every exporter registered on the
/// tracer that created it. This happens at most once, no matter how many
/// times `end` is called.
///
/// `RootSpan` derefs to [`Span`] for attributes, annotations and the like.
#[derive(Clone, Debug)]
pub struct RootSpan {
    span: Span,
    children: Arc<Mutex<Vec<Span>>>,
    tracer: Tracer,
}

impl RootSpan {
    pub(crate) fn new(span: Span, tracer: Tracer) -> Self {
        RootSpan {
            span,
            children: Arc::new(Mutex::new(Vec::new())),
            tracer,
        }
    }

    /// The id of the trace this root span heads.
    pub fn trace_id(&self) -> TraceId {
        self.span.trace_id()
    }

    /// The root span as a plain [`Span`].
    pub fn as_span(&self) -> &Span {
        &self.span
    }

    /// Starts a child span parented to this root.
    ///
    /// The child gets a fresh span id, shares the root's trace id and
    /// sampling options, starts now, and is appended to the root's list of
    /// spans. Children started after the root ended are not recorded.
    pub fn start_child_span<T>(&self, name: T, kind: SpanKind) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        let root_context = self.span.span_context();
        let accepting = self.span.is_recording() && !self.span.is_ended();
        if self.span.is_recording() && !accepting {
            wt_debug!(
                name: "RootSpan.ChildAfterEnd",
                trace_id = format!("{}", root_context.trace_id()),
                reason = "root span already ended"
            );
        }

        let child = Span::new(
            SpanStart {
                span_context: SpanContext::new(
                    root_context.trace_id(),
                    self.tracer.new_span_id(),
                    root_context.trace_flags(),
                    false,
                    root_context.trace_state().clone(),
                ),
                parent_span_id: root_context.span_id(),
                parent_span_is_remote: false,
                name: name.into(),
                span_kind: kind,
                start_time: None,
                recording: accepting,
            },
            self.span.clock().clone(),
        );

        if accepting {
            if let Ok(mut children) = self.children.lock() {
                children.push(child.clone());
            }
        }
        child
    }

    /// Child spans in the order they were started.
    pub fn spans(&self) -> Vec<Span> {
        self.children
            .lock()
            .map(|children| children.clone())
            .unwrap_or_default()
    }

    /// Ends the root span now. See [`RootSpan::end_with_timestamp`].
    pub fn end(&self) {
        self.end_with_timestamp(self.span.clock().now());
    }

    /// Ends the root span at `timestamp` and, for sampled traces, notifies
    /// the tracer's exporters. Later calls do nothing.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        if !self.span.finish(timestamp) {
            return;
        }
        if let Some(data) = self.to_root_span_data() {
            self.tracer.on_root_span_end(data);
        }
    }

    /// Snapshot of the root and its children. `None` for unsampled traces.
    pub fn to_root_span_data(&self) -> Option<RootSpanData> {
        let span = self.span.exported_data()?;
        let spans = self
            .spans()
            .iter()
            .filter_map(Span::exported_data)
            .collect();
        Some(RootSpanData { span, spans })
    }
}

impl Deref for RootSpan {
    type Target = Span;

    fn deref(&self) -> &Span {
        &self.span
    }
}
