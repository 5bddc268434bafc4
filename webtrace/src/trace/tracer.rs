//! # Tracer
//!
//! The [`Tracer`] creates root spans and keeps the ordered set of
//! [`SpanExporter`]s that are notified when a sampled root span ends.
//!
//! Cloning a tracer is cheap and every clone shares the same exporter set.
use crate::runtime::{Clock, SystemClock};
use crate::sampling::make_random_sampling_decision;
use crate::trace::span::SpanStart;
use crate::trace::{
    IdGenerator, RandomIdGenerator, RootSpan, RootSpanData, Span, SpanContext, SpanExporter,
    SpanId, SpanKind, TraceFlags, TraceId, TraceState,
};
use crate::{wt_debug, wt_warn};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Creates root spans and dispatches finished traces to exporters.
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    exporters: RwLock<Vec<Arc<dyn SpanExporter>>>,
    id_generator: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    sample_rate: f64,
}

impl fmt::Debug for TracerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field(
                "exporters",
                &self.exporters.read().map(|e| e.len()).unwrap_or_default(),
            )
            .field("id_generator", &self.id_generator)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Tracer::builder().build()
    }
}

impl Tracer {
    /// Create a new [`TracerBuilder`].
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Starts a root span.
    ///
    /// When `parent` is a valid span context, the new root continues its
    /// trace: it takes over the trace id, sampling options and trace state,
    /// and records the parent's span id. Otherwise a new trace id is
    /// generated and the sampling options come from a coin flip at the
    /// tracer's sample rate.
    pub fn start_root_span<T>(&self, name: T, parent: Option<&SpanContext>) -> RootSpan
    where
        T: Into<Cow<'static, str>>,
    {
        let builder = self.root_span_builder(name);
        match parent {
            Some(parent) => builder.with_parent(parent.clone()).start(),
            None => builder.start(),
        }
    }

    /// Returns a builder for a root span with more control over its identity.
    pub fn root_span_builder<T>(&self, name: T) -> RootSpanBuilder<'_>
    where
        T: Into<Cow<'static, str>>,
    {
        RootSpanBuilder {
            tracer: self,
            name: name.into(),
            kind: SpanKind::Unspecified,
            parent: None,
            trace_id: None,
            trace_flags: None,
            start_time: None,
        }
    }

    /// Adds an exporter. Returns `false` if that exporter was already
    /// registered. Exporters are notified in registration order.
    pub fn register_exporter(&self, exporter: Arc<dyn SpanExporter>) -> bool {
        let Ok(mut exporters) = self.inner.exporters.write() else {
            wt_warn!(name: "Tracer.RegisterExporterFailed", reason = "exporter lock poisoned");
            return false;
        };
        if exporters.iter().any(|e| same_exporter(e, &exporter)) {
            wt_debug!(name: "Tracer.ExporterAlreadyRegistered");
            return false;
        }
        exporters.push(exporter);
        true
    }

    /// Removes an exporter. Returns `false` if it was not registered.
    pub fn unregister_exporter(&self, exporter: &Arc<dyn SpanExporter>) -> bool {
        let Ok(mut exporters) = self.inner.exporters.write() else {
            return false;
        };
        let before = exporters.len();
        exporters.retain(|e| !same_exporter(e, exporter));
        exporters.len() != before
    }

    /// The registered exporters, in notification order.
    pub fn exporters(&self) -> Vec<Arc<dyn SpanExporter>> {
        self.inner
            .exporters
            .read()
            .map(|exporters| exporters.clone())
            .unwrap_or_default()
    }

    /// Generates a fresh trace id.
    pub fn new_trace_id(&self) -> TraceId {
        self.inner.id_generator.new_trace_id()
    }

    /// Generates a fresh span id.
    pub fn new_span_id(&self) -> SpanId {
        self.inner.id_generator.new_span_id()
    }

    /// The clock spans of this tracer read their timestamps from.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub(crate) fn on_root_span_end(&self, root: RootSpanData) {
        // Exporters may register or unregister others while handling a
        // trace, so the lock is released before calling out.
        let exporters = self.exporters();
        for exporter in exporters {
            exporter.on_end_span(root.clone());
        }
    }
}

fn same_exporter(a: &Arc<dyn SpanExporter>, b: &Arc<dyn SpanExporter>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Tracer configuration builder.
#[derive(Debug)]
pub struct TracerBuilder {
    exporters: Vec<Arc<dyn SpanExporter>>,
    id_generator: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    sample_rate: f64,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            exporters: Vec::new(),
            id_generator: Box::new(RandomIdGenerator::default()),
            clock: Arc::new(SystemClock),
            sample_rate: 1.0,
        }
    }
}

impl TracerBuilder {
    /// Registers an exporter on the tracer being built.
    pub fn with_exporter(mut self, exporter: Arc<dyn SpanExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Specify the id generator.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Specify the clock spans read their timestamps from.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Probability in `[0, 1]` that a root span without a parent is sampled.
    /// Defaults to `1.0`.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Create a new [`Tracer`] from this configuration.
    pub fn build(self) -> Tracer {
        let tracer = Tracer {
            inner: Arc::new(TracerInner {
                exporters: RwLock::new(Vec::new()),
                id_generator: self.id_generator,
                clock: self.clock,
                sample_rate: self.sample_rate,
            }),
        };
        for exporter in self.exporters {
            tracer.register_exporter(exporter);
        }
        tracer
    }
}

/// Builder for a root span, returned by [`Tracer::root_span_builder`].
///
/// An explicit trace id or sampling decision takes precedence over the one
/// inherited from a parent.
#[derive(Debug)]
pub struct RootSpanBuilder<'a> {
    tracer: &'a Tracer,
    name: Cow<'static, str>,
    kind: SpanKind,
    parent: Option<SpanContext>,
    trace_id: Option<TraceId>,
    trace_flags: Option<TraceFlags>,
    start_time: Option<SystemTime>,
}

impl RootSpanBuilder<'_> {
    /// Continue the trace of `parent`, if it is valid.
    pub fn with_parent(mut self, parent: SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Use `trace_id` instead of generating one.
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Use `trace_flags` instead of flipping a coin.
    pub fn with_trace_flags(mut self, trace_flags: TraceFlags) -> Self {
        self.trace_flags = Some(trace_flags);
        self
    }

    /// Span kind of the root span.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Start time of the root span, defaults to now.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Starts the root span.
    pub fn start(self) -> RootSpan {
        let tracer = self.tracer;
        let parent = self.parent.filter(SpanContext::is_valid);

        let trace_id = self
            .trace_id
            .filter(|id| *id != TraceId::INVALID)
            .or_else(|| parent.as_ref().map(SpanContext::trace_id))
            .unwrap_or_else(|| tracer.new_trace_id());
        let trace_flags = self
            .trace_flags
            .or_else(|| parent.as_ref().map(SpanContext::trace_flags))
            .unwrap_or_else(|| make_random_sampling_decision(tracer.inner.sample_rate));
        let trace_state = parent
            .as_ref()
            .map(|p| p.trace_state().clone())
            .unwrap_or(TraceState::NONE);

        let span = Span::new(
            SpanStart {
                span_context: SpanContext::new(
                    trace_id,
                    tracer.new_span_id(),
                    trace_flags,
                    false,
                    trace_state,
                ),
                parent_span_id: parent
                    .as_ref()
                    .map(SpanContext::span_id)
                    .unwrap_or(SpanId::INVALID),
                parent_span_is_remote: parent.as_ref().is_some_and(SpanContext::is_remote),
                name: self.name,
                span_kind: self.kind,
                start_time: self.start_time,
                recording: trace_flags.is_sampled(),
            },
            tracer.clock(),
        );
        RootSpan::new(span, tracer.clone())
    }
}
