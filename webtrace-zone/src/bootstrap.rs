//! One-call setup of interaction tracking.
use crate::error::TrackerError;
use crate::page::Page;
use crate::scheduler::TaskScheduler;
use crate::task::Task;
use crate::tracker::{InteractionTracker, TrackerConfig};
use std::fmt;
use std::sync::Arc;
use webtrace::runtime::Timers;
use webtrace::trace::{SpanContext, Tracer};
use webtrace::{global, sampling, wt_info};

#[cfg(feature = "agent")]
use webtrace_agent::AgentExporterBuilder;

/// Path of the trace endpoint on the agent.
#[cfg(feature = "agent")]
pub const AGENT_TRACE_PATH: &str = "/v1/trace";

/// Everything [`start_interaction_tracker`] needs from the host.
pub struct TrackerSetup {
    timers: Arc<dyn Timers>,
    page: Arc<dyn Page>,
    tracer: Option<Tracer>,
    config: TrackerConfig,
    initial_load: Option<SpanContext>,
    classifier: Option<Box<dyn Fn(&Task) -> bool + Send + Sync>>,
    #[cfg(feature = "agent")]
    agent: Option<AgentExporterBuilder>,
}

impl TrackerSetup {
    /// Setup for a host with the given timers and page.
    pub fn new(timers: Arc<dyn Timers>, page: Arc<dyn Page>) -> Self {
        TrackerSetup {
            timers,
            page,
            tracer: None,
            config: TrackerConfig::default(),
            initial_load: None,
            classifier: None,
            #[cfg(feature = "agent")]
            agent: None,
        }
    }

    /// Tracer to use instead of the global one.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Tracker configuration.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial-load span context to use instead of the one stored in
    /// [`webtrace::sampling`].
    pub fn with_initial_load_span_context(mut self, span_context: SpanContext) -> Self {
        self.initial_load = Some(span_context);
        self
    }

    /// Replaces the rule deciding which tasks start interactions.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Agent exporter configuration. Its endpoint is the agent's base URL;
    /// `/v1/trace` is appended.
    #[cfg(feature = "agent")]
    pub fn with_agent_exporter(mut self, builder: AgentExporterBuilder) -> Self {
        self.agent = Some(builder);
        self
    }
}

impl fmt::Debug for TrackerSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSetup")
            .field("page", &self.page)
            .field("tracer", &self.tracer)
            .field("config", &self.config)
            .field("initial_load", &self.initial_load)
            .finish()
    }
}

/// Result of [`start_interaction_tracker`]: the scheduler to install on the
/// host.
#[derive(Debug)]
pub enum Tracking<S> {
    /// Interactions are traced.
    Tracked(InteractionTracker<S>),
    /// Interactions are not traced; the scheduler is unchanged.
    Untracked {
        /// The scheduler passed in.
        scheduler: S,
        /// Why tracking did not start.
        reason: TrackerError,
    },
}

impl<S> Tracking<S> {
    /// Whether interactions are traced.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Tracking::Tracked(_))
    }

    /// The tracker, if tracking started.
    pub fn tracker(&self) -> Option<&InteractionTracker<S>> {
        match self {
            Tracking::Tracked(tracker) => Some(tracker),
            Tracking::Untracked { .. } => None,
        }
    }
}

impl<S: TaskScheduler> TaskScheduler for Tracking<S> {
    fn schedule_task(&self, task: &mut Task) {
        match self {
            Tracking::Tracked(tracker) => tracker.schedule_task(task),
            Tracking::Untracked { scheduler, .. } => scheduler.schedule_task(task),
        }
    }

    fn run_task(&self, task: &mut Task) {
        match self {
            Tracking::Tracked(tracker) => tracker.run_task(task),
            Tracking::Untracked { scheduler, .. } => scheduler.run_task(task),
        }
    }

    fn cancel_task(&self, task: &mut Task) {
        match self {
            Tracking::Tracked(tracker) => tracker.cancel_task(task),
            Tracking::Untracked { scheduler, .. } => scheduler.cancel_task(task),
        }
    }
}

/// Starts tracing user interactions on top of `scheduler`.
///
/// Interactions inherit the sampling decision of the initial page load. If
/// that load was not sampled, or no decision was stored, the scheduler is
/// returned untouched. Otherwise, when an agent endpoint is configured
/// (through [`TrackerSetup::with_agent_exporter`] or
/// `WEBTRACE_AGENT_ENDPOINT`), an agent exporter is registered on the
/// tracer, and the scheduler is wrapped in an [`InteractionTracker`].
pub fn start_interaction_tracker<S: TaskScheduler>(scheduler: S, setup: TrackerSetup) -> Tracking<S> {
    let initial_load = setup
        .initial_load
        .clone()
        .or_else(|| sampling::initial_load_span_context().cloned());
    let Some(initial_load) = initial_load.filter(sampling::is_sampled) else {
        wt_info!(
            name: "InteractionTracker.NotStarted",
            reason = "initial load is not sampled"
        );
        return Tracking::Untracked {
            scheduler,
            reason: TrackerError::NotSampled,
        };
    };

    let tracer = setup.tracer.clone().unwrap_or_else(global::tracer);

    #[cfg(feature = "agent")]
    register_agent_exporter(&tracer, setup.agent, &setup.timers, setup.page.as_ref());

    let mut builder = InteractionTracker::builder(scheduler, setup.timers, setup.page)
        .with_tracer(tracer)
        .with_config(setup.config)
        .with_trace_flags(initial_load.trace_flags());
    if let Some(classifier) = setup.classifier {
        builder = builder.with_classifier(classifier);
    }
    wt_info!(name: "InteractionTracker.Started");
    Tracking::Tracked(builder.build())
}

#[cfg(feature = "agent")]
fn register_agent_exporter(
    tracer: &Tracer,
    agent: Option<AgentExporterBuilder>,
    timers: &Arc<dyn Timers>,
    page: &dyn Page,
) {
    use webtrace::wt_warn;

    let mut builder = agent.unwrap_or_default();
    let Some(endpoint) = builder.agent_endpoint() else {
        wt_info!(
            name: "InteractionTracker.ExportDisabled",
            reason = "no agent endpoint configured"
        );
        return;
    };
    let endpoint = format!("{}{}", endpoint.trim_end_matches('/'), AGENT_TRACE_PATH);
    if builder.host_name().is_none() {
        if let Some(host) = page_host(&page.href()) {
            builder = builder.with_host_name(host);
        }
    }
    match builder
        .with_agent_endpoint(endpoint)
        .with_timers(timers.clone())
        .build()
    {
        Ok(exporter) => {
            tracer.register_exporter(Arc::new(exporter));
        }
        Err(err) => {
            wt_warn!(
                name: "InteractionTracker.ExportDisabled",
                reason = format!("{}", err)
            );
        }
    }
}

/// `host[:port]` of the page, as reported to the agent.
#[cfg(feature = "agent")]
fn page_host(href: &str) -> Option<String> {
    let url = url::Url::parse(href).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
