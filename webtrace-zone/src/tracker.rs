//! Scheduler decorator that groups asynchronous work into interactions.
use crate::interaction::{InteractionData, OnPageInteraction};
use crate::page::Page;
use crate::scheduler::TaskScheduler;
use crate::task::{Task, TaskKind, TaskTarget};
use crate::xhr::XhrSpans;
use crate::zone::Zone;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use url::Url;
use webtrace::global;
use webtrace::runtime::Timers;
use webtrace::trace::{TraceFlags, Tracer};
use webtrace::{wt_debug, wt_warn};

/// Default window within which tracked events merge into one interaction.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(50);

/// Decides whether a task starts (or joins) a user interaction.
pub type InteractionClassifier = Box<dyn Fn(&Task) -> bool + Send + Sync>;

/// The default classifier: click events.
pub fn is_click(task: &Task) -> bool {
    task.kind() == TaskKind::Event && task.event_name() == Some("click")
}

/// Tracker configuration.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    reset_delay: Duration,
    trace_header_origins: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            reset_delay: DEFAULT_RESET_DELAY,
            trace_header_origins: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// How long after an interaction starts further tracked events still
    /// join it instead of starting a new trace.
    pub fn with_reset_delay(mut self, reset_delay: Duration) -> Self {
        self.reset_delay = reset_delay;
        self
    }

    /// Origins other than the page's own that receive a `traceparent`
    /// header, e.g. `https://api.example.com`.
    pub fn with_trace_header_origins<I, T>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.trace_header_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Debounce window of interactions.
    pub fn reset_delay(&self) -> Duration {
        self.reset_delay
    }

    /// Allow-listed origins for `traceparent`.
    pub fn trace_header_origins(&self) -> &[String] {
        &self.trace_header_origins
    }
}

/// A [`TaskScheduler`] that traces user interactions.
///
/// The tracker wraps the host's scheduler. When a task the classifier
/// accepts (a click, by default) runs outside any tracing zone, it forks a
/// new tracing zone with a fresh trace id and a root span, and remembers it
/// as the current interaction for [`TrackerConfig::reset_delay`]. Tasks
/// scheduled while a tracing zone is current are stamped with it and run
/// inside it; non-periodic ones count as pending work of the interaction.
/// Once the window has closed and the last pending task has run or was
/// cancelled, the root span is finalized. An interaction that went idle
/// inside the window ends at the time it went idle.
///
/// Requests ([`TaskTarget::Xhr`]) scheduled inside a tracing zone get a
/// client child span, ended when the request completes.
///
/// Bookkeeping failures never reach host code: the inner scheduler always
/// receives the task.
pub struct InteractionTracker<S> {
    inner: S,
    tracer: Tracer,
    timers: Weak<dyn Timers>,
    page: Arc<dyn Page>,
    classifier: InteractionClassifier,
    config: TrackerConfig,
    trace_flags: TraceFlags,
    current_interaction: Arc<Mutex<Option<Zone>>>,
    xhr_spans: XhrSpans,
}

impl<S> InteractionTracker<S> {
    /// Builder for a tracker wrapping `inner`.
    ///
    /// The tracker keeps only a weak handle to `timers`; the host owns
    /// them.
    pub fn builder(
        inner: S,
        timers: Arc<dyn Timers>,
        page: Arc<dyn Page>,
    ) -> InteractionTrackerBuilder<S> {
        InteractionTrackerBuilder {
            inner,
            timers: Arc::downgrade(&timers),
            page,
            tracer: None,
            classifier: None,
            config: TrackerConfig::default(),
            trace_flags: TraceFlags::SAMPLED,
        }
    }

    /// The wrapped scheduler.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Tracer creating the interactions' spans.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Tracker configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The zone tracked events currently merge into, if the debounce
    /// window of the last interaction is still open.
    pub fn current_interaction(&self) -> Option<Zone> {
        self.current_interaction
            .lock()
            .ok()
            .and_then(|current| current.clone())
    }

    fn zone_for_run(&self, task: &Task) -> Zone {
        if (self.classifier)(task) {
            let current = Zone::current();
            if current.is_tracing() {
                return current;
            }
            return self.interaction_zone(task);
        }
        match task.zone() {
            Some(zone) if zone.is_tracing() => zone.clone(),
            _ => Zone::root(),
        }
    }

    fn interaction_zone(&self, task: &Task) -> Zone {
        let Ok(mut current) = self.current_interaction.lock() else {
            return Zone::root();
        };
        if let Some(zone) = current.as_ref() {
            wt_debug!(
                name: "InteractionTracker.InteractionJoined",
                trace_id = format!("{:?}", zone.trace_id())
            );
            return zone.clone();
        }

        let zone = self.start_interaction(task);
        match (self.timers.upgrade(), zone.interaction()) {
            (Some(timers), Some(interaction)) => {
                interaction.open_window();
                *current = Some(zone.clone());
                drop(current);
                self.schedule_reset(timers.as_ref(), interaction.clone());
            }
            _ => {
                wt_warn!(
                    name: "InteractionTracker.TimersDropped",
                    reason = "host timers are gone, interactions are not merged"
                );
            }
        }
        zone
    }

    fn start_interaction(&self, task: &Task) -> Zone {
        let element = match task.target() {
            Some(TaskTarget::Element(element)) => Some(element),
            _ => None,
        };
        let event_type = task.event_name().unwrap_or(task.source()).to_string();
        let name = element
            .and_then(|element| element.interaction_name())
            .map(str::to_owned)
            .unwrap_or_else(|| event_type.clone());

        let root = self
            .tracer
            .root_span_builder(name)
            .with_trace_flags(self.trace_flags)
            .start();

        let href = self.page.href();
        let path = Url::parse(&href)
            .map(|url| url.path().to_string())
            .unwrap_or_default();
        let data = InteractionData {
            start_location_href: href,
            start_location_path: path,
            event_type,
            target_element: element
                .map(|element| element.tag_name().to_string())
                .unwrap_or_default(),
            user_agent: self.page.user_agent(),
        };

        wt_debug!(
            name: "InteractionTracker.InteractionStarted",
            trace_id = format!("{}", root.trace_id()),
            event_type = data.event_type.as_str()
        );
        Zone::tracing(Arc::new(OnPageInteraction::new(root, data)))
    }

    fn schedule_reset(&self, timers: &dyn Timers, interaction: Arc<OnPageInteraction>) {
        let marker = Arc::downgrade(&self.current_interaction);
        // The reset timer is not part of the interaction.
        let _root = Zone::root().attach();
        timers.set_timeout(
            self.config.reset_delay,
            Box::new(move || {
                if let Some(marker) = marker.upgrade() {
                    if let Ok(mut current) = marker.lock() {
                        *current = None;
                    }
                }
                let _root = Zone::root().attach();
                interaction.close_window();
            }),
        );
    }
}

impl<S: TaskScheduler> TaskScheduler for InteractionTracker<S> {
    fn schedule_task(&self, task: &mut Task) {
        let current = Zone::current();
        if let Some(interaction) = current.interaction() {
            if task.counts_towards_interaction() {
                interaction.increment_pending();
                task.set_counted(true);
            }
            if let Some(TaskTarget::Xhr(xhr)) = task.target() {
                self.xhr_spans.start(
                    &current,
                    xhr,
                    &self.page.href(),
                    self.config.trace_header_origins(),
                );
            }
            task.set_zone(current);
        }
        self.inner.schedule_task(task)
    }

    fn run_task(&self, task: &mut Task) {
        let zone = self.zone_for_run(task);
        if zone.is_tracing() && task.zone() != Some(&zone) {
            task.set_zone(zone.clone());
        }

        let counted = if task.is_counted() {
            task.set_counted(false);
            task.zone().and_then(|zone| zone.interaction().cloned())
        } else {
            None
        };
        let _scope = RunScope::enter(zone.interaction().cloned(), counted);

        let _guard = zone.attach();
        if let Some(TaskTarget::Xhr(xhr)) = task.target() {
            self.xhr_spans.complete(xhr);
        }
        self.inner.run_task(task)
    }

    fn cancel_task(&self, task: &mut Task) {
        let zone = match task.zone() {
            Some(zone) if zone.is_tracing() => zone.clone(),
            _ => Zone::root(),
        };
        let counted = if task.is_counted() {
            task.set_counted(false);
            zone.interaction().cloned()
        } else {
            None
        };
        let _scope = RunScope::cancel(counted);

        let _guard = zone.attach();
        self.inner.cancel_task(task);
        if let Some(TaskTarget::Xhr(xhr)) = task.target() {
            self.xhr_spans.cancel(xhr);
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for InteractionTracker<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionTracker")
            .field("inner", &self.inner)
            .field("tracer", &self.tracer)
            .field("page", &self.page)
            .field("config", &self.config)
            .field("trace_flags", &self.trace_flags)
            .finish()
    }
}

/// Releases a task's pending-count contribution and finalizes the
/// interactions involved once the task is done, even if it panicked.
///
/// Declared before the zone guard so that it drops after it.
struct RunScope {
    running: Option<Arc<OnPageInteraction>>,
    counted: Option<Arc<OnPageInteraction>>,
}

impl RunScope {
    fn enter(
        running: Option<Arc<OnPageInteraction>>,
        counted: Option<Arc<OnPageInteraction>>,
    ) -> Self {
        if let Some(interaction) = &running {
            interaction.enter_task();
        }
        RunScope { running, counted }
    }

    fn cancel(counted: Option<Arc<OnPageInteraction>>) -> Self {
        RunScope {
            running: None,
            counted,
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if let Some(interaction) = &self.counted {
            interaction.decrement_pending();
        }
        if let Some(interaction) = &self.running {
            interaction.exit_task();
        }

        // Exporters reacting to the end of the root span schedule their own
        // work, which must not be counted against any interaction.
        let _root = Zone::root().attach();
        match (&self.running, &self.counted) {
            (Some(running), Some(counted)) if Arc::ptr_eq(running, counted) => {
                running.finalize();
            }
            (running, counted) => {
                for interaction in running.iter().chain(counted.iter()) {
                    interaction.finalize();
                }
            }
        }
    }
}

/// Builder for [`InteractionTracker`].
pub struct InteractionTrackerBuilder<S> {
    inner: S,
    timers: Weak<dyn Timers>,
    page: Arc<dyn Page>,
    tracer: Option<Tracer>,
    classifier: Option<InteractionClassifier>,
    config: TrackerConfig,
    trace_flags: TraceFlags,
}

impl<S> InteractionTrackerBuilder<S> {
    /// Tracer for the interactions' spans. Defaults to the global tracer.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
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

    /// Tracker configuration.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sampling options given to every interaction's root span, normally
    /// those of the initial page load. Defaults to sampled.
    pub fn with_trace_flags(mut self, trace_flags: TraceFlags) -> Self {
        self.trace_flags = trace_flags;
        self
    }

    /// Builds the tracker.
    pub fn build(self) -> InteractionTracker<S> {
        InteractionTracker {
            inner: self.inner,
            tracer: self.tracer.unwrap_or_else(global::tracer),
            timers: self.timers,
            page: self.page,
            classifier: self.classifier.unwrap_or_else(|| Box::new(is_click)),
            config: self.config,
            trace_flags: self.trace_flags,
            current_interaction: Arc::new(Mutex::new(None)),
            xhr_spans: XhrSpans::default(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for InteractionTrackerBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionTrackerBuilder")
            .field("inner", &self.inner)
            .field("page", &self.page)
            .field("tracer", &self.tracer)
            .field("config", &self.config)
            .field("trace_flags", &self.trace_flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use crate::scheduler::DirectScheduler;
    use crate::task::Element;
    use webtrace::runtime::Clock;
    use webtrace::testing::{InMemoryExporter, ManualTimers};
    use webtrace::AttributeValue;

    struct Fixture {
        tracker: InteractionTracker<DirectScheduler>,
        timers: Arc<ManualTimers>,
        exporter: InMemoryExporter,
    }

    fn fixture() -> Fixture {
        let timers = ManualTimers::new();
        let exporter = InMemoryExporter::default();
        let tracer = Tracer::builder()
            .with_exporter(Arc::new(exporter.clone()))
            .with_clock(timers.clone())
            .build();
        let tracker = InteractionTracker::builder(
            DirectScheduler,
            timers.clone(),
            Arc::new(StaticPage::new("http://localhost:4200/home", "test-agent")),
        )
        .with_tracer(tracer)
        .build();
        Fixture {
            tracker,
            timers,
            exporter,
        }
    }

    fn click(target: Element, callback: impl FnMut() + Send + 'static) -> Task {
        Task::event_task("click", TaskTarget::Element(target), callback)
    }

    #[test]
    fn click_without_async_work_finalizes_when_window_closes() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();
        let clicked_at = timers.now();
        let mut task = click(Element::new("button"), || {
            assert!(Zone::current().is_tracing());
        });

        tracker.schedule_task(&mut task);
        tracker.run_task(&mut task);
        assert!(exporter.get_finished_roots().unwrap().is_empty());

        timers.advance(DEFAULT_RESET_DELAY);
        let roots = exporter.get_finished_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].span.end_time, Some(clicked_at));
        assert_eq!(roots[0].span.name, "click");
        assert_eq!(
            roots[0].span.attributes.get("TargetElement"),
            Some(&AttributeValue::from("BUTTON"))
        );
        assert_eq!(
            roots[0].span.attributes.get("http.path"),
            Some(&AttributeValue::from("/home"))
        );
        assert!(!Zone::current().is_tracing());
    }

    #[test]
    fn scheduled_work_keeps_interaction_open() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();
        let tracker = Arc::new(tracker);

        let queued = Arc::new(Mutex::new(None));
        let (inner_tracker, slot) = (tracker.clone(), queued.clone());
        let mut task = click(Element::new("button"), move || {
            let mut timeout = Task::macro_task("setTimeout", || {});
            inner_tracker.schedule_task(&mut timeout);
            *slot.lock().unwrap() = Some(timeout);
        });
        tracker.run_task(&mut task);

        assert!(exporter.get_finished_roots().unwrap().is_empty());
        let mut timeout = queued.lock().unwrap().take().unwrap();
        let zone = timeout.zone().cloned().unwrap();
        assert_eq!(zone.interaction().unwrap().pending_tasks(), 1);

        timers.advance(DEFAULT_RESET_DELAY);
        assert!(exporter.get_finished_roots().unwrap().is_empty());
        tracker.run_task(&mut timeout);
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
        assert_eq!(
            exporter.get_finished_roots().unwrap()[0].trace_id(),
            zone.trace_id().unwrap()
        );
    }

    #[test]
    fn cancelled_work_releases_pending_count() {
        let Fixture {
            tracker, exporter, ..
        } = fixture();
        let interaction = {
            let root = tracker.tracer().start_root_span("click", None);
            Arc::new(OnPageInteraction::new(root, InteractionData::default()))
        };

        let mut timeout = Task::macro_task("setTimeout", || {});
        {
            let _guard = Zone::tracing(interaction.clone()).attach();
            tracker.schedule_task(&mut timeout);
        }
        assert_eq!(interaction.pending_tasks(), 1);

        tracker.cancel_task(&mut timeout);
        assert_eq!(interaction.pending_tasks(), 0);
        assert!(interaction.is_finalized());
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
    }

    #[test]
    fn periodic_and_event_tasks_are_not_counted() {
        let Fixture { tracker, .. } = fixture();
        let interaction = {
            let root = tracker.tracer().start_root_span("click", None);
            Arc::new(OnPageInteraction::new(root, InteractionData::default()))
        };
        let _guard = Zone::tracing(interaction.clone()).attach();

        let mut interval = Task::macro_task("setInterval", || {}).periodic();
        let mut listener = click(Element::new("a"), || {});
        tracker.schedule_task(&mut interval);
        tracker.schedule_task(&mut listener);

        assert_eq!(interaction.pending_tasks(), 0);
        assert!(interval.zone().is_some_and(Zone::is_tracing));
    }

    #[test]
    fn clicks_within_reset_delay_merge() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();

        let mut first = click(Element::new("button"), || {});
        let mut second = click(Element::new("button"), || {});
        tracker.run_task(&mut first);
        timers.advance(Duration::from_millis(10));
        tracker.run_task(&mut second);
        assert_eq!(first.zone(), second.zone());
        assert!(!second.zone().and_then(Zone::interaction).unwrap().is_finalized());

        timers.advance(DEFAULT_RESET_DELAY);
        assert!(tracker.current_interaction().is_none());
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
        let mut third = click(Element::new("button"), || {});
        tracker.run_task(&mut third);
        timers.advance(DEFAULT_RESET_DELAY);

        let roots = exporter.get_finished_roots().unwrap();
        assert_eq!(roots.len(), 2);
        assert_ne!(roots[0].trace_id(), roots[1].trace_id());
    }

    #[test]
    fn nested_click_stays_in_parent_zone() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();
        let tracker = Arc::new(tracker);
        let inner_tracker = tracker.clone();
        let mut outer = click(Element::new("div"), move || {
            let parent = Zone::current();
            let mut nested = click(Element::new("button"), move || {
                assert_eq!(Zone::current(), parent);
            });
            inner_tracker.run_task(&mut nested);
        });

        tracker.run_task(&mut outer);
        timers.advance(DEFAULT_RESET_DELAY);
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
    }

    #[test]
    fn interaction_name_overrides_event_name() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();
        let mut task = click(
            Element::new("button").with_interaction_name("save cart"),
            || {},
        );
        tracker.run_task(&mut task);
        timers.advance(DEFAULT_RESET_DELAY);

        let roots = exporter.get_finished_roots().unwrap();
        assert_eq!(roots[0].span.name, "save cart");
        assert_eq!(
            roots[0].span.attributes.get("EventType"),
            Some(&AttributeValue::from("click"))
        );
    }

    #[test]
    fn custom_classifier() {
        let timers = ManualTimers::new();
        let exporter = InMemoryExporter::default();
        let tracker = InteractionTracker::builder(
            DirectScheduler,
            timers.clone(),
            Arc::new(StaticPage::default()),
        )
        .with_tracer(
            Tracer::builder()
                .with_exporter(Arc::new(exporter.clone()))
                .with_clock(timers.clone())
                .build(),
        )
        .with_classifier(|task| task.event_name() == Some("submit"))
        .build();

        let mut click_task = click(Element::new("button"), || {});
        tracker.run_task(&mut click_task);
        assert!(exporter.get_finished_roots().unwrap().is_empty());

        let mut submit = Task::event_task("submit", TaskTarget::Element(Element::new("form")), || {});
        tracker.run_task(&mut submit);
        timers.advance(DEFAULT_RESET_DELAY);
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
    }

    #[test]
    fn panicking_task_restores_zone_and_finalizes() {
        let Fixture {
            tracker,
            timers,
            exporter,
        } = fixture();
        let mut task = click(Element::new("button"), || panic!("handler failed"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracker.run_task(&mut task)
        }));

        assert!(result.is_err());
        assert!(!Zone::current().is_tracing());
        timers.advance(DEFAULT_RESET_DELAY);
        assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
    }
}
