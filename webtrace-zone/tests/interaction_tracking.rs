use http::Method;
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use webtrace::testing::{InMemoryExporter, VIRTUAL_EPOCH};
use webtrace::trace::{RootSpanData, SpanKind, TraceId, Tracer};
use webtrace::AttributeValue;
use webtrace_zone::testing::{FakeEventLoop, StaticPage};
use webtrace_zone::{DirectScheduler, Element, InteractionTracker, TrackerConfig, Xhr, Zone};

const PAGE: &str = "https://shop.example/cart";

struct Harness {
    event_loop: Arc<FakeEventLoop>,
    exporter: InMemoryExporter,
    tracker: Arc<InteractionTracker<DirectScheduler>>,
}

fn harness(config: TrackerConfig) -> Harness {
    let event_loop = FakeEventLoop::new();
    let exporter = InMemoryExporter::default();
    let tracer = Tracer::builder()
        .with_clock(event_loop.clone())
        .with_exporter(Arc::new(exporter.clone()))
        .build();
    let tracker = Arc::new(
        InteractionTracker::builder(
            DirectScheduler,
            event_loop.clone(),
            Arc::new(StaticPage::new(PAGE, "Mozilla/5.0 (test)")),
        )
        .with_tracer(tracer)
        .with_config(config)
        .build(),
    );
    event_loop.install_scheduler(tracker.clone());
    Harness {
        event_loop,
        exporter,
        tracker,
    }
}

fn at(ms: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + VIRTUAL_EPOCH + Duration::from_millis(ms)
}

fn attribute<'a>(root: &'a RootSpanData, key: &str) -> Option<&'a AttributeValue> {
    root.span.attributes.get(key)
}

#[test]
fn click_with_request_ends_when_the_response_arrives() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    let sent: Arc<Mutex<Option<Xhr>>> = Arc::new(Mutex::new(None));

    let (event_loop, slot) = (h.event_loop.clone(), sent.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        let xhr = event_loop.send_xhr(
            Method::GET,
            "/api/cart",
            200,
            Duration::from_millis(950),
            || {},
        );
        *slot.lock().unwrap() = Some(xhr);
    });

    h.event_loop.dispatch_event(&button, "click");
    let interaction = h.tracker.current_interaction().unwrap();
    assert_eq!(interaction.interaction().unwrap().pending_tasks(), 1);

    h.event_loop.advance(Duration::from_millis(949));
    assert!(h.exporter.get_finished_roots().unwrap().is_empty());

    h.event_loop.advance(Duration::from_millis(1));
    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    let root = &roots[0];

    assert_eq!(root.span.name, "click");
    assert_eq!(root.span.start_time, at(0));
    assert_eq!(root.span.end_time, Some(at(950)));
    assert_eq!(attribute(root, "EventType"), Some(&"click".into()));
    assert_eq!(attribute(root, "TargetElement"), Some(&"BUTTON".into()));
    assert_eq!(attribute(root, "http.url"), Some(&PAGE.into()));
    assert_eq!(attribute(root, "http.path"), Some(&"/cart".into()));
    assert_eq!(
        attribute(root, "http.user_agent"),
        Some(&"Mozilla/5.0 (test)".into())
    );

    assert_eq!(root.spans.len(), 1);
    let request = &root.spans[0];
    assert_eq!(request.name, "/api/cart");
    assert_eq!(request.span_kind, SpanKind::Client);
    assert_eq!(request.span_context.trace_id(), root.trace_id());
    assert_eq!(request.parent_span_id, root.span.span_context.span_id());
    assert_eq!(request.end_time, Some(at(950)));
    assert_eq!(
        request.attributes.get("http.status_code"),
        Some(&"200".into())
    );
    assert_eq!(request.attributes.get("http.method"), Some(&"GET".into()));

    let xhr = sent.lock().unwrap().take().unwrap();
    assert_eq!(
        xhr.request_headers()["traceparent"],
        format!(
            "00-{:032x}-{:016x}-01",
            root.trace_id(),
            request.span_context.span_id()
        )
        .as_str()
    );
}

#[rstest]
#[case::same_origin("/api/cart", &[], true)]
#[case::absolute_same_origin("https://shop.example/api/cart", &[], true)]
#[case::other_origin("https://api.other.example/cart", &[], false)]
#[case::allow_listed("https://api.other.example/cart", &["https://api.other.example/"], true)]
fn traceparent_only_reaches_trusted_origins(
    #[case] url: &'static str,
    #[case] origins: &[&str],
    #[case] propagated: bool,
) {
    let h = harness(TrackerConfig::default().with_trace_header_origins(origins.to_vec()));
    let button = Element::new("button");
    let sent: Arc<Mutex<Option<Xhr>>> = Arc::new(Mutex::new(None));

    let (event_loop, slot) = (h.event_loop.clone(), sent.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        let xhr = event_loop.send_xhr(Method::POST, url, 201, Duration::from_millis(20), || {});
        *slot.lock().unwrap() = Some(xhr);
    });
    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.run_until_idle();

    let xhr = sent.lock().unwrap().take().unwrap();
    assert_eq!(
        xhr.request_headers().contains_key("traceparent"),
        propagated
    );
    // the request span is recorded either way
    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].spans.len(), 1);
}

#[test]
fn clicks_within_the_reset_delay_share_one_trace() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");

    let event_loop = h.event_loop.clone();
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        event_loop.set_timeout(Duration::from_millis(100), || {});
    });

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(10));
    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(190));

    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].span.end_time, Some(at(110)));

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.run_until_idle();

    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 2);
    assert_ne!(roots[0].trace_id(), roots[1].trace_id());
}

#[test]
fn second_click_after_idle_first_click_keeps_its_request() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    let clicks = Arc::new(AtomicUsize::new(0));

    let (event_loop, count) = (h.event_loop.clone(), clicks.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        if count.fetch_add(1, Ordering::SeqCst) == 1 {
            event_loop.send_xhr(
                Method::GET,
                "/api/second",
                200,
                Duration::from_millis(100),
                || {},
            );
        }
    });

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(10));
    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.run_until_idle();

    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    let root = &roots[0];
    assert_eq!(root.span.start_time, at(0));
    assert_eq!(root.span.end_time, Some(at(110)));
    assert_eq!(root.spans.len(), 1);
    assert_eq!(root.spans[0].name, "/api/second");
    assert_eq!(root.spans[0].span_context.trace_id(), root.trace_id());
}

#[test]
fn idle_clicks_in_one_window_end_when_the_first_went_idle() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    h.event_loop.add_event_listener(button.clone(), "click", || {});

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(10));
    h.event_loop.dispatch_event(&button, "click");
    assert!(h.exporter.get_finished_roots().unwrap().is_empty());

    h.event_loop.run_until_idle();
    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].span.end_time, Some(at(0)));
    assert!(h.tracker.current_interaction().is_none());
}

#[test]
fn nested_async_work_stays_in_the_interaction() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    let seen: Arc<Mutex<Vec<Option<TraceId>>>> = Arc::new(Mutex::new(Vec::new()));

    let (event_loop, record) = (h.event_loop.clone(), seen.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        let (event_loop, record) = (event_loop.clone(), record.clone());
        event_loop.clone().queue_microtask(move || {
            record.lock().unwrap().push(Zone::current().trace_id());
            let (event_loop, record) = (event_loop.clone(), record.clone());
            event_loop.clone().set_timeout(Duration::from_millis(30), move || {
                record.lock().unwrap().push(Zone::current().trace_id());
                let record = record.clone();
                event_loop.set_timeout(Duration::from_millis(20), move || {
                    record.lock().unwrap().push(Zone::current().trace_id());
                });
            });
        });
    });

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.run_until_idle();

    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].span.end_time, Some(at(50)));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|id| *id == Some(roots[0].trace_id())));
    assert!(!Zone::current().is_tracing());
}

#[test]
fn intervals_run_in_the_zone_without_holding_it_open() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    let ticks: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

    let (event_loop, record) = (h.event_loop.clone(), ticks.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        let record = record.clone();
        event_loop.set_interval(Duration::from_millis(10), move || {
            record.lock().unwrap().push(Zone::current().is_tracing());
        });
    });

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(30));
    assert_eq!(*ticks.lock().unwrap(), vec![true, true, true]);
    assert!(h.exporter.get_finished_roots().unwrap().is_empty());

    // the interaction went idle when the handler returned
    h.event_loop.advance(Duration::from_millis(20));
    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].span.end_time, Some(at(0)));

    h.event_loop.advance(Duration::from_millis(30));
    assert_eq!(ticks.lock().unwrap().len(), 8);
    assert!(ticks.lock().unwrap().iter().all(|tracing| *tracing));
    assert_eq!(h.exporter.get_finished_roots().unwrap().len(), 1);
}

#[test]
fn cleared_timeout_releases_the_interaction() {
    let h = harness(TrackerConfig::default());
    let button = Element::new("button");
    let fired = Arc::new(Mutex::new(false));

    let (event_loop, flag) = (h.event_loop.clone(), fired.clone());
    h.event_loop.add_event_listener(button.clone(), "click", move || {
        let flag = flag.clone();
        let id = event_loop.set_timeout(Duration::from_millis(500), move || {
            *flag.lock().unwrap() = true;
        });
        event_loop.clear(id);
    });

    h.event_loop.dispatch_event(&button, "click");
    h.event_loop.advance(Duration::from_millis(500));

    assert!(!*fired.lock().unwrap());
    let roots = h.exporter.get_finished_roots().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].span.end_time, Some(at(0)));
}

#[test]
fn work_outside_interactions_is_not_traced() {
    let h = harness(TrackerConfig::default());
    let zones: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

    let record = zones.clone();
    h.event_loop.set_timeout(Duration::from_millis(5), move || {
        record.lock().unwrap().push(Zone::current().is_tracing());
    });
    let other = Element::new("input");
    let record = zones.clone();
    h.event_loop.add_event_listener(other.clone(), "keydown", move || {
        record.lock().unwrap().push(Zone::current().is_tracing());
    });

    h.event_loop.dispatch_event(&other, "keydown");
    h.event_loop.run_until_idle();

    assert_eq!(*zones.lock().unwrap(), vec![false, false]);
    assert!(h.exporter.get_finished_roots().unwrap().is_empty());
    assert!(h.tracker.current_interaction().is_none());
}
