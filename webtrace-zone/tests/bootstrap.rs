use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::Method;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webtrace::testing::InMemoryExporter;
use webtrace::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState, Tracer};
use webtrace_agent::{AgentExporter, Transport};
use webtrace_http::{Bytes, Request};
use webtrace_zone::testing::{FakeEventLoop, StaticPage};
use webtrace_zone::{
    start_interaction_tracker, DirectScheduler, Element, TrackerError, TrackerSetup, Tracking,
};

#[derive(Debug, Default)]
struct RecordingTransport {
    requests: Mutex<Vec<Request<Bytes>>>,
}

impl RecordingTransport {
    fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| serde_json::from_slice(request.body()).unwrap())
            .collect()
    }

    fn uris(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.uri().to_string())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: Request<Bytes>) {
        self.requests.lock().unwrap().push(request);
    }
}

fn initial_load(trace_flags: TraceFlags) -> SpanContext {
    SpanContext::new(
        TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
        SpanId::from_hex("b7ad6b7169203331").unwrap(),
        trace_flags,
        true,
        TraceState::NONE,
    )
}

fn setup(event_loop: &Arc<FakeEventLoop>) -> TrackerSetup {
    TrackerSetup::new(
        event_loop.clone(),
        Arc::new(StaticPage::new(
            "https://shop.example/cart",
            "Mozilla/5.0 (test)",
        )),
    )
}

/// Installs `tracking` and registers a click listener that sends one
/// request answered after 950ms.
fn install_click_with_request(
    event_loop: &Arc<FakeEventLoop>,
    tracking: Tracking<DirectScheduler>,
) -> (Arc<Tracking<DirectScheduler>>, Element) {
    let tracking = Arc::new(tracking);
    event_loop.install_scheduler(tracking.clone());

    let button = Element::new("button");
    let inner_loop = event_loop.clone();
    event_loop.add_event_listener(button.clone(), "click", move || {
        inner_loop.send_xhr(
            Method::GET,
            "/api/cart",
            200,
            Duration::from_millis(950),
            || {},
        );
    });
    (tracking, button)
}

#[test]
fn unsampled_initial_load_leaves_the_scheduler_alone() {
    let event_loop = FakeEventLoop::new();
    let exporter = InMemoryExporter::default();
    let tracer = Tracer::builder()
        .with_clock(event_loop.clone())
        .with_exporter(Arc::new(exporter.clone()))
        .build();

    let tracking = start_interaction_tracker(
        DirectScheduler,
        setup(&event_loop)
            .with_tracer(tracer)
            .with_initial_load_span_context(initial_load(TraceFlags::NOT_SAMPLED)),
    );
    assert!(!tracking.is_tracked());
    assert!(matches!(
        tracking,
        Tracking::Untracked {
            reason: TrackerError::NotSampled,
            ..
        }
    ));

    let (_tracking, button) = install_click_with_request(&event_loop, tracking);
    event_loop.dispatch_event(&button, "click");
    event_loop.run_until_idle();

    assert!(exporter.get_finished_roots().unwrap().is_empty());
}

#[test]
fn missing_sampling_decision_means_untracked() {
    let event_loop = FakeEventLoop::new();
    let tracking = start_interaction_tracker(DirectScheduler, setup(&event_loop));
    assert!(tracking.tracker().is_none());
}

#[test]
fn no_agent_endpoint_tracks_without_exporting() {
    temp_env::with_var_unset("WEBTRACE_AGENT_ENDPOINT", || {
        let event_loop = FakeEventLoop::new();
        let tracking = start_interaction_tracker(
            DirectScheduler,
            setup(&event_loop)
                .with_tracer(Tracer::builder().with_clock(event_loop.clone()).build())
                .with_initial_load_span_context(initial_load(TraceFlags::SAMPLED)),
        );

        let tracker = tracking.tracker().unwrap();
        assert!(tracker.tracer().exporters().is_empty());
    });
}

#[test]
fn sampled_click_is_exported_to_the_agent() {
    let event_loop = FakeEventLoop::new();
    let transport = Arc::new(RecordingTransport::default());
    let tracking = start_interaction_tracker(
        DirectScheduler,
        setup(&event_loop)
            .with_tracer(Tracer::builder().with_clock(event_loop.clone()).build())
            .with_initial_load_span_context(initial_load(TraceFlags::SAMPLED))
            .with_agent_exporter(
                AgentExporter::builder()
                    .with_agent_endpoint("http://agent.example:55678/")
                    .with_service_name("shop-frontend")
                    .with_buffer_size(1)
                    .with_transport(transport.clone()),
            ),
    );
    assert!(tracking.is_tracked());
    let (_tracking, button) = install_click_with_request(&event_loop, tracking);

    event_loop.dispatch_event(&button, "click");
    event_loop.advance(Duration::from_millis(949));
    assert!(transport.bodies().is_empty());
    event_loop.advance(Duration::from_millis(1));

    assert_eq!(transport.uris(), vec!["http://agent.example:55678/v1/trace"]);
    let bodies = transport.bodies();
    let body = &bodies[0];
    assert_eq!(body["node"]["identifier"], json!({"hostName": "shop.example"}));
    assert_eq!(body["node"]["serviceInfo"], json!({"name": "shop-frontend"}));
    assert!(body["node"]["libraryInfo"]["exporterVersion"].is_string());

    let spans = body["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 2);
    let (root, request) = (&spans[0], &spans[1]);

    assert_eq!(root["traceId"], request["traceId"]);
    let raw_trace_id = STANDARD.decode(root["traceId"].as_str().unwrap()).unwrap();
    assert_eq!(raw_trace_id.len(), 16);
    assert_eq!(request["parentSpanId"], root["spanId"]);
    assert_eq!(root["parentSpanId"], "");

    assert_eq!(root["name"], json!({"value": "click"}));
    assert_eq!(root["startTime"], "2019-01-04T00:00:00.000Z");
    assert_eq!(root["endTime"], "2019-01-04T00:00:00.950Z");
    assert_eq!(
        root["attributes"]["attributeMap"]["EventType"],
        json!({"stringValue": {"value": "click"}})
    );
    assert_eq!(
        root["attributes"]["attributeMap"]["TargetElement"],
        json!({"stringValue": {"value": "BUTTON"}})
    );

    assert_eq!(request["name"], json!({"value": "/api/cart"}));
    assert_eq!(request["kind"], 2);
    assert_eq!(request["endTime"], "2019-01-04T00:00:00.950Z");
    assert_eq!(
        request["attributes"]["attributeMap"]["http.status_code"],
        json!({"stringValue": {"value": "200"}})
    );
}

#[test]
fn buffered_trace_is_sent_after_the_buffer_timeout() {
    let event_loop = FakeEventLoop::new();
    let transport = Arc::new(RecordingTransport::default());
    let tracking = start_interaction_tracker(
        DirectScheduler,
        setup(&event_loop)
            .with_tracer(Tracer::builder().with_clock(event_loop.clone()).build())
            .with_initial_load_span_context(initial_load(TraceFlags::SAMPLED))
            .with_agent_exporter(
                AgentExporter::builder()
                    .with_agent_endpoint("http://agent.example:55678")
                    .with_buffer_size(2)
                    .with_buffer_timeout(Duration::from_millis(100))
                    .with_transport(transport.clone()),
            ),
    );
    let (_tracking, button) = install_click_with_request(&event_loop, tracking);

    event_loop.dispatch_event(&button, "click");
    event_loop.advance(Duration::from_millis(950));
    assert!(transport.bodies().is_empty());

    // the flush timer is host work outside any interaction
    assert_eq!(event_loop.pending_tasks(), 1);
    event_loop.advance(Duration::from_millis(100));

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["spans"].as_array().unwrap().len(), 2);
    assert_eq!(event_loop.pending_tasks(), 0);
}
