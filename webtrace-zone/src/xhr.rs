//! Child spans for HTTP requests made inside an interaction.
use crate::task::Xhr;
use crate::zone::Zone;
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;
use webtrace::propagation::TraceContextPropagator;
use webtrace::trace::attribute_keys::{ATTRIBUTE_HTTP_METHOD, ATTRIBUTE_HTTP_STATUS_CODE};
use webtrace::trace::{CanonicalCode, Span, SpanKind};
use webtrace::wt_debug;
use webtrace_http::HeaderInjector;

/// Open request spans, keyed by request id.
#[derive(Debug, Default)]
pub(crate) struct XhrSpans {
    spans: Mutex<HashMap<u64, Span>>,
    propagator: TraceContextPropagator,
}

impl XhrSpans {
    /// Starts a client span for `xhr` under the zone's root span and, for
    /// same-origin or allow-listed targets, sets `traceparent` on it.
    pub(crate) fn start(&self, zone: &Zone, xhr: &Xhr, page_href: &str, allowed_origins: &[String]) {
        let Some(root) = zone.root_span() else {
            return;
        };
        let raw_url = xhr.url();
        let resolved = resolve(page_href, &raw_url);
        let name = resolved
            .as_ref()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| raw_url.clone());

        let span = root.start_child_span(name, SpanKind::Client);

        if let Some(target) = &resolved {
            if should_propagate(page_href, target, allowed_origins) {
                xhr.with_request_headers(|headers| {
                    self.propagator
                        .inject(span.span_context(), &mut HeaderInjector(headers))
                });
            } else {
                wt_debug!(
                    name: "XhrSpans.HeaderSkipped",
                    origin = target.origin().ascii_serialization()
                );
            }
        }

        if let Ok(mut spans) = self.spans.lock() {
            spans.insert(xhr.id(), span);
        }
    }

    /// Ends the span of a completed request.
    pub(crate) fn complete(&self, xhr: &Xhr) {
        let Some(span) = self.take(xhr) else {
            return;
        };
        span.add_attribute(ATTRIBUTE_HTTP_STATUS_CODE, xhr.status().to_string());
        span.add_attribute(ATTRIBUTE_HTTP_METHOD, xhr.method().to_string());
        span.end();
    }

    /// Ends the span of an aborted request.
    pub(crate) fn cancel(&self, xhr: &Xhr) {
        if let Some(span) = self.take(xhr) {
            span.add_attribute(ATTRIBUTE_HTTP_METHOD, xhr.method().to_string());
            span.set_status(CanonicalCode::Cancelled, Some("request aborted"));
            span.end();
        }
    }

    fn take(&self, xhr: &Xhr) -> Option<Span> {
        self.spans.lock().ok()?.remove(&xhr.id())
    }
}

fn resolve(page_href: &str, url: &str) -> Option<Url> {
    match Url::parse(page_href) {
        Ok(base) => base.join(url).ok(),
        Err(_) => Url::parse(url).ok(),
    }
}

fn should_propagate(page_href: &str, target: &Url, allowed_origins: &[String]) -> bool {
    let origin = target.origin();
    if !origin.is_tuple() {
        return false;
    }
    if Url::parse(page_href).is_ok_and(|page| page.origin() == origin) {
        return true;
    }
    let serialized = origin.ascii_serialization();
    allowed_origins
        .iter()
        .any(|allowed| allowed.trim_end_matches('/') == serialized)
}
