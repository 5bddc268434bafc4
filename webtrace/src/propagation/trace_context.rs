//! `traceparent` header formatting and parsing.
use crate::propagation::{Extractor, Injector};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use std::str::FromStr;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// Name of the header carrying the trace id, span id and sampling options.
pub const TRACEPARENT_HEADER: &str = "traceparent";
/// Name of the header carrying vendor trace state.
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Formats a span context as a `traceparent` value:
/// `00-<32 hex trace id>-<16 hex span id>-<2 hex options>`.
///
/// ```
/// use webtrace::propagation::trace_context::format_traceparent;
/// use webtrace::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
///
/// let cx = SpanContext::new(
///     TraceId::from(1),
///     SpanId::from(2),
///     TraceFlags::SAMPLED,
///     false,
///     TraceState::NONE,
/// );
/// assert_eq!(
///     format_traceparent(&cx),
///     "00-00000000000000000000000000000001-0000000000000002-01"
/// );
/// ```
pub fn format_traceparent(span_context: &SpanContext) -> String {
    format!(
        "{:02x}-{}-{}-{:02x}",
        SUPPORTED_VERSION,
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags() & TraceFlags::SAMPLED
    )
}

/// Parses a `traceparent` value. Returns `None` when the value is malformed
/// or carries an invalid (all-zero) id.
pub fn parse_traceparent(header_value: &str) -> Option<SpanContext> {
    let parts = header_value.trim().split_terminator('-').collect::<Vec<&str>>();
    if parts.len() < 4 {
        return None;
    }

    // Version 0 has exactly four fields.
    let version = u8::from_str_radix(parts[0], 16).ok()?;
    if version > MAX_VERSION || version == 0 && parts.len() != 4 {
        return None;
    }

    if parts[1].len() != 32 || parts[1].chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let trace_id = TraceId::from_hex(parts[1]).ok()?;

    if parts[2].len() != 16 || parts[2].chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let span_id = SpanId::from_hex(parts[2]).ok()?;

    let opts = u8::from_str_radix(parts[3], 16).ok()?;
    if version == 0 && opts > 2 {
        return None;
    }
    let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

    let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, TraceState::NONE);
    span_context.is_valid().then_some(span_context)
}

/// Writes and reads span contexts through `traceparent`/`tracestate` headers.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Sets `traceparent` on the carrier, plus `tracestate` when the context
    /// has any. Invalid contexts are skipped.
    pub fn inject(&self, span_context: &SpanContext, injector: &mut dyn Injector) {
        if !span_context.is_valid() {
            return;
        }
        injector.set(TRACEPARENT_HEADER, format_traceparent(span_context));
        if !span_context.trace_state().is_empty() {
            injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
        }
    }

    /// Reads a remote span context from the carrier.
    pub fn extract(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header = extractor.get(TRACEPARENT_HEADER)?;
        let parsed = parse_traceparent(&header)?;

        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .and_then(|state| TraceState::from_str(&state).ok())
            .unwrap_or_default();

        Some(SpanContext::new(
            parsed.trace_id(),
            parsed.span_id(),
            parsed.trace_flags(),
            true,
            trace_state,
        ))
    }
}
