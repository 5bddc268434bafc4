//! Page-wide sampling decision.
//!
//! The page makes exactly one sampling decision, for its initial load. The
//! resulting span context is stored here with
//! [`set_initial_load_span_context`] and every interaction on the page
//! inherits its sampling options.
use crate::trace::{SpanContext, TraceFlags};
use crate::wt_debug;
use rand::Rng;
use std::sync::OnceLock;

static INITIAL_LOAD_SPAN_CONTEXT: OnceLock<SpanContext> = OnceLock::new();

/// Returns `true` if bit 0 of the span context's sampling options is set.
pub fn is_sampled(span_context: &SpanContext) -> bool {
    span_context.trace_flags().is_sampled()
}

/// Draws uniformly from `[0, 1)` and returns [`TraceFlags::SAMPLED`] if the
/// draw is strictly below `sample_rate`, [`TraceFlags::NOT_SAMPLED`]
/// otherwise.
///
/// A rate of `1.0` always samples, a rate of `0.0` never does.
pub fn make_random_sampling_decision(sample_rate: f64) -> TraceFlags {
    make_random_sampling_decision_with(sample_rate, || rand::rng().random::<f64>())
}

/// Like [`make_random_sampling_decision`], with the uniform draw supplied by
/// the caller.
///
/// ```
/// use webtrace::sampling::make_random_sampling_decision_with;
///
/// assert!(make_random_sampling_decision_with(1.0, || 0.5).is_sampled());
/// assert!(!make_random_sampling_decision_with(0.5, || 0.7).is_sampled());
/// ```
pub fn make_random_sampling_decision_with<F>(sample_rate: f64, draw: F) -> TraceFlags
where
    F: FnOnce() -> f64,
{
    if draw() < sample_rate {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::NOT_SAMPLED
    }
}

/// Stores the span context of the page's initial load.
///
/// The decision is made once per page: only the first call has an effect and
/// it returns `false` when a context was already stored.
pub fn set_initial_load_span_context(span_context: SpanContext) -> bool {
    let stored = INITIAL_LOAD_SPAN_CONTEXT.set(span_context).is_ok();
    if !stored {
        wt_debug!(
            name: "Sampling.InitialLoadAlreadySet",
            message = "initial load span context is written once per page"
        );
    }
    stored
}

/// The span context stored by [`set_initial_load_span_context`], if any.
pub fn initial_load_span_context() -> Option<&'static SpanContext> {
    INITIAL_LOAD_SPAN_CONTEXT.get()
}

/// Returns `true` if the initial load was stored and sampled.
///
/// An unset initial load counts as not sampled.
pub fn is_initial_load_sampled() -> bool {
    initial_load_span_context().is_some_and(is_sampled)
}
