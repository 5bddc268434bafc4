//! Process-wide tracer.
//!
//! Instrumentation that has no tracer handed to it (the scheduler hooks,
//! for instance) reads the process-wide tracer from here. Applications
//! configure it once at startup with [`set_tracer`]; until then a default
//! tracer with no exporters is used.
//!
//! ```
//! use webtrace::global;
//! use webtrace::trace::Tracer;
//!
//! global::set_tracer(Tracer::builder().with_sample_rate(1.0).build());
//!
//! let root = global::tracer().start_root_span("click", None);
//! root.end();
//! ```
mod internal_logging;

use crate::trace::Tracer;
use std::sync::{OnceLock, RwLock};

/// The current global `Tracer`.
static GLOBAL_TRACER: OnceLock<RwLock<Tracer>> = OnceLock::new();

#[inline]
fn global_tracer() -> &'static RwLock<Tracer> {
    GLOBAL_TRACER.get_or_init(|| RwLock::new(Tracer::default()))
}

/// Sets the given [`Tracer`] as the process-wide tracer.
pub fn set_tracer(tracer: Tracer) {
    let _lock = global_tracer()
        .write()
        .map(|mut global| *global = tracer);
}

/// A handle to the process-wide [`Tracer`].
pub fn tracer() -> Tracer {
    global_tracer()
        .read()
        .map(|tracer| tracer.clone())
        .unwrap_or_default()
}
