//! Span model, tracer and sampling primitives for tracing user interactions.
//!
//! `webtrace` is the core crate of a client-side tracing layer for
//! single-threaded, event-driven hosts. It provides:
//!
//! * the span model ([`trace::SpanContext`], [`trace::Span`], [`trace::RootSpan`]),
//! * the [`trace::Tracer`], which creates root spans and fans finished traces out
//!   to registered [`trace::SpanExporter`]s,
//! * the page-wide [`sampling`] decision store,
//! * `traceparent` header formatting in [`propagation`],
//! * the [`runtime::Clock`] and [`runtime::Timers`] abstractions the rest of the
//!   workspace uses to talk to the host event loop.
//!
//! Instrumentation of the host scheduler lives in `webtrace-zone` and the
//! collector exporter in `webtrace-agent`.
//!
//! # Getting started
//!
//! ```
//! use webtrace::trace::{SpanKind, Tracer};
//!
//! let tracer = Tracer::builder().build();
//! let root = tracer.start_root_span("click", None);
//!
//! let child = root.start_child_span("/api/items", SpanKind::Client);
//! child.add_attribute("http.method", "GET");
//! child.end();
//!
//! root.end();
//! assert!(root.is_ended());
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]
#![cfg_attr(test, deny(warnings))]

pub mod global;

mod common;

pub use common::{AttributeValue, Attributes, ExportError};

pub mod propagation;

pub mod runtime;

pub mod sampling;

pub mod trace;

#[cfg(any(feature = "testing", test))]
#[doc(hidden)]
pub mod testing;

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, info, warn};
}
