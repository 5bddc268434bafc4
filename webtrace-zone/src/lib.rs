//! Ambient zone propagation and interaction tracking for event-driven hosts.
//!
//! A single-threaded host runs everything as tasks: timers, promise
//! continuations, event listeners, network callbacks. This crate hooks into
//! the three points where the host hands a task to its scheduler
//! (schedule, run, cancel) and uses them to:
//!
//! * carry an implicit [`Zone`] from the code that queued a task to the
//!   task itself, however deeply tasks nest,
//! * start a new traced interaction when the user acts (a click, by
//!   default), with its own trace id and root span,
//! * count the interaction's pending tasks and end its root span exactly
//!   once, when the last of them is done,
//! * add a client span and a `traceparent` header to requests made during
//!   an interaction.
//!
//! # Getting started
//!
//! ```
//! # #[cfg(feature = "testing")]
//! # {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use webtrace::testing::InMemoryExporter;
//! use webtrace::trace::Tracer;
//! use webtrace_zone::testing::{FakeEventLoop, StaticPage};
//! use webtrace_zone::{DirectScheduler, Element, InteractionTracker};
//!
//! let event_loop = FakeEventLoop::new();
//! let exporter = Arc::new(InMemoryExporter::default());
//! let tracer = Tracer::builder()
//!     .with_clock(event_loop.clone())
//!     .with_exporter(exporter.clone())
//!     .build();
//!
//! let tracker = InteractionTracker::builder(
//!     DirectScheduler,
//!     event_loop.clone(),
//!     Arc::new(StaticPage::new("https://shop.example/cart", "doc-agent")),
//! )
//! .with_tracer(tracer)
//! .build();
//! event_loop.install_scheduler(Arc::new(tracker));
//!
//! let button = Element::new("button");
//! let inner_loop = event_loop.clone();
//! event_loop.add_event_listener(button.clone(), "click", move || {
//!     inner_loop.set_timeout(Duration::from_millis(100), || {});
//! });
//!
//! event_loop.dispatch_event(&button, "click");
//! event_loop.advance(Duration::from_millis(100));
//!
//! assert_eq!(exporter.get_finished_roots().unwrap().len(), 1);
//! # }
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

mod bootstrap;
mod error;
mod interaction;
mod page;
mod scheduler;
mod task;
mod tracker;
mod xhr;
mod zone;

#[cfg(feature = "agent")]
pub use bootstrap::AGENT_TRACE_PATH;
pub use bootstrap::{start_interaction_tracker, TrackerSetup, Tracking};
pub use error::TrackerError;
pub use interaction::{InteractionData, OnPageInteraction};
pub use page::{Page, StaticPage};
pub use scheduler::{DirectScheduler, TaskScheduler};
pub use task::{Element, ReadyState, Task, TaskCallback, TaskId, TaskKind, TaskTarget, Xhr};
pub use tracker::{
    is_click, InteractionClassifier, InteractionTracker, InteractionTrackerBuilder,
    TrackerConfig, DEFAULT_RESET_DELAY,
};
pub use zone::{Zone, ZoneGuard};

#[cfg(any(feature = "testing", test))]
pub mod testing;
