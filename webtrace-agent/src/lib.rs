//! # webtrace agent exporter
//!
//! Buffers finished traces and posts them to a collector agent's HTTP/JSON
//! trace endpoint, typically `http://<agent>/v1/trace`.
//!
//! Each request carries a `node` describing the sender (host name, service
//! name, exporter version and extra attributes) and the `spans` of every
//! buffered trace, root span first. Trace and span ids travel base64
//! encoded, timestamps as ISO-8601 with millisecond precision.
//!
//! Sending never blocks the host: requests are handed to a [`Transport`],
//! by default a [`DedicatedThreadTransport`] driving a blocking `reqwest`
//! client. Failed requests are logged and dropped.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use webtrace::trace::Tracer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = webtrace_agent::AgentExporter::builder()
//!         .with_agent_endpoint("http://localhost:55678/v1/trace")
//!         .with_service_name("shop-frontend")
//!         .with_buffer_size(10)
//!         .with_buffer_timeout(Duration::from_secs(2))
//!         .build()?;
//!
//!     let tracer = Tracer::builder().with_exporter(Arc::new(exporter)).build();
//!     tracer.start_root_span("click", None).end();
//!
//!     Ok(())
//! }
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

#[macro_use]
extern crate typed_builder;

mod exporter;

pub use exporter::{
    uploader::{DedicatedThreadTransport, Transport},
    AgentExporter, AgentExporterBuilder, Error,
};
