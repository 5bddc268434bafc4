//! # Span context propagation
//!
//! Outgoing requests made on behalf of a traced interaction carry the
//! interaction's trace id in a `traceparent` header so that the server side
//! can join the same trace. The server may likewise hand the page its own
//! span context, which [`TraceContextPropagator::extract`] reads back.
//!
//! Carriers are abstracted by [`Injector`] and [`Extractor`].
use std::borrow::Cow;
use std::collections::HashMap;

pub mod trace_context;

pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an underlying carrier like `HashMap`
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying carrier like `HashMap`
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(&key.to_lowercase())
            .map(|v| Cow::Borrowed(v.as_str()))
    }
}
