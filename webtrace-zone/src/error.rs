use thiserror::Error;

/// Reasons the interaction tracker was not started.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackerError {
    /// The initial page load was not sampled, or no decision was stored.
    /// Interactions inherit that decision, so none of them are traced.
    #[error("initial page load is not sampled, interactions are not traced")]
    NotSampled,
}
