use serde::Serialize;

/// Failures reported by the geolocation capability.
///
/// These are delivered as values on the watch stream, never raised as faults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no location fix within the configured window")]
    FixTimeout,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("location watch closed by the platform")]
    WatchClosed,
}

impl LocationError {
    /// Transient errors are retried while the user still wants to share.
    pub fn is_transient(&self) -> bool {
        matches!(self, LocationError::FixTimeout)
    }
}

/// A single location write rejected by the store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("write timed out")]
    Timeout,
}

/// Snapshot reads from the store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a publish cycle in which at least one write failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{failed} of {attempted} location writes failed ({consecutive_failures} consecutive): {source}")]
pub struct PublishError {
    pub failed: usize,
    pub attempted: usize,
    pub consecutive_failures: u32,
    pub source: WriteError,
}
