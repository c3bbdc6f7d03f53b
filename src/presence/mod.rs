//! Presence: reconciling "I want to be discoverable" with actual device state.
//!
//! [`PresenceMachine`] is the pure transition table. [`PresenceController`]
//! is the actor that owns the machine, the geolocation source and the
//! publisher, and serializes every input through one event queue.

mod controller;
mod machine;

pub use controller::{PresenceController, PresenceHandle};
pub use machine::{Effect, PresenceInput, PresenceMachine};

use crate::error::LocationError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What the user asked for, independent of whether it has been fulfilled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PresenceIntent {
    pub desired: bool,
}

/// Derived presence of one user session. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PresenceState {
    #[default]
    Off,
    AwaitingFix,
    Active,
    Error(LocationError),
}

impl PresenceState {
    /// The externally observed "ready" flag.
    pub fn is_ready(&self) -> bool {
        matches!(self, PresenceState::Active)
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Off => write!(f, "off"),
            PresenceState::AwaitingFix => write!(f, "awaiting_fix"),
            PresenceState::Active => write!(f, "active"),
            PresenceState::Error(reason) => write!(f, "error({})", reason),
        }
    }
}

/// Snapshot published to the UI layer after every transition.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PresenceStatus {
    pub state: PresenceState,
    /// True only in `Active`
    pub ready: bool,
    pub intent: PresenceIntent,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_published_at: Option<DateTime<Utc>>,
}

/// Out-of-band signals for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceNotice {
    /// Sharing stopped because of a location error
    Error { reason: LocationError },
    /// A publish or clear cycle had failed writes
    WriteFailed {
        failed: usize,
        attempted: usize,
        consecutive_failures: u32,
    },
    /// Repeated publish failures crossed the threshold
    Degraded { consecutive_failures: u32 },
    /// Publishing succeeded again after being degraded
    Recovered,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_only_when_active() {
        assert!(!PresenceState::Off.is_ready());
        assert!(!PresenceState::AwaitingFix.is_ready());
        assert!(PresenceState::Active.is_ready());
        assert!(!PresenceState::Error(LocationError::PermissionDenied).is_ready());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PresenceState::AwaitingFix.to_string(), "awaiting_fix");
        assert_eq!(
            PresenceState::Error(LocationError::FixTimeout).to_string(),
            "error(no location fix within the configured window)"
        );
    }

    #[test]
    fn test_notice_serialization() {
        let json = serde_json::to_value(PresenceNotice::Degraded {
            consecutive_failures: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "degraded", "consecutive_failures": 3})
        );
    }
}
