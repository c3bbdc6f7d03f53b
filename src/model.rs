//! Records shared by every part of the presence pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a locatable entity (a pet).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a fresh time-ordered identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a user (owner or viewer).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Entity represents an owned, optionally located record in the shared store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity identifier
    pub id: EntityId,

    /// Controlling user, immutable after creation
    pub owner_id: UserId,

    /// `None` means the owner is not sharing a position
    pub location: Option<Coordinates>,

    /// Last location write
    pub updated_at: DateTime<Utc>,
}

/// A single position report from the platform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in metres
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// True if `self` should replace `cached` as the authoritative fix.
    ///
    /// Equal timestamps are treated as duplicates and rejected.
    pub fn supersedes(&self, cached: Option<&LocationFix>) -> bool {
        match cached {
            Some(cached) => self.timestamp > cached.timestamp,
            None => true,
        }
    }
}

/// View-only entity as seen by a particular viewer. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectedEntity {
    pub id: EntityId,
    pub owner_id: UserId,
    pub location: Coordinates,
    /// True when `location` is the owner's unrounded position
    pub exact: bool,
    pub updated_at: DateTime<Utc>,
}

/// Coarse change notification: something in `table` changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    /// Row hint; consumers are free to ignore it
    pub entity_id: Option<EntityId>,
    pub at: DateTime<Utc>,
}
