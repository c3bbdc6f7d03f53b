//! Privacy-preserving presence and location sharing.
//!
//! A user opts their pets into being discoverable on a live map. The
//! [`presence`] actor reconciles that intent with device geolocation, the
//! [`publisher`] writes confirmed fixes to the shared store on a fixed
//! interval, and the [`feed`] keeps a per-viewer view of nearby entities with
//! non-owner coordinates coarsened by [`privacy`].

// Configuration (TOML + env overrides)
pub mod config;

// Error taxonomy
pub mod error;

// Nearby entities view
pub mod feed;

// Device geolocation capability
pub mod geolocation;

// Shared records
pub mod model;

// Presence state machine and session actor
pub mod presence;

// Per-viewer projection
pub mod privacy;

// Throttled location writer
pub mod publisher;

// Store and auth collaborators
pub mod store;

// Tracing setup
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::{load_config, PawmapConfig};
pub use error::{LocationError, PublishError, StoreError, WriteError};
pub use feed::{NearbyFeed, NearbyView};
pub use geolocation::{ChannelGeolocation, GeolocationSource, PlatformGeolocation, WatchOptions};
pub use model::{ChangeEvent, Coordinates, Entity, EntityId, LocationFix, ProjectedEntity, UserId};
pub use presence::{
    PresenceController, PresenceHandle, PresenceIntent, PresenceNotice, PresenceState,
    PresenceStatus,
};
pub use privacy::project;
pub use publisher::LocationPublisher;
pub use store::{AuthContext, MemoryStore, StaticAuth, StoreAdapter};
