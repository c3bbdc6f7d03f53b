//! Collaborator boundary: the shared record store and the auth context.
//!
//! Ownership scoping of writes is enforced by the store implementation,
//! not re-validated by the presence pipeline.

mod auth;
mod memory;

pub use auth::StaticAuth;
pub use memory::MemoryStore;

use crate::error::{StoreError, WriteError};
use crate::model::{ChangeEvent, Coordinates, Entity, EntityId, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Keyed record store with a coarse change feed.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Snapshot of every entity whose location is currently shared.
    async fn get_all_located_entities(&self) -> Result<Vec<Entity>, StoreError>;

    /// Overwrite an entity's location. `None` clears it. Idempotent.
    async fn write_location(
        &self,
        entity_id: &EntityId,
        location: Option<Coordinates>,
    ) -> Result<(), WriteError>;

    /// Subscribe to "something in `table` changed" notifications.
    fn subscribe_to_changes(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;
}

/// Identity of the acting user and the entities they control.
#[async_trait]
pub trait AuthContext: Send + Sync {
    fn current_user_id(&self) -> UserId;

    async fn owned_entity_ids(&self, user_id: &UserId) -> Result<HashSet<EntityId>, StoreError>;
}
