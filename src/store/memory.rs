use super::StoreAdapter;
use crate::error::{StoreError, WriteError};
use crate::model::{ChangeEvent, Coordinates, Entity, EntityId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// In-process store holding a single table of entities.
///
/// Every mutation broadcasts a [`ChangeEvent`] to subscribers.
pub struct MemoryStore {
    table: String,

    /// Lock-free concurrent map for fast reads
    entities: DashMap<EntityId, Entity>,

    /// Broadcast channel for change notifications
    change_tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new(table: impl Into<String>) -> Self {
        let (change_tx, _) = broadcast::channel(1000);
        Self {
            table: table.into(),
            entities: DashMap::new(),
            change_tx,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert or replace an entity (profile management path).
    pub fn insert(&self, entity: Entity) {
        let id = entity.id.clone();
        self.entities.insert(id.clone(), entity);
        self.notify(Some(id));
    }

    /// Create an entity for `owner` with no shared location.
    pub fn create_for(&self, owner: &UserId) -> EntityId {
        let id = EntityId::generate();
        self.insert(Entity {
            id: id.clone(),
            owner_id: owner.clone(),
            location: None,
            updated_at: Utc::now(),
        });
        id
    }

    pub fn remove(&self, entity_id: &EntityId) -> Option<Entity> {
        let removed = self.entities.remove(entity_id).map(|(_, entity)| entity);
        if removed.is_some() {
            info!(entity_id = %entity_id, "Entity removed");
            self.notify(Some(entity_id.clone()));
        }
        removed
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<Entity> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// IDs of every entity owned by `owner`.
    pub fn owned_by(&self, owner: &UserId) -> HashSet<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.owner_id == *owner)
            .map(|e| e.id.clone())
            .collect()
    }

    fn notify(&self, entity_id: Option<EntityId>) {
        let event = ChangeEvent {
            table: self.table.clone(),
            entity_id,
            at: Utc::now(),
        };
        // No subscribers is fine
        let _ = self.change_tx.send(event);
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get_all_located_entities(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.location.is_some())
            .map(|e| e.value().clone())
            .collect())
    }

    async fn write_location(
        &self,
        entity_id: &EntityId,
        location: Option<Coordinates>,
    ) -> Result<(), WriteError> {
        {
            let mut entity = self
                .entities
                .get_mut(entity_id)
                .ok_or_else(|| WriteError::Rejected(format!("unknown entity {}", entity_id)))?;
            entity.location = location;
            entity.updated_at = Utc::now();
        }

        debug!(entity_id = %entity_id, shared = location.is_some(), "Location written");
        self.notify(Some(entity_id.clone()));
        Ok(())
    }

    fn subscribe_to_changes(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        if table != self.table {
            warn!(requested = %table, table = %self.table, "Subscribing to single-table store under a different name");
        }
        self.change_tx.subscribe()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("pets")
    }
}
