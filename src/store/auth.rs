use super::{AuthContext, MemoryStore};
use crate::error::StoreError;
use crate::model::{EntityId, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Auth context for a signed-in user, with ownership read from a [`MemoryStore`].
#[derive(Clone)]
pub struct StaticAuth {
    user_id: UserId,
    store: Arc<MemoryStore>,
}

impl StaticAuth {
    pub fn new(user_id: UserId, store: Arc<MemoryStore>) -> Self {
        Self { user_id, store }
    }
}

#[async_trait]
impl AuthContext for StaticAuth {
    fn current_user_id(&self) -> UserId {
        self.user_id.clone()
    }

    async fn owned_entity_ids(&self, user_id: &UserId) -> Result<HashSet<EntityId>, StoreError> {
        Ok(self.store.owned_by(user_id))
    }
}
