//! Doubles shared by the unit tests.

use crate::error::{StoreError, WriteError};
use crate::model::{ChangeEvent, Coordinates, Entity, EntityId, LocationFix, UserId};
use crate::store::{AuthContext, MemoryStore, StaticAuth, StoreAdapter};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Fix at `secs` past a fixed epoch, so ordering is explicit.
pub fn fix_at(lat: f64, lon: f64, secs: i64) -> LocationFix {
    LocationFix {
        latitude: lat,
        longitude: lon,
        accuracy: 8.0,
        timestamp: epoch(secs),
    }
}

pub fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

type WriteObserver = Box<dyn Fn(&EntityId, Option<Coordinates>) + Send + Sync>;

/// Wraps a [`MemoryStore`], records every write and can fail on demand.
pub struct RecordingStore {
    pub inner: Arc<MemoryStore>,
    writes: Mutex<Vec<(EntityId, Option<Coordinates>)>>,
    observer: Mutex<Option<WriteObserver>>,
    fail_next: AtomicU32,
    fail_reads: AtomicU32,
    read_delay_ms: AtomicU64,
    reads: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStore::default()),
            writes: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            fail_next: AtomicU32::new(0),
            fail_reads: AtomicU32::new(0),
            read_delay_ms: AtomicU64::new(0),
            reads: AtomicUsize::new(0),
        })
    }

    /// Store plus auth for `user` owning `pets` fresh entities.
    pub fn with_owner(user: &str, pets: usize) -> (Arc<Self>, Arc<StaticAuth>, Vec<EntityId>) {
        let store = Self::new();
        let user = UserId::from(user);
        let ids = (0..pets).map(|_| store.inner.create_for(&user)).collect();
        let auth = Arc::new(StaticAuth::new(user, Arc::clone(&store.inner)));
        (store, auth, ids)
    }

    /// Run `f` at the start of every write, before it is applied.
    pub fn observe_writes(&self, f: impl Fn(&EntityId, Option<Coordinates>) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Box::new(f));
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` snapshot reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Delay every snapshot read, to hold a refresh in flight.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(EntityId, Option<Coordinates>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clears(&self) -> Vec<EntityId> {
        self.writes()
            .into_iter()
            .filter(|(_, loc)| loc.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn location_writes(&self) -> Vec<(EntityId, Coordinates)> {
        self.writes()
            .into_iter()
            .filter_map(|(id, loc)| loc.map(|l| (id, l)))
            .collect()
    }

    pub fn location_of(&self, id: &EntityId) -> Option<Coordinates> {
        self.inner.get(id).and_then(|e| e.location)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdapter for RecordingStore {
    async fn get_all_located_entities(&self) -> Result<Vec<Entity>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let remaining = self.fail_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        self.inner.get_all_located_entities().await
    }

    async fn write_location(
        &self,
        entity_id: &EntityId,
        location: Option<Coordinates>,
    ) -> Result<(), WriteError> {
        {
            let observer = self.observer.lock().unwrap();
            if let Some(observe) = observer.as_ref() {
                observe(entity_id, location);
            }
        }
        self.writes
            .lock()
            .unwrap()
            .push((entity_id.clone(), location));

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(WriteError::Unavailable("injected".to_string()));
        }
        self.inner.write_location(entity_id, location).await
    }

    fn subscribe_to_changes(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe_to_changes(table)
    }
}

/// Auth context whose ownership lookup never completes.
pub struct StalledAuth {
    pub user_id: UserId,
}

#[async_trait]
impl AuthContext for StalledAuth {
    fn current_user_id(&self) -> UserId {
        self.user_id.clone()
    }

    async fn owned_entity_ids(&self, _user_id: &UserId) -> Result<HashSet<EntityId>, StoreError> {
        std::future::pending().await
    }
}
