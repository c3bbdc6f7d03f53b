//! Materialized "nearby entities" view for one viewer.
//!
//! The store's change feed is coarse, so every notification re-runs the
//! full snapshot-read-and-project cycle. Recomputes never overlap: one
//! worker task owns the cycle, and notifications that pile up while a
//! recompute is in flight collapse into a single follow-up recompute.

use crate::config::FeedConfig;
use crate::model::{ChangeEvent, Coordinates, ProjectedEntity, UserId};
use crate::privacy::{project, DiscoveryArea};
use crate::store::StoreAdapter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};


/// The visible set as of one refresh. Never cached beyond the next refresh.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NearbyView {
    /// Projected for the viewer, ordered by entity id
    pub entities: Vec<ProjectedEntity>,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Completed recomputes since construction
    pub generation: u64,
}

enum FeedCommand {
    SetCenter(Option<Coordinates>),
    Shutdown,
}

/// Handle to a running nearby feed.
pub struct NearbyFeed {
    viewer: UserId,
    view: watch::Receiver<NearbyView>,
    control: mpsc::Sender<FeedCommand>,
    task: JoinHandle<()>,
}

impl NearbyFeed {
    /// Build the initial view and start following store changes.
    ///
    /// Returns once the first snapshot has been published.
    pub async fn start(
        store: Arc<dyn StoreAdapter>,
        viewer: UserId,
        config: &FeedConfig,
        center: Option<Coordinates>,
    ) -> Self {
        // Subscribe before the first read so no change slips between them
        let changes = store.subscribe_to_changes(&config.table);
        let (view_tx, view) = watch::channel(NearbyView::default());
        let (control, control_rx) = mpsc::channel(8);

        let mut worker = FeedWorker {
            store,
            viewer: viewer.clone(),
            radius_km: config.discovery_radius_km,
            read_timeout: config.read_timeout(),
            center,
            changes,
            changes_open: true,
            control: control_rx,
            view_tx,
            generation: 0,
        };
        worker.refresh().await;

        info!(viewer = %viewer, table = %config.table, "Nearby feed started");
        let task = tokio::spawn(worker.run());

        Self {
            viewer,
            view,
            control,
            task,
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    /// Current visible set.
    pub fn view(&self) -> NearbyView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NearbyView> {
        self.view.clone()
    }

    /// Move the discovery centre; triggers a recompute.
    pub async fn set_center(&self, center: Option<Coordinates>) {
        if self.control.send(FeedCommand::SetCenter(center)).await.is_err() {
            warn!(viewer = %self.viewer, "Nearby feed already stopped");
        }
    }

    /// Stop following changes and wait for the worker to exit.
    pub async fn shutdown(self) {
        let _ = self.control.send(FeedCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(viewer = %self.viewer, error = %e, "Nearby feed task failed");
        }
    }
}

struct FeedWorker {
    store: Arc<dyn StoreAdapter>,
    viewer: UserId,
    radius_km: Option<f64>,
    read_timeout: Duration,
    center: Option<Coordinates>,
    changes: broadcast::Receiver<ChangeEvent>,
    changes_open: bool,
    control: mpsc::Receiver<FeedCommand>,
    view_tx: watch::Sender<NearbyView>,
    generation: u64,
}

impl FeedWorker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.control.recv() => match command {
                    Some(FeedCommand::SetCenter(center)) => {
                        self.center = center;
                        self.refresh().await;
                    }
                    Some(FeedCommand::Shutdown) | None => break,
                },

                changed = self.changes.recv(), if self.changes_open => {
                    match changed {
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(viewer = %self.viewer, skipped = skipped, "Change feed lagged, refreshing");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!(viewer = %self.viewer, "Change feed closed, view frozen");
                            self.changes_open = false;
                            continue;
                        }
                    }
                    let coalesced = self.drain_pending();
                    if coalesced > 0 {
                        debug!(viewer = %self.viewer, coalesced = coalesced, "Coalesced change notifications");
                    }
                    self.refresh().await;
                }
            }
        }

        info!(viewer = %self.viewer, "Nearby feed stopped");
    }

    /// Swallow notifications already queued; one refresh covers them all.
    fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.changes.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => drained += 1,
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.changes_open = false;
                    break;
                }
            }
        }
        drained
    }

    fn area(&self) -> Option<DiscoveryArea> {
        match (self.center, self.radius_km) {
            (Some(center), Some(radius_km)) => Some(DiscoveryArea { center, radius_km }),
            _ => None,
        }
    }

    async fn refresh(&mut self) {
        let read = self.store.get_all_located_entities();
        let entities = match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(entities)) => entities,
            Ok(Err(e)) => {
                warn!(viewer = %self.viewer, error = %e, "Nearby snapshot read failed, keeping previous view");
                return;
            }
            Err(_) => {
                warn!(
                    viewer = %self.viewer,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Nearby snapshot read timed out, keeping previous view"
                );
                return;
            }
        };

        let area = self.area();
        let mut visible: Vec<ProjectedEntity> = entities
            .iter()
            .filter_map(|entity| project(entity, &self.viewer))
            .filter(|p| match area {
                Some(area) => p.exact || area.contains(p.location),
                None => true,
            })
            .collect();
        visible.sort_by(|a, b| a.id.cmp(&b.id));

        self.generation += 1;
        debug!(
            viewer = %self.viewer,
            located = entities.len(),
            visible = visible.len(),
            generation = self.generation,
            "Nearby view refreshed"
        );

        self.view_tx.send_replace(NearbyView {
            entities: visible,
            refreshed_at: Some(Utc::now()),
            generation: self.generation,
        });
    }
}
