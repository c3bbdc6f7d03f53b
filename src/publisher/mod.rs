//! Throttled location writer.
//!
//! Writes the latest confirmed fix to every entity the user owns, once on
//! activation and then on a fixed interval. Deactivation cancels the timer
//! and clears the stored location exactly once.

use crate::config::PublisherConfig;
use crate::error::{PublishError, WriteError};
use crate::model::{Coordinates, EntityId, LocationFix, UserId};
use crate::presence::PresenceNotice;
use crate::store::{AuthContext, StoreAdapter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};


/// Writes confirmed fixes for one user's entities.
pub struct LocationPublisher {
    store: Arc<dyn StoreAdapter>,
    auth: Arc<dyn AuthContext>,
    user_id: UserId,
    config: PublisherConfig,

    /// Latest fix handed over by the controller
    latest: Option<LocationFix>,

    /// Periodic write timer, present only while active
    timer: Option<Interval>,

    /// True while the store may hold a location written (or left) by this user
    needs_clear: bool,

    consecutive_failures: u32,
    degraded: bool,
    last_published_at: Option<DateTime<Utc>>,

    notices: broadcast::Sender<PresenceNotice>,
}

impl LocationPublisher {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        auth: Arc<dyn AuthContext>,
        config: PublisherConfig,
        notices: broadcast::Sender<PresenceNotice>,
    ) -> Self {
        let user_id = auth.current_user_id();
        Self {
            store,
            auth,
            user_id,
            config,
            latest: None,
            timer: None,
            // A previous session may have died without clearing
            needs_clear: true,
            consecutive_failures: 0,
            degraded: false,
            last_published_at: None,
            notices,
        }
    }

    pub fn is_publishing(&self) -> bool {
        self.timer.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_published_at(&self) -> Option<DateTime<Utc>> {
        self.last_published_at
    }

    pub fn latest_fix(&self) -> Option<&LocationFix> {
        self.latest.as_ref()
    }

    /// Write `fix` immediately and start the periodic timer.
    pub async fn on_activated(&mut self, fix: LocationFix) -> Result<(), PublishError> {
        self.latest = Some(fix);
        self.needs_clear = true;

        let period = self.config.interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);

        info!(
            user_id = %self.user_id,
            interval_seconds = self.config.interval_seconds,
            "Location publishing started"
        );

        self.publish_latest().await
    }

    /// Remember `fix` for the next tick. Nothing is written now.
    pub fn on_fix_updated(&mut self, fix: LocationFix) {
        self.latest = Some(fix);
    }

    /// Resolves on the next timer tick; pends forever while inactive.
    pub async fn next_tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Write the most recent fix. Called on each timer tick.
    pub async fn on_tick(&mut self) -> Result<(), PublishError> {
        if self.timer.is_none() {
            return Ok(());
        }
        self.publish_latest().await
    }

    /// Cancel the timer and clear every owned entity's location.
    ///
    /// Returns true if a clear was issued. Repeated calls after a successful
    /// clear are no-ops. Failure accounting restarts with the next session,
    /// so a degraded flag is dropped here without a `Recovered` notice, and a
    /// failed clear never counts towards `consecutive_failures`.
    pub async fn on_deactivated(&mut self) -> bool {
        let was_publishing = self.timer.take().is_some();
        self.latest = None;
        self.consecutive_failures = 0;
        self.degraded = false;

        if !self.needs_clear {
            debug!(user_id = %self.user_id, "Location already cleared, skipping");
            return false;
        }

        match self.write_all(None).await {
            Ok(count) => {
                self.needs_clear = false;
                info!(user_id = %self.user_id, entities = count, was_publishing, "Location cleared");
            }
            Err(e) => {
                // Left set so the next deactivation or teardown tries again
                error!(user_id = %self.user_id, error = %e, "Failed to clear location");
                let _ = self.notices.send(PresenceNotice::WriteFailed {
                    failed: e.failed,
                    attempted: e.attempted,
                    consecutive_failures: e.consecutive_failures,
                });
            }
        }
        true
    }

    async fn publish_latest(&mut self) -> Result<(), PublishError> {
        let Some(fix) = self.latest else {
            return Ok(());
        };

        match self.write_all(Some(fix.coordinates())).await {
            Ok(count) => {
                self.last_published_at = Some(Utc::now());
                debug!(user_id = %self.user_id, entities = count, "Location published");
                self.record_success();
                Ok(())
            }
            Err(mut e) => {
                self.consecutive_failures += 1;
                e.consecutive_failures = self.consecutive_failures;
                warn!(user_id = %self.user_id, error = %e, "Location publish failed, retrying next tick");
                let _ = self.notices.send(PresenceNotice::WriteFailed {
                    failed: e.failed,
                    attempted: e.attempted,
                    consecutive_failures: e.consecutive_failures,
                });
                if e.consecutive_failures >= self.config.degraded_after_failures && !self.degraded {
                    self.degraded = true;
                    warn!(
                        user_id = %self.user_id,
                        consecutive_failures = e.consecutive_failures,
                        "Location publishing degraded"
                    );
                    let _ = self.notices.send(PresenceNotice::Degraded {
                        consecutive_failures: e.consecutive_failures,
                    });
                }
                Err(e)
            }
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.degraded {
            self.degraded = false;
            info!(user_id = %self.user_id, "Location publishing recovered");
            let _ = self.notices.send(PresenceNotice::Recovered);
        }
    }

    /// Overwrite the location of every owned entity.
    ///
    /// Individual failures do not stop the remaining writes. The ownership
    /// lookup and each write are bounded by the write timeout. The error
    /// carries the current failure count; callers decide whether it grows.
    async fn write_all(&mut self, location: Option<Coordinates>) -> Result<usize, PublishError> {
        let lookup = self.auth.owned_entity_ids(&self.user_id);
        let ids = match tokio::time::timeout(self.config.write_timeout(), lookup).await {
            Ok(Ok(ids)) => {
                let mut ids: Vec<EntityId> = ids.into_iter().collect();
                ids.sort();
                ids
            }
            Ok(Err(e)) => {
                return Err(self.failure(0, 0, WriteError::Unavailable(e.to_string())));
            }
            Err(_) => {
                warn!(user_id = %self.user_id, "Owned entity lookup timed out");
                return Err(self.failure(0, 0, WriteError::Timeout));
            }
        };

        let attempted = ids.len();
        let mut failed = 0;
        let mut first_error = None;

        for id in &ids {
            let write = self.store.write_location(id, location);
            let result = match tokio::time::timeout(self.config.write_timeout(), write).await {
                Ok(result) => result,
                Err(_) => Err(WriteError::Timeout),
            };
            if let Err(e) = result {
                warn!(entity_id = %id, error = %e, "Location write failed");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(source) => Err(self.failure(failed, attempted, source)),
            None => Ok(attempted),
        }
    }

    fn failure(&self, failed: usize, attempted: usize, source: WriteError) -> PublishError {
        PublishError {
            failed,
            attempted,
            consecutive_failures: self.consecutive_failures,
            source,
        }
    }
}
