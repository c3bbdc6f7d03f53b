//! Device geolocation as a restartable stream of fixes and errors.
//!
//! The concrete backend (native background tracking, browser watch, a test
//! double) implements [`PlatformGeolocation`] and is injected at
//! construction. [`GeolocationSource`] adds the per-fix timeout and makes
//! start/stop idempotent.

mod channel;

pub use channel::ChannelGeolocation;

use crate::error::LocationError;
use crate::model::LocationFix;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// One item of a position watch.
pub type PositionEvent = Result<LocationFix, LocationError>;

/// Stream of position events produced by the platform.
pub type PositionStream = BoxStream<'static, PositionEvent>;

/// Opaque token used to release a platform watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchHandle(pub u64);

/// Options forwarded to the platform watch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Maximum wait for each fix
    pub timeout: Duration,
    /// Oldest cached position the platform may return
    pub max_fix_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(15),
            max_fix_age: Duration::ZERO,
        }
    }
}

/// Platform capability for watching the device position.
///
/// Errors (including a refused permission prompt) are delivered as items on
/// the returned stream. A backend may report the same error repeatedly.
pub trait PlatformGeolocation: Send + Sync {
    /// Begin watching; fixes are delivered in platform order.
    fn watch_position(&self, options: &WatchOptions) -> (WatchHandle, PositionStream);

    /// Release the hardware watch identified by `handle`.
    fn clear_watch(&self, handle: WatchHandle);
}

struct ActiveWatch {
    handle: WatchHandle,
    positions: PositionStream,
    /// Next item must arrive before this instant
    deadline: Instant,
}

/// Wraps a [`PlatformGeolocation`] backend.
pub struct GeolocationSource {
    platform: Arc<dyn PlatformGeolocation>,
    options: WatchOptions,
    active: Option<ActiveWatch>,
}

impl GeolocationSource {
    pub fn new(platform: Arc<dyn PlatformGeolocation>, options: WatchOptions) -> Self {
        Self {
            platform,
            options,
            active: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.active.is_some()
    }

    /// Start the platform watch. Returns false if one is already running.
    pub fn watch(&mut self) -> bool {
        if self.active.is_some() {
            return false;
        }
        let (handle, positions) = self.platform.watch_position(&self.options);
        info!(handle = handle.0, high_accuracy = self.options.high_accuracy, "Location watch started");
        self.active = Some(ActiveWatch {
            handle,
            positions,
            deadline: Instant::now() + self.options.timeout,
        });
        true
    }

    /// Release the platform watch. Returns false if none was running.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                self.platform.clear_watch(active.handle);
                info!(handle = active.handle.0, "Location watch stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and start again, e.g. after a fix timeout.
    pub fn restart(&mut self) {
        self.stop();
        self.watch();
    }

    /// Next position event.
    ///
    /// Pends forever while no watch is running, so it can sit in a
    /// `select!` unconditionally. Yields `FixTimeout` when the platform is
    /// silent for longer than the configured window and `WatchClosed` if the
    /// platform ends the stream (the watch is released in that case).
    ///
    /// The window is tracked as a deadline, so dropping this future inside a
    /// `select!` does not extend it.
    pub async fn next(&mut self) -> PositionEvent {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };

        let next = tokio::time::timeout_at(active.deadline, active.positions.next()).await;
        match next {
            Ok(Some(event)) => {
                active.deadline = Instant::now() + self.options.timeout;
                event
            }
            Ok(None) => {
                debug!(handle = active.handle.0, "Platform ended location watch");
                self.stop();
                Err(LocationError::WatchClosed)
            }
            Err(_) => {
                active.deadline = Instant::now() + self.options.timeout;
                Err(LocationError::FixTimeout)
            }
        }
    }
}

impl Drop for GeolocationSource {
    fn drop(&mut self) {
        self.stop();
    }
}
