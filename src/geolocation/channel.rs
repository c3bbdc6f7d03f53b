use super::{PlatformGeolocation, PositionEvent, PositionStream, WatchHandle, WatchOptions};
use crate::error::LocationError;
use crate::model::LocationFix;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Bridges callback-style platform position APIs into [`PlatformGeolocation`].
///
/// The host keeps a clone and calls [`report_fix`](Self::report_fix) /
/// [`report_error`](Self::report_error) from its success and error
/// callbacks. Every active watch receives every report.
#[derive(Clone, Default)]
pub struct ChannelGeolocation {
    watches: Arc<DashMap<u64, mpsc::UnboundedSender<PositionEvent>>>,
    next_handle: Arc<AtomicU64>,
}

impl ChannelGeolocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a fix to all active watches. Returns the number of receivers.
    pub fn report_fix(&self, fix: LocationFix) -> usize {
        self.report(Ok(fix))
    }

    /// Deliver an error to all active watches. Returns the number of receivers.
    pub fn report_error(&self, error: LocationError) -> usize {
        self.report(Err(error))
    }

    fn report(&self, event: PositionEvent) -> usize {
        let mut delivered = 0;
        for entry in self.watches.iter() {
            if entry.value().send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// End every active watch stream, as if the platform tore them down.
    pub fn close_all(&self) {
        self.watches.clear();
    }

    /// Number of watches currently held open.
    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    /// Total number of watches ever started.
    pub fn watches_started(&self) -> u64 {
        self.next_handle.load(Ordering::SeqCst)
    }
}

impl PlatformGeolocation for ChannelGeolocation {
    fn watch_position(&self, options: &WatchOptions) -> (WatchHandle, PositionStream) {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.watches.insert(id, tx);
        debug!(handle = id, high_accuracy = options.high_accuracy, "Channel watch opened");
        (WatchHandle(id), UnboundedReceiverStream::new(rx).boxed())
    }

    fn clear_watch(&self, handle: WatchHandle) {
        if self.watches.remove(&handle.0).is_some() {
            debug!(handle = handle.0, "Channel watch cleared");
        }
    }
}
