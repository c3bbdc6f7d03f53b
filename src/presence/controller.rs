use super::{Effect, PresenceInput, PresenceMachine, PresenceNotice, PresenceState, PresenceStatus};
use crate::config::PawmapConfig;
use crate::geolocation::{GeolocationSource, PlatformGeolocation};
use crate::model::UserId;
use crate::publisher::LocationPublisher;
use crate::store::{AuthContext, StoreAdapter};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};


enum Command {
    SetIntent {
        desired: bool,
        reply: oneshot::Sender<PresenceState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Single-owner actor for one user session.
///
/// Toggle commands, geolocation events and publish ticks are drained by
/// one task, so no two transitions interleave.
pub struct PresenceController {
    user_id: UserId,
    machine: PresenceMachine,
    source: GeolocationSource,
    publisher: LocationPublisher,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<PresenceStatus>,
    notice_tx: broadcast::Sender<PresenceNotice>,
}

impl PresenceController {
    /// Spawn the session actor and return a handle to it.
    pub fn spawn(
        config: &PawmapConfig,
        platform: Arc<dyn PlatformGeolocation>,
        store: Arc<dyn StoreAdapter>,
        auth: Arc<dyn AuthContext>,
    ) -> PresenceHandle {
        let (command_tx, commands) = mpsc::channel(config.session.command_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(PresenceStatus::default());
        let (notice_tx, _) = broadcast::channel(config.session.notice_buffer.max(1));

        let user_id = auth.current_user_id();
        let source = GeolocationSource::new(platform, config.geolocation.watch_options());
        let publisher = LocationPublisher::new(
            store,
            auth,
            config.publisher.clone(),
            notice_tx.clone(),
        );

        let controller = Self {
            user_id: user_id.clone(),
            machine: PresenceMachine::new(config.geolocation.max_timeout_retries),
            source,
            publisher,
            commands,
            status_tx,
            notice_tx: notice_tx.clone(),
        };

        info!(user_id = %user_id, "Starting presence session");
        let task = tokio::spawn(controller.run());

        PresenceHandle {
            user_id,
            commands: command_tx,
            status: status_rx,
            notices: notice_tx,
            task: Arc::new(tokio::sync::Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                // Commands first: a queued toggle-off wins over a late fix
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::SetIntent { desired, reply }) => {
                        self.handle(PresenceInput::Intent(desired)).await;
                        let _ = reply.send(self.machine.state().clone());
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                },

                event = self.source.next() => {
                    self.handle(PresenceInput::Position(event)).await;
                }

                _ = self.publisher.next_tick() => {
                    if let Err(e) = self.publisher.on_tick().await {
                        warn!(user_id = %self.user_id, error = %e, "Periodic location write failed");
                    }
                    self.publish_status();
                }
            }
        }

        info!(user_id = %self.user_id, "Presence session ended");
    }

    async fn handle(&mut self, input: PresenceInput) {
        let before = self.machine.state().clone();
        let effects = self.machine.apply(input);

        for effect in effects {
            self.execute(effect).await;
        }

        let after = self.machine.state();
        if *after != before {
            info!(user_id = %self.user_id, from = %before, to = %after, "Presence state changed");
        }
        self.publish_status();
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartWatch => {
                self.source.watch();
            }
            Effect::StopWatch => {
                self.source.stop();
            }
            Effect::RestartWatch => {
                warn!(user_id = %self.user_id, "No location fix in time, restarting watch");
                self.source.restart();
            }
            Effect::PublishNow(fix) => {
                if let Err(e) = self.publisher.on_activated(fix).await {
                    warn!(user_id = %self.user_id, error = %e, "Initial location write failed");
                }
            }
            Effect::UpdateFix(fix) => self.publisher.on_fix_updated(fix),
            Effect::ClearStore => {
                self.publisher.on_deactivated().await;
            }
            Effect::NotifyError(reason) => {
                error!(user_id = %self.user_id, error = %reason, "Location sharing stopped");
                let _ = self.notice_tx.send(PresenceNotice::Error { reason });
            }
        }
    }

    /// Stop the watch, cancel the timer, clear the store. In that order.
    async fn teardown(&mut self) {
        self.source.stop();
        self.publisher.on_deactivated().await;
        self.machine.reset();
        self.publish_status();
    }

    fn publish_status(&self) {
        let state = self.machine.state().clone();
        let status = PresenceStatus {
            ready: state.is_ready(),
            state,
            intent: self.machine.intent(),
            degraded: self.publisher.is_degraded(),
            consecutive_failures: self.publisher.consecutive_failures(),
            last_published_at: self.publisher.last_published_at(),
        };
        self.status_tx.send_replace(status);
    }
}

/// Cloneable handle to a running presence session.
///
/// When the last handle is dropped the session tears itself down.
#[derive(Clone)]
pub struct PresenceHandle {
    user_id: UserId,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<PresenceStatus>,
    notices: broadcast::Sender<PresenceNotice>,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl PresenceHandle {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Record the user's intent and wait until its effects have run.
    ///
    /// Turning sharing off returns only after the watch is stopped, the
    /// timer cancelled and the store cleared. Returns the resulting state;
    /// a session that has already ended reports `Off`.
    pub async fn set_intent(&self, desired: bool) -> PresenceState {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::SetIntent { desired, reply })
            .await
            .is_err()
        {
            warn!(user_id = %self.user_id, "Presence session already ended");
            return PresenceState::Off;
        }
        rx.await.unwrap_or_default()
    }

    pub fn state(&self) -> PresenceState {
        self.status.borrow().state.clone()
    }

    /// True only while the session is `Active`.
    pub fn is_ready(&self) -> bool {
        self.status.borrow().ready
    }

    pub fn status(&self) -> PresenceStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PresenceStatus> {
        self.status.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<PresenceNotice> {
        self.notices.subscribe()
    }

    /// Tear the session down and wait for the actor to exit.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!(user_id = %self.user_id, error = %e, "Presence session task failed");
            }
        }
    }
}
