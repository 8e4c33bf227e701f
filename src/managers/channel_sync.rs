use crate::managers::refresh::{LifecycleListener, RefreshCoordinator, RefreshScope};
use crate::meeting::Session;
use crate::push::{ChannelEvent, ChannelHandle, ChannelStatus, EventHandler, PushChannel, PushTransport, Room};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;

/// Keeps a view's push channel in line with its latest session detail.
///
/// Handlers follow the lifecycle: the recognition handler exists only
/// while the meeting is started. Connecting runs in the background, so a
/// slow or silent broker never holds up a refresh; every applied detail
/// retries a channel that failed to connect or was dropped.
pub struct ChannelSync {
    channel: PushChannel,
    handle: Mutex<Option<ChannelHandle>>,
    opening: Mutex<Option<JoinHandle<()>>>,
    coordinator: Weak<RefreshCoordinator>,
    this: Weak<ChannelSync>,
}

impl ChannelSync {
    pub fn new(transport: Arc<dyn PushTransport>, coordinator: &Arc<RefreshCoordinator>) -> Arc<Self> {
        let status_target = Arc::downgrade(coordinator);
        let channel = PushChannel::with_status_listener(
            transport,
            Some(Arc::new(move |status: ChannelStatus| {
                if let Some(coordinator) = status_target.upgrade() {
                    coordinator.set_channel_status(status);
                }
            })),
        );
        Arc::new_cyclic(|this| Self {
            channel,
            handle: Mutex::new(None),
            opening: Mutex::new(None),
            coordinator: Arc::downgrade(coordinator),
            this: this.clone(),
        })
    }

    pub fn channel(&self) -> &PushChannel {
        &self.channel
    }

    /// Close the channel for good, abandoning any connect in flight.
    /// Returns false if nothing was open or it is already closed.
    pub fn close(&self) -> bool {
        if let Some(opening) = self.opening.lock().unwrap_or_else(|e| e.into_inner()).take() {
            opening.abort();
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        let closed = handle.is_some_and(|handle| self.channel.close(&handle));
        if !closed {
            // never opened, dropped by the broker, or opened after the handle was taken
            self.channel.shutdown();
        }
        closed
    }

    fn refresh_on(&self, scope: RefreshScope) -> EventHandler {
        let coordinator = self.coordinator.clone();
        Arc::new(move || {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.refresh(scope);
            }
        })
    }

    /// Start connecting unless the channel is open or a connect is running.
    fn ensure_open(&self, session: &Session) {
        if self.channel.is_open() {
            return;
        }
        let mut opening = self.opening.lock().unwrap_or_else(|e| e.into_inner());
        if opening.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let room = Room::for_session(session);
        let key = session.key.clone();
        *opening = Some(tokio::spawn(async move {
            match this.channel.open(room).await {
                Ok(handle) => {
                    *this.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                }
                Err(e) => log::debug!("Push channel for {} not available: {}", key, e),
            }
        }));
    }
}

#[async_trait]
impl LifecycleListener for ChannelSync {
    async fn session_applied(&self, session: &Session) {
        if session.key.participant_id.is_none() {
            self.channel.subscribe(
                ChannelEvent::ParticipantJoined,
                self.refresh_on(RefreshScope::Roster),
            );
        }

        if session.lifecycle.is_started() {
            self.channel.subscribe(
                ChannelEvent::RecognitionDataAdded,
                self.refresh_on(RefreshScope::All),
            );
        } else if self.channel.unsubscribe(ChannelEvent::RecognitionDataAdded) {
            log::info!(
                "Meeting {} is {}, no longer refreshing on recognition data",
                session.key,
                session.lifecycle
            );
        }

        if session.lifecycle.is_ended() && !self.channel.is_open() {
            // nothing left to listen for
            return;
        }
        self.ensure_open(session);
    }
}
