use crate::bridge::FloatingDisplay;
use crate::error::{Result, SessionError};
use crate::integrations::MeetingBackend;
use crate::managers::channel_sync::ChannelSync;
use crate::managers::lifecycle::LifecycleController;
use crate::managers::recognition::RecognitionToggle;
use crate::managers::refresh::{
    RefreshConfig, RefreshCoordinator, RefreshReport, RefreshScope, SessionSnapshot,
};
use crate::meeting::{Session, SessionKey};
use crate::push::{PushChannel, PushTransport};
use crate::storage::{IntentKey, IntentScope, IntentStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which variant of the dashboard a view shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "participant_id")]
pub enum ViewScope {
    #[default]
    Meeting,
    /// Per-user drill-down
    Participant(String),
}

impl ViewScope {
    pub fn key_for(&self, meeting_id: &str) -> SessionKey {
        match self {
            ViewScope::Meeting => SessionKey::meeting(meeting_id),
            ViewScope::Participant(participant_id) => {
                SessionKey::participant(meeting_id, participant_id.clone())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub meeting_id: String,
    pub scope: ViewScope,
    pub intent_scope: IntentScope,
    pub refresh: RefreshConfig,
}

/// External collaborators a view talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub backend: Arc<dyn MeetingBackend>,
    pub store: Arc<dyn IntentStore>,
    pub transport: Arc<dyn PushTransport>,
}

/// One mounted session view.
///
/// Owns the in-memory state and the push channel for its lifetime. The
/// channel is closed exactly once, by `close` or on drop.
pub struct SessionView {
    key: SessionKey,
    coordinator: Arc<RefreshCoordinator>,
    sync: Arc<ChannelSync>,
    lifecycle: LifecycleController,
    recognition: RecognitionToggle,
    closed: AtomicBool,
}

impl SessionView {
    /// Build the view and run the initial refresh. Fetch failures leave
    /// the affected slices empty; the view is usable either way.
    pub async fn mount(config: ViewConfig, services: SessionServices) -> Self {
        let key = config.scope.key_for(&config.meeting_id);
        let intent_key = IntentKey::new(&config.intent_scope, &key);

        let coordinator = Arc::new(RefreshCoordinator::new(
            key.clone(),
            services.backend.clone(),
            config.refresh,
        ));
        let sync = ChannelSync::new(services.transport, &coordinator);
        coordinator.set_listener(sync.clone());

        let lifecycle = LifecycleController::new(
            services.backend.clone(),
            coordinator.clone(),
            services.store.clone(),
            intent_key.clone(),
            sync.clone(),
        );
        let recognition = RecognitionToggle::new(
            services.backend,
            coordinator.clone(),
            services.store,
            intent_key,
        );

        match recognition.get_requested() {
            Ok(requested) => coordinator.set_intent(requested),
            Err(e) => log::warn!("Could not read recognition intent for {}: {}", key, e),
        }

        log::info!("Mounting session view {}", key);
        coordinator.refresh_now(RefreshScope::All).await;

        Self {
            key,
            coordinator,
            sync,
            lifecycle,
            recognition,
            closed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.coordinator.snapshot()
    }

    /// Receiver that sees every applied change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.coordinator.subscribe()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn channel(&self) -> &PushChannel {
        self.sync.channel()
    }

    pub fn refresh(&self) -> JoinHandle<RefreshReport> {
        self.coordinator.refresh(RefreshScope::All)
    }

    pub async fn refresh_now(&self) -> RefreshReport {
        self.coordinator.refresh_now(RefreshScope::All).await
    }

    pub async fn request_start(&self) -> Result<Session> {
        self.lifecycle.request_start().await
    }

    pub async fn request_end(&self, confirmed: bool) -> Result<Session> {
        self.lifecycle.request_end(confirmed).await
    }

    /// On success the view is closed.
    pub async fn request_delete(&self, confirmed: bool) -> Result<()> {
        let result = self.lifecycle.request_delete(confirmed).await;
        if self.coordinator.is_detached() {
            self.closed.store(true, Ordering::SeqCst);
        }
        result
    }

    pub async fn set_recognition_requested(&self, requested: bool) -> Result<()> {
        self.recognition.set_requested(requested).await
    }

    pub fn recognition_requested(&self) -> Result<bool> {
        self.recognition.get_requested()
    }

    /// Only offered while the meeting is live.
    pub fn open_floating_display(&self, bridge: &dyn FloatingDisplay, token: &str) -> Result<()> {
        let session = self
            .snapshot()
            .session
            .ok_or_else(|| SessionError::precondition("meeting detail is not loaded yet"))?;
        if !session.available_actions().floating_display {
            return Err(SessionError::precondition(format!(
                "floating display needs a started meeting (meeting is {})",
                session.lifecycle
            )));
        }
        bridge.open_floating_display(&session.code, token)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the view down: discard in-flight results and close the
    /// channel. Returns false if the view was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.coordinator.detach();
        self.sync.close();
        log::info!("Session view {} closed", self.key);
        true
    }
}

impl Drop for SessionView {
    fn drop(&mut self) {
        self.close();
    }
}
