use crate::error::{Result, SessionError};
use crate::integrations::MeetingBackend;
use crate::managers::refresh::{RefreshCoordinator, RefreshScope};
use crate::storage::{IntentKey, IntentStore};
use std::sync::Arc;

const REQUESTED: &str = "true";

/// Reconciles the durable recognition intent with the backend's
/// start/stop recognition operations.
pub struct RecognitionToggle {
    backend: Arc<dyn MeetingBackend>,
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<dyn IntentStore>,
    intent_key: IntentKey,
}

impl RecognitionToggle {
    pub fn new(
        backend: Arc<dyn MeetingBackend>,
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<dyn IntentStore>,
        intent_key: IntentKey,
    ) -> Self {
        Self {
            backend,
            coordinator,
            store,
            intent_key,
        }
    }

    pub fn intent_key(&self) -> &IntentKey {
        &self.intent_key
    }

    /// Any stored entry means requested; a missing one means not.
    pub fn get_requested(&self) -> Result<bool> {
        Ok(self.store.get(self.intent_key.as_str())?.is_some())
    }

    /// Record the intent, ask the backend to follow it, then refresh once
    /// whatever the backend said. A backend failure is returned after the
    /// refresh so the view already shows the real recognition state.
    pub async fn set_requested(&self, requested: bool) -> Result<()> {
        if self.coordinator.is_detached() {
            return Err(SessionError::precondition("the session view is closed"));
        }
        let code = self
            .coordinator
            .snapshot()
            .session
            .map(|session| session.code)
            .ok_or_else(|| SessionError::precondition("meeting detail is not loaded yet"))?;

        if requested {
            self.store.set(self.intent_key.as_str(), REQUESTED)?;
        } else {
            self.store.remove(self.intent_key.as_str())?;
        }
        self.coordinator.set_intent(requested);

        let outcome = if requested {
            self.backend.start_recognition(&code).await
        } else {
            self.backend.stop_recognition(&code).await
        };
        match &outcome {
            Ok(()) => log::info!(
                "Recognition {} for {}",
                if requested { "started" } else { "stopped" },
                code
            ),
            Err(e) => log::warn!(
                "Recognition {} failed for {}: {}",
                if requested { "start" } else { "stop" },
                code,
                e
            ),
        }

        self.coordinator.refresh_now(RefreshScope::All).await;
        outcome
    }
}
