use crate::error::{Result, SessionError};
use crate::integrations::MeetingBackend;
use crate::managers::channel_sync::ChannelSync;
use crate::managers::refresh::{FetchKind, FetchOutcome, RefreshCoordinator, RefreshScope};
use crate::meeting::{LifecycleState, Session};
use crate::storage::{IntentKey, IntentStore};
use std::sync::Arc;

/// Mediates the lifecycle transitions a view may request.
///
/// Local state is never changed optimistically: every successful backend
/// call is followed by a refresh, and the returned `Session` is whatever
/// that refresh confirmed.
pub struct LifecycleController {
    backend: Arc<dyn MeetingBackend>,
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<dyn IntentStore>,
    intent_key: IntentKey,
    sync: Arc<ChannelSync>,
}

impl LifecycleController {
    pub fn new(
        backend: Arc<dyn MeetingBackend>,
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<dyn IntentStore>,
        intent_key: IntentKey,
        sync: Arc<ChannelSync>,
    ) -> Self {
        Self {
            backend,
            coordinator,
            store,
            intent_key,
            sync,
        }
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.coordinator.is_detached() {
            return Err(SessionError::precondition("the session view is closed"));
        }
        Ok(())
    }

    fn current_lifecycle(&self) -> Option<LifecycleState> {
        self.coordinator.snapshot().lifecycle()
    }

    /// Start the meeting. Rejected once the meeting has ended.
    pub async fn request_start(&self) -> Result<Session> {
        self.ensure_mounted()?;
        if self.current_lifecycle() == Some(LifecycleState::Ended) {
            return Err(SessionError::precondition(
                "cannot start a meeting that has already ended",
            ));
        }

        let meeting_id = &self.coordinator.key().meeting_id;
        self.backend.set_session_status(meeting_id, true, false).await?;
        log::info!("Start requested for meeting {}", meeting_id);
        self.confirmed_session().await
    }

    /// End the meeting. Irreversible, so the caller must have confirmed.
    ///
    /// # Arguments
    /// * `confirmed` - whether the user accepted the confirmation prompt
    pub async fn request_end(&self, confirmed: bool) -> Result<Session> {
        self.ensure_mounted()?;
        if !confirmed {
            return Err(SessionError::precondition(
                "ending a meeting requires confirmation",
            ));
        }
        match self.current_lifecycle() {
            Some(LifecycleState::Started) => {}
            Some(other) => {
                return Err(SessionError::precondition(format!(
                    "only a started meeting can be ended (meeting is {})",
                    other
                )))
            }
            None => {
                return Err(SessionError::precondition(
                    "meeting detail is not loaded yet",
                ))
            }
        }

        let meeting_id = &self.coordinator.key().meeting_id;
        self.backend.set_session_status(meeting_id, true, true).await?;
        log::info!("End requested for meeting {}", meeting_id);
        self.confirmed_session().await
    }

    /// Delete the meeting, forget its recognition intent and tear the
    /// view down. Nothing is applied to this view afterwards.
    pub async fn request_delete(&self, confirmed: bool) -> Result<()> {
        self.ensure_mounted()?;
        if !confirmed {
            return Err(SessionError::precondition(
                "deleting a meeting requires confirmation",
            ));
        }

        let meeting_id = &self.coordinator.key().meeting_id;
        self.backend.remove_session(meeting_id).await?;
        log::info!("Meeting {} deleted", meeting_id);

        let cleared = self.store.remove(self.intent_key.as_str());
        self.coordinator.set_intent(false);
        self.coordinator.detach();
        self.sync.close();

        // the meeting is gone either way; report the leftover intent entry
        cleared.map_err(|e| {
            log::error!(
                "Failed to clear recognition intent {}: {}",
                self.intent_key.as_str(),
                e
            );
            e
        })
    }

    async fn confirmed_session(&self) -> Result<Session> {
        let report = self.coordinator.refresh_now(RefreshScope::All).await;
        if let Some(FetchOutcome::Failed(message)) = report.outcome(FetchKind::Detail) {
            return Err(SessionError::Network(message.clone()));
        }
        self.coordinator
            .snapshot()
            .session
            .ok_or_else(|| SessionError::Network("meeting detail unavailable".to_string()))
    }
}
