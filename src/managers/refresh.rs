use crate::integrations::MeetingBackend;
use crate::meeting::{LifecycleState, Participant, RecognitionProjection, Session, SessionKey};
use crate::push::ChannelStatus;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything the presentation layer renders for one view.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    /// Client-side recognition intent, independent of backend truth
    pub intent: bool,
    pub participants: Vec<Participant>,
    pub projection: Option<RecognitionProjection>,
    pub channel: ChannelStatus,
}

impl SessionSnapshot {
    pub fn lifecycle(&self) -> Option<LifecycleState> {
        self.session.as_ref().map(|s| s.lifecycle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Detail,
    Recognition,
    ParticipantRecognition,
    Roster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Applied,
    /// A response with a higher sequence number was already applied
    Stale,
    Failed(String),
    /// Not attempted (e.g. no projection before the meeting starts)
    Skipped,
    /// Arrived after the view was torn down
    Discarded,
}

/// Per-kind outcome of one refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub outcomes: Vec<(FetchKind, FetchOutcome)>,
}

impl RefreshReport {
    pub fn outcome(&self, kind: FetchKind) -> Option<&FetchOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// Detail, projection and (for meeting views) roster
    All,
    Roster,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshConfig {
    /// Stream cap for meeting views
    pub recognition_limit: Option<u32>,
    /// Stream cap for drill-down views
    pub participant_limit: Option<u32>,
}

/// Told whenever a fresher session detail has been applied. Runs inside
/// the refresh, so implementations must not wait on the network.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    async fn session_applied(&self, session: &Session);
}

#[derive(Default)]
struct Sequencing {
    issued: HashMap<FetchKind, u64>,
    applied: HashMap<FetchKind, u64>,
    detached: bool,
}

impl Sequencing {
    fn issue(&mut self, kind: FetchKind) -> u64 {
        let next = self.issued.entry(kind).or_insert(0);
        *next += 1;
        *next
    }

    /// Accept `seq` only if nothing newer was applied for `kind`.
    fn admit(&mut self, kind: FetchKind, seq: u64) -> bool {
        let applied = self.applied.entry(kind).or_insert(0);
        if seq > *applied {
            *applied = seq;
            true
        } else {
            false
        }
    }
}

/// Fetches and merges the state of one view.
///
/// Each fetch kind carries its own request sequence number; a response is
/// applied only if no higher-numbered response of the same kind has been
/// applied already, so out-of-order completion never regresses the state.
pub struct RefreshCoordinator {
    key: SessionKey,
    backend: Arc<dyn MeetingBackend>,
    config: RefreshConfig,
    sequencing: Mutex<Sequencing>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    listener: Mutex<Option<Arc<dyn LifecycleListener>>>,
}

impl RefreshCoordinator {
    pub fn new(key: SessionKey, backend: Arc<dyn MeetingBackend>, config: RefreshConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            key,
            backend,
            config,
            sequencing: Mutex::new(Sequencing::default()),
            snapshot_tx,
            listener: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn set_listener(&self, listener: Arc<dyn LifecycleListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }

    /// Stop applying results. In-flight responses are discarded on arrival.
    pub fn detach(&self) {
        let mut sequencing = self.lock();
        if !sequencing.detached {
            sequencing.detached = true;
            log::debug!("Refresh coordinator for {} detached", self.key);
        }
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn lock(&self) -> MutexGuard<'_, Sequencing> {
        self.sequencing.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn issue(&self, kind: FetchKind) -> u64 {
        self.lock().issue(kind)
    }

    /// Check sequencing and mutate the snapshot as one step.
    fn apply(
        &self,
        kind: FetchKind,
        seq: u64,
        mutate: impl FnOnce(&mut SessionSnapshot),
    ) -> FetchOutcome {
        let mut sequencing = self.lock();
        if sequencing.detached {
            return FetchOutcome::Discarded;
        }
        if !sequencing.admit(kind, seq) {
            log::debug!("Dropping stale {:?} response #{} for {}", kind, seq, self.key);
            return FetchOutcome::Stale;
        }
        self.snapshot_tx.send_modify(mutate);
        FetchOutcome::Applied
    }

    pub fn set_intent(&self, requested: bool) {
        if self.lock().detached {
            return;
        }
        self.snapshot_tx.send_if_modified(|snapshot| {
            let changed = snapshot.intent != requested;
            snapshot.intent = requested;
            changed
        });
    }

    pub fn set_channel_status(&self, status: ChannelStatus) {
        if self.lock().detached {
            return;
        }
        self.snapshot_tx.send_if_modified(|snapshot| {
            let changed = snapshot.channel != status;
            snapshot.channel = status;
            changed
        });
    }

    /// Fire-and-forget refresh on the current runtime.
    pub fn refresh(self: &Arc<Self>, scope: RefreshScope) -> JoinHandle<RefreshReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_now(scope).await })
    }

    /// Run one refresh inline. Failures are logged and reported, never
    /// returned: each slice keeps its last value when its fetch fails.
    pub async fn refresh_now(&self, scope: RefreshScope) -> RefreshReport {
        if self.is_detached() {
            return RefreshReport::default();
        }

        let with_roster = self.key.participant_id.is_none();
        let mut outcomes = Vec::new();
        match scope {
            RefreshScope::All => {
                let (detail, roster) = futures_util::join!(self.refresh_detail(), async {
                    if with_roster {
                        Some(self.refresh_roster().await)
                    } else {
                        None
                    }
                });
                outcomes.extend(detail);
                outcomes.extend(roster);
            }
            RefreshScope::Roster if with_roster => outcomes.push(self.refresh_roster().await),
            RefreshScope::Roster => outcomes.push((FetchKind::Roster, FetchOutcome::Skipped)),
        }
        RefreshReport { outcomes }
    }

    async fn refresh_detail(&self) -> Vec<(FetchKind, FetchOutcome)> {
        let seq = self.issue(FetchKind::Detail);
        let outcome = match self.backend.get_session_by_id(&self.key.meeting_id).await {
            Ok(detail) => {
                let fetched = Session::from_detail(self.key.clone(), detail);
                self.apply(FetchKind::Detail, seq, |snapshot| {
                    merge_session(snapshot, fetched)
                })
            }
            Err(e) => {
                log::warn!("Failed to fetch meeting {}: {}", self.key.meeting_id, e);
                FetchOutcome::Failed(e.to_string())
            }
        };

        let mut outcomes = vec![(FetchKind::Detail, outcome.clone())];

        let session = self.snapshot().session;
        if outcome == FetchOutcome::Applied {
            let listener = self
                .listener
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let (Some(listener), Some(session)) = (listener, session.as_ref()) {
                listener.session_applied(session).await;
            }
        }

        outcomes.push(self.refresh_projection(session).await);
        outcomes
    }

    async fn refresh_projection(&self, session: Option<Session>) -> (FetchKind, FetchOutcome) {
        let kind = if self.key.participant_id.is_some() {
            FetchKind::ParticipantRecognition
        } else {
            FetchKind::Recognition
        };

        // Projections are meaningless before the meeting starts.
        let Some(session) = session.filter(|s| s.lifecycle != LifecycleState::NotStarted) else {
            return (kind, FetchOutcome::Skipped);
        };
        if self.is_detached() {
            return (kind, FetchOutcome::Discarded);
        }

        let seq = self.issue(kind);
        let result = match &self.key.participant_id {
            Some(participant_id) => {
                self.backend
                    .get_participant_recognition(
                        &session.code,
                        participant_id,
                        self.config.participant_limit,
                    )
                    .await
            }
            None => {
                self.backend
                    .get_recognition(&session.code, self.config.recognition_limit)
                    .await
            }
        };

        let outcome = match result {
            Ok(projection) => self.apply(kind, seq, |snapshot| {
                snapshot.projection = Some(projection);
            }),
            Err(e) => {
                log::warn!("Failed to fetch recognition for {}: {}", session.code, e);
                FetchOutcome::Failed(e.to_string())
            }
        };
        (kind, outcome)
    }

    async fn refresh_roster(&self) -> (FetchKind, FetchOutcome) {
        let seq = self.issue(FetchKind::Roster);
        let outcome = match self.backend.get_participants(&self.key.meeting_id).await {
            Ok(participants) => self.apply(FetchKind::Roster, seq, |snapshot| {
                snapshot.participants = participants;
            }),
            Err(e) => {
                log::warn!(
                    "Failed to fetch participants for {}: {}",
                    self.key.meeting_id,
                    e
                );
                FetchOutcome::Failed(e.to_string())
            }
        };
        (FetchKind::Roster, outcome)
    }
}

/// Replace metadata, keep the lifecycle monotonic.
fn merge_session(snapshot: &mut SessionSnapshot, mut fetched: Session) {
    if let Some(previous) = &snapshot.session {
        let merged = previous.lifecycle.merge(fetched.lifecycle);
        if merged != previous.lifecycle {
            log::info!(
                "Meeting {} moved {} -> {}",
                fetched.key,
                previous.lifecycle,
                merged
            );
        }
        fetched.lifecycle = merged;
    } else {
        log::info!("Meeting {} loaded ({})", fetched.key, fetched.lifecycle);
    }
    snapshot.session = Some(fetched);
}
