#![allow(dead_code)]

use async_trait::async_trait;
use ferdash_app_lib::error::{Result, SessionError};
use ferdash_app_lib::integrations::MeetingBackend;
use ferdash_app_lib::managers::{
    RefreshConfig, SessionServices, SessionView, ViewConfig, ViewRegistry, ViewScope,
};
use ferdash_app_lib::meeting::{MeetingDetail, Participant, RecognitionProjection};
use ferdash_app_lib::push::{BrokerEvent, Emit, LinkGuard, PushLink, PushTransport};
use ferdash_app_lib::storage::{IntentScope, IntentStore, MemoryIntentStore};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub const CODE: &str = "C0DE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetSession,
    SetStatus { started: bool, ended: bool },
    Remove,
    StartRecognition(String),
    StopRecognition(String),
    GetRecognition(Option<u32>),
    GetParticipantRecognition(String),
    GetParticipants,
}

struct RosterGate {
    release: oneshot::Receiver<()>,
    participants: Vec<Participant>,
}

struct BackendState {
    detail: MeetingDetail,
    participants: Vec<Participant>,
    projection: RecognitionProjection,
    roster_gates: VecDeque<RosterGate>,
    failing: HashSet<&'static str>,
}

/// In-memory backend. Status changes are applied to the stored detail, the
/// way the real service would; roster answers can be held back with gates.
pub struct ScriptedBackend {
    state: Mutex<BackendState>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new(is_start: bool, is_ended: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                detail: MeetingDetail {
                    id: "M1".to_string(),
                    name: "Algebra".to_string(),
                    code: CODE.to_string(),
                    link: "https://meet.example/C0DE".to_string(),
                    is_start,
                    is_ended,
                    ..Default::default()
                },
                participants: participants(2),
                projection: projection(json!({ "happy": 3 }), json!({ "dominant": "happy" }), json!([1, 2])),
                roster_gates: VecDeque::new(),
                failing: HashSet::new(),
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_projection(&self, projection: RecognitionProjection) {
        self.state.lock().unwrap().projection = projection;
    }

    pub fn set_participants(&self, participants: Vec<Participant>) {
        self.state.lock().unwrap().participants = participants;
    }

    pub fn set_flags(&self, is_start: bool, is_ended: bool) {
        let mut state = self.state.lock().unwrap();
        state.detail.is_start = is_start;
        state.detail.is_ended = is_ended;
    }

    /// Make the named operation fail until `heal` is called.
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.remove(operation);
    }

    /// The next roster request answers `participants`, but only once the
    /// returned sender fires.
    pub fn gate_roster(&self, participants: Vec<Participant>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().roster_gates.push_back(RosterGate {
            release: rx,
            participants,
        });
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn session_fetches(&self) -> usize {
        self.count(|c| *c == Call::GetSession)
    }

    pub fn roster_fetches(&self) -> usize {
        self.count(|c| *c == Call::GetParticipants)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.state.lock().unwrap().failing.contains(operation) {
            Err(SessionError::Network(format!("{} unavailable", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MeetingBackend for ScriptedBackend {
    async fn get_session_by_id(&self, _meeting_id: &str) -> Result<MeetingDetail> {
        self.record(Call::GetSession);
        self.check("get_session")?;
        Ok(self.state.lock().unwrap().detail.clone())
    }

    async fn set_session_status(&self, _meeting_id: &str, started: bool, ended: bool) -> Result<()> {
        self.record(Call::SetStatus { started, ended });
        self.check("set_status")?;
        self.set_flags(started, ended);
        Ok(())
    }

    async fn remove_session(&self, _meeting_id: &str) -> Result<()> {
        self.record(Call::Remove);
        self.check("remove")
    }

    async fn start_recognition(&self, code: &str) -> Result<()> {
        self.record(Call::StartRecognition(code.to_string()));
        self.check("start_recognition")
    }

    async fn stop_recognition(&self, code: &str) -> Result<()> {
        self.record(Call::StopRecognition(code.to_string()));
        self.check("stop_recognition")
    }

    async fn get_recognition(&self, _code: &str, limit: Option<u32>) -> Result<RecognitionProjection> {
        self.record(Call::GetRecognition(limit));
        self.check("recognition")?;
        Ok(self.state.lock().unwrap().projection.clone())
    }

    async fn get_participant_recognition(
        &self,
        _code: &str,
        participant_id: &str,
        _limit: Option<u32>,
    ) -> Result<RecognitionProjection> {
        self.record(Call::GetParticipantRecognition(participant_id.to_string()));
        self.check("recognition")?;
        Ok(self.state.lock().unwrap().projection.clone())
    }

    async fn get_participants(&self, _meeting_id: &str) -> Result<Vec<Participant>> {
        let gate = self.state.lock().unwrap().roster_gates.pop_front();
        self.record(Call::GetParticipants);
        if let Some(gate) = gate {
            let _ = gate.release.await;
            return Ok(gate.participants);
        }
        self.check("roster")?;
        Ok(self.state.lock().unwrap().participants.clone())
    }
}

struct Peer {
    events: mpsc::UnboundedSender<BrokerEvent>,
    emits: Option<mpsc::UnboundedReceiver<Emit>>,
}

/// Push transport whose broker side is driven by the test.
#[derive(Default)]
pub struct FakeTransport {
    connects: AtomicUsize,
    refuse: AtomicBool,
    stall: AtomicBool,
    peers: Mutex<Vec<Peer>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        let transport = Self::default();
        transport.refuse.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Accepts the connection attempt and never answers.
    pub fn stalled() -> Arc<Self> {
        let transport = Self::default();
        transport.stall.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn links(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Wait until `n` connections have been handed out.
    pub async fn wait_for_links(&self, n: usize) {
        eventually(|| self.links() >= n).await;
    }

    /// Deliver a broker event on the most recent connection.
    pub fn deliver(&self, event: BrokerEvent) {
        let peers = self.peers.lock().unwrap();
        let peer = peers.last().expect("no connection was opened");
        // the view may already be gone; that is what some tests check
        let _ = peer.events.send(event);
    }

    pub fn broadcast(&self, name: &str) {
        self.deliver(BrokerEvent::Event {
            name: name.to_string(),
            args: vec![Value::Null],
        });
    }

    /// Outbound half of the most recent connection.
    pub fn take_emits(&self) -> mpsc::UnboundedReceiver<Emit> {
        self.peers
            .lock()
            .unwrap()
            .last_mut()
            .and_then(|peer| peer.emits.take())
            .expect("emits already taken or no connection")
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self) -> Result<PushLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Channel("broker unreachable".to_string()));
        }
        if self.stall.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(Peer {
            events: events_tx,
            emits: Some(outbound_rx),
        });
        Ok(PushLink {
            events: events_rx,
            outbound: outbound_tx,
            guard: LinkGuard::default(),
        })
    }
}

pub fn participants(n: usize) -> Vec<Participant> {
    (1..=n)
        .map(|i| Participant {
            id: format!("p{}", i),
            display_name: format!("Participant {}", i),
            joined_at: None,
        })
        .collect()
}

pub fn projection(overview: Value, summary: Value, stream: Value) -> RecognitionProjection {
    RecognitionProjection {
        overview,
        summary,
        stream,
    }
}

pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub transport: Arc<FakeTransport>,
    pub store: Arc<dyn IntentStore>,
}

impl Harness {
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self::with_parts(backend, FakeTransport::new(), Arc::new(MemoryIntentStore::new()))
    }

    pub fn with_parts(
        backend: Arc<ScriptedBackend>,
        transport: Arc<FakeTransport>,
        store: Arc<dyn IntentStore>,
    ) -> Self {
        Self {
            backend,
            transport,
            store,
        }
    }

    pub fn services(&self) -> SessionServices {
        SessionServices {
            backend: self.backend.clone(),
            store: self.store.clone(),
            transport: self.transport.clone(),
        }
    }

    pub fn refresh_config() -> RefreshConfig {
        RefreshConfig {
            recognition_limit: Some(10),
            participant_limit: None,
        }
    }

    pub async fn mount(&self, scope: ViewScope) -> SessionView {
        SessionView::mount(
            ViewConfig {
                meeting_id: "M1".to_string(),
                scope,
                intent_scope: IntentScope::Meeting,
                refresh: Self::refresh_config(),
            },
            self.services(),
        )
        .await
    }

    pub fn registry(&self) -> ViewRegistry {
        ViewRegistry::new(self.services(), Self::refresh_config())
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give spawned work a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}
