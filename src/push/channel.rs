use crate::error::{Result, SessionError};
use crate::meeting::Session;
use crate::push::transport::{BrokerEvent, Emit, LinkGuard, PushTransport};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notifications a view can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    ParticipantJoined,
    RecognitionDataAdded,
}

impl ChannelEvent {
    pub fn wire_name(self) -> &'static str {
        match self {
            ChannelEvent::ParticipantJoined => "USER_JOINED",
            ChannelEvent::RecognitionDataAdded => "RECOGNITION_DATA_ADDED",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "USER_JOINED" => Some(ChannelEvent::ParticipantJoined),
            "RECOGNITION_DATA_ADDED" => Some(ChannelEvent::RecognitionDataAdded),
            _ => None,
        }
    }
}

/// Broker room a view listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Room {
    Meeting { code: String },
    Participant { code: String, participant_id: String },
}

impl Room {
    pub fn for_session(session: &Session) -> Self {
        match &session.key.participant_id {
            Some(participant_id) => Room::Participant {
                code: session.code.clone(),
                participant_id: participant_id.clone(),
            },
            None => Room::Meeting {
                code: session.code.clone(),
            },
        }
    }

    pub fn id(&self) -> String {
        match self {
            Room::Meeting { code } => code.clone(),
            Room::Participant {
                code,
                participant_id,
            } => format!("{}-{}", code, participant_id),
        }
    }

    /// Meeting rooms are joined with `joinMeeting`, per-user rooms with `join`.
    pub fn join_event(&self) -> &'static str {
        match self {
            Room::Meeting { .. } => "joinMeeting",
            Room::Participant { .. } => "join",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Closed,
    Connecting,
    Connected,
    /// Connection failed or dropped; the view runs on REST only
    Degraded,
}

/// Proof of one `open`. Pass it back to `close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    id: u64,
    room: Room,
}

impl ChannelHandle {
    pub fn room(&self) -> &Room {
        &self.room
    }
}

pub type EventHandler = Arc<dyn Fn() + Send + Sync>;
pub type StatusListener = Arc<dyn Fn(ChannelStatus) + Send + Sync>;

struct ActiveLink {
    handle: ChannelHandle,
    dispatcher: JoinHandle<()>,
    _guard: LinkGuard,
}

#[derive(Default)]
struct ChannelState {
    active: Option<ActiveLink>,
    handlers: HashMap<ChannelEvent, EventHandler>,
    joins: u64,
    next_handle: u64,
    /// Set by `close`; a closed channel never reopens
    retired: bool,
}

struct Shared {
    state: Mutex<ChannelState>,
    status_listener: Option<StatusListener>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        // Handlers never run under the lock, so poisoning means a bug in
        // this module; keep serving the inner state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn report(&self, status: ChannelStatus) {
        if let Some(listener) = &self.status_listener {
            listener(status);
        }
    }
}

/// Push channel client: one broker connection per view.
pub struct PushChannel {
    transport: Arc<dyn PushTransport>,
    open_lock: tokio::sync::Mutex<()>,
    shared: Arc<Shared>,
}

impl PushChannel {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self::with_status_listener(transport, None)
    }

    pub fn with_status_listener(
        transport: Arc<dyn PushTransport>,
        status_listener: Option<StatusListener>,
    ) -> Self {
        Self {
            transport,
            open_lock: tokio::sync::Mutex::new(()),
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::default()),
                status_listener,
            }),
        }
    }

    /// Connect and join `room`.
    ///
    /// Idempotent while open: a second call for the same room returns the
    /// existing handle without touching the broker. Concurrent calls are
    /// serialized, so racing refreshes cannot create two connections. A
    /// link the broker dropped no longer counts as open, so the next call
    /// reconnects and keeps the registered handlers.
    pub async fn open(&self, room: Room) -> Result<ChannelHandle> {
        let _opening = self.open_lock.lock().await;

        {
            let state = self.shared.lock();
            if state.retired {
                return Err(SessionError::Channel("channel already closed".to_string()));
            }
            if let Some(active) = &state.active {
                if active.handle.room == room {
                    log::debug!("Push channel already open for room {}", room.id());
                    return Ok(active.handle.clone());
                }
                return Err(SessionError::Channel(format!(
                    "channel is bound to room {}, not {}",
                    active.handle.room.id(),
                    room.id()
                )));
            }
        }

        self.shared.report(ChannelStatus::Connecting);
        let link = match self.transport.connect().await {
            Ok(link) => link,
            Err(e) => {
                log::warn!("Push channel unavailable, continuing without it: {}", e);
                self.shared.report(ChannelStatus::Degraded);
                return Err(SessionError::Channel(e.to_string()));
            }
        };

        let mut state = self.shared.lock();
        if state.retired {
            // closed while connecting; dropping the link tears it down
            return Err(SessionError::Channel("channel closed while connecting".to_string()));
        }

        state.next_handle += 1;
        let handle = ChannelHandle {
            id: state.next_handle,
            room: room.clone(),
        };
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&self.shared),
            link.events,
            link.outbound,
            handle.clone(),
        ));
        state.active = Some(ActiveLink {
            handle: handle.clone(),
            dispatcher,
            _guard: link.guard,
        });

        log::info!("Push channel opened for room {}", room.id());
        Ok(handle)
    }

    /// Register the handler for `event`, replacing any previous one.
    /// Returns true if no handler was registered before.
    pub fn subscribe(&self, event: ChannelEvent, handler: EventHandler) -> bool {
        let mut state = self.shared.lock();
        if state.retired {
            return false;
        }
        let fresh = state.handlers.insert(event, handler).is_none();
        if fresh {
            log::debug!("Subscribed to {}", event.wire_name());
        }
        fresh
    }

    /// Returns true if a handler was removed.
    pub fn unsubscribe(&self, event: ChannelEvent) -> bool {
        let removed = self.shared.lock().handlers.remove(&event).is_some();
        if removed {
            log::debug!("Unsubscribed from {}", event.wire_name());
        }
        removed
    }

    pub fn is_subscribed(&self, event: ChannelEvent) -> bool {
        self.shared.lock().handlers.contains_key(&event)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.lock().handlers.len()
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// Room announcements sent on this channel so far, across reconnects.
    pub fn join_count(&self) -> u64 {
        self.shared.lock().joins
    }

    /// Tear down the connection behind `handle` and drop all handlers.
    ///
    /// Returns false (and does nothing) for a stale or repeated handle.
    pub fn close(&self, handle: &ChannelHandle) -> bool {
        let active = {
            let mut state = self.shared.lock();
            let is_current = matches!(&state.active, Some(active) if active.handle.id == handle.id);
            if !is_current {
                log::warn!(
                    "Ignoring close for room {}: handle is not open",
                    handle.room.id()
                );
                return false;
            }
            state.retired = true;
            state.handlers.clear();
            state.active.take()
        };

        if let Some(active) = active {
            active.dispatcher.abort();
            log::info!("Push channel closed for room {}", active.handle.room.id());
        }
        self.shared.report(ChannelStatus::Closed);
        true
    }

    /// Close whatever is open and refuse future opens.
    pub fn shutdown(&self) {
        let handle = {
            let mut state = self.shared.lock();
            let handle = state.active.as_ref().map(|active| active.handle.clone());
            if handle.is_none() {
                state.retired = true;
                state.handlers.clear();
            }
            handle
        };
        if let Some(handle) = handle {
            self.close(&handle);
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<BrokerEvent>,
    outbound: mpsc::UnboundedSender<Emit>,
    handle: ChannelHandle,
) {
    let room = &handle.room;
    while let Some(event) = events.recv().await {
        match event {
            BrokerEvent::Connected => {
                let emit = Emit {
                    event: room.join_event().to_string(),
                    payload: Value::String(room.id()),
                };
                if outbound.send(emit).is_err() {
                    break;
                }
                shared.lock().joins += 1;
                shared.report(ChannelStatus::Connected);
                log::info!("Joined room {} ({})", room.id(), room.join_event());
            }
            BrokerEvent::Event { name, .. } => {
                let Some(kind) = ChannelEvent::from_wire(&name) else {
                    log::debug!("Ignoring broker event {}", name);
                    continue;
                };
                let handler = shared.lock().handlers.get(&kind).cloned();
                match handler {
                    Some(handler) => handler(),
                    None => log::debug!("No handler for {}", name),
                }
            }
            BrokerEvent::Disconnected(reason) => {
                log::warn!("Push channel for room {} dropped: {}", room.id(), reason);
                break;
            }
        }
    }

    // The link is gone. Forget it, unless `close` already did, so the next
    // open reconnects; handlers stay registered for the new link.
    let dropped = {
        let mut state = shared.lock();
        let is_current = matches!(&state.active, Some(active) if active.handle.id == handle.id);
        if is_current {
            state.active.take()
        } else {
            None
        }
    };
    if dropped.is_some() {
        shared.report(ChannelStatus::Degraded);
    }
    log::debug!("Dispatcher for room {} finished", room.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::transport::PushLink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct LoopbackTransport {
        connects: AtomicUsize,
        peers: Mutex<Vec<(mpsc::UnboundedSender<BrokerEvent>, mpsc::UnboundedReceiver<Emit>)>>,
    }

    #[async_trait]
    impl PushTransport for LoopbackTransport {
        async fn connect(&self) -> Result<PushLink> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            self.peers.lock().unwrap().push((events_tx, outbound_rx));
            Ok(PushLink {
                events: events_rx,
                outbound: outbound_tx,
                guard: LinkGuard::default(),
            })
        }
    }

    fn meeting_room() -> Room {
        Room::Meeting {
            code: "C0DE".to_string(),
        }
    }

    #[test]
    fn test_room_ids() {
        assert_eq!(meeting_room().id(), "C0DE");
        assert_eq!(meeting_room().join_event(), "joinMeeting");
        let room = Room::Participant {
            code: "C0DE".to_string(),
            participant_id: "u1".to_string(),
        };
        assert_eq!(room.id(), "C0DE-u1");
        assert_eq!(room.join_event(), "join");
    }

    #[tokio::test]
    async fn test_open_twice_connects_once() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport.clone());

        let first = channel.open(meeting_room()).await.unwrap();
        let second = channel.open(meeting_room()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_announced_on_connect() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport.clone());
        channel.open(meeting_room()).await.unwrap();

        let (events_tx, mut emits) = transport.peers.lock().unwrap().pop().unwrap();
        events_tx.send(BrokerEvent::Connected).unwrap();

        let emit = emits.recv().await.unwrap();
        assert_eq!(emit.event, "joinMeeting");
        assert_eq!(emit.payload, Value::String("C0DE".to_string()));
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_handler() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport);
        let noop: EventHandler = Arc::new(|| {});

        assert!(channel.subscribe(ChannelEvent::ParticipantJoined, noop.clone()));
        assert!(!channel.subscribe(ChannelEvent::ParticipantJoined, noop));
        assert_eq!(channel.handler_count(), 1);
        assert!(channel.unsubscribe(ChannelEvent::ParticipantJoined));
        assert!(!channel.unsubscribe(ChannelEvent::ParticipantJoined));
    }

    #[tokio::test]
    async fn test_close_is_single_shot() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport);
        let handle = channel.open(meeting_room()).await.unwrap();
        channel.subscribe(ChannelEvent::RecognitionDataAdded, Arc::new(|| {}));

        assert!(channel.close(&handle));
        assert!(!channel.close(&handle));
        assert!(!channel.is_open());
        assert_eq!(channel.handler_count(), 0);
        assert!(channel.open(meeting_room()).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_link_reconnects_with_handlers() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport.clone());
        let first = channel.open(meeting_room()).await.unwrap();
        channel.subscribe(ChannelEvent::RecognitionDataAdded, Arc::new(|| {}));

        let (events_tx, _emits) = transport.peers.lock().unwrap().pop().unwrap();
        events_tx
            .send(BrokerEvent::Disconnected("net blip".to_string()))
            .unwrap();
        for _ in 0..100 {
            if !channel.is_open() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!channel.is_open());
        assert!(!channel.close(&first));

        let second = channel.open(meeting_room()).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert!(channel.is_subscribed(ChannelEvent::RecognitionDataAdded));
        assert!(channel.close(&second));
    }

    #[tokio::test]
    async fn test_other_room_is_rejected_while_open() {
        let transport = Arc::new(LoopbackTransport::default());
        let channel = PushChannel::new(transport);
        channel.open(meeting_room()).await.unwrap();
        let err = channel
            .open(Room::Meeting {
                code: "OTHER".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Channel(_)));
    }
}
