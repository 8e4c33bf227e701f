use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the broker delivered to this connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// The socket (re)connected to the default namespace
    Connected,
    Event { name: String, args: Vec<Value> },
    /// The connection is gone; no further events follow
    Disconnected(String),
}

/// An outbound `emit(event, payload)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emit {
    pub event: String,
    pub payload: Value,
}

/// Aborts the transport's background tasks when dropped.
#[derive(Default)]
pub struct LinkGuard {
    tasks: Vec<JoinHandle<()>>,
}

impl LinkGuard {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// One live broker connection.
pub struct PushLink {
    pub events: mpsc::UnboundedReceiver<BrokerEvent>,
    pub outbound: mpsc::UnboundedSender<Emit>,
    pub guard: LinkGuard,
}

/// Opens connections to the push broker.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<PushLink>;
}
