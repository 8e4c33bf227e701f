pub mod channel;
pub mod packet;
pub mod polling;
pub mod transport;

pub use channel::{ChannelEvent, ChannelHandle, ChannelStatus, EventHandler, PushChannel, Room};
pub use polling::PollingTransport;
pub use transport::{BrokerEvent, Emit, LinkGuard, PushLink, PushTransport};
