use crate::error::{Result, SessionError};
use crate::push::packet::{decode_payload, encode_payload, EnginePacket, Handshake, SocketPacket};
use crate::push::transport::{BrokerEvent, Emit, LinkGuard, PushLink, PushTransport};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::sync::mpsc;

/// Socket.IO client over Engine.IO long-polling.
///
/// Polling keeps the transport on plain HTTP, so it shares the backend's
/// HTTP stack and works through proxies that refuse upgrades.
#[derive(Clone)]
pub struct PollingTransport {
    client: Client,
    endpoint: Url,
}

impl PollingTransport {
    /// `timeout` bounds the handshake and every write; long polls use the
    /// broker's own ping window instead.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| SessionError::Channel(format!("Invalid push endpoint '{}': {}", endpoint, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SessionError::Channel(format!("Push endpoint '{}' cannot be a base", endpoint)))?;
            path.pop_if_empty().push("socket.io").push("");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Channel(format!("Failed to build push client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: url,
        })
    }

    fn session_url(&self, sid: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("EIO", "4")
                .append_pair("transport", "polling")
                .append_pair("t", &uuid::Uuid::new_v4().simple().to_string()[..8]);
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }
        url
    }

    async fn handshake(&self) -> Result<Handshake> {
        let body = self
            .client
            .get(self.session_url(None))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SessionError::Channel(format!("Handshake failed: {}", e)))?
            .text()
            .await?;

        match decode_payload(&body)?.into_iter().next() {
            Some(EnginePacket::Open(handshake)) => Ok(handshake),
            other => Err(SessionError::Channel(format!(
                "Expected open packet, got {:?}",
                other
            ))),
        }
    }
}

async fn post_packets(client: &Client, url: Url, packets: &[EnginePacket]) -> Result<()> {
    client
        .post(url)
        .header("content-type", "text/plain;charset=UTF-8")
        .body(encode_payload(packets))
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| SessionError::Channel(format!("Post failed: {}", e)))?;
    Ok(())
}

fn broker_event(packet: SocketPacket) -> Option<BrokerEvent> {
    match packet {
        SocketPacket::Connect(_) => Some(BrokerEvent::Connected),
        SocketPacket::Event { name, args } => Some(BrokerEvent::Event { name, args }),
        SocketPacket::Disconnect => Some(BrokerEvent::Disconnected(
            "server closed the namespace".to_string(),
        )),
        SocketPacket::ConnectError(data) => Some(BrokerEvent::Disconnected(format!(
            "connect error: {}",
            data
        ))),
    }
}

#[async_trait]
impl PushTransport for PollingTransport {
    async fn connect(&self) -> Result<PushLink> {
        let handshake = self.handshake().await?;
        let sid = handshake.sid.clone();
        log::info!(
            "Push transport open (sid: {}, ping every {}ms)",
            sid,
            handshake.ping_interval
        );

        // join the default namespace
        post_packets(
            &self.client,
            self.session_url(Some(&sid)),
            &[EnginePacket::Message(SocketPacket::Connect(None).encode())],
        )
        .await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel::<BrokerEvent>();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Emit>();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<EnginePacket>();

        let poll_timeout = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);

        let reader = {
            let transport = self.clone();
            let sid = sid.clone();
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                loop {
                    let response = transport
                        .client
                        .get(transport.session_url(Some(&sid)))
                        .timeout(poll_timeout)
                        .send()
                        .await
                        .and_then(|r| r.error_for_status());
                    let body = match response {
                        Ok(r) => match r.text().await {
                            Ok(body) => body,
                            Err(e) => {
                                let _ = events_tx.send(BrokerEvent::Disconnected(e.to_string()));
                                break;
                            }
                        },
                        Err(e) => {
                            let _ = events_tx.send(BrokerEvent::Disconnected(e.to_string()));
                            break;
                        }
                    };

                    let packets = match decode_payload(&body) {
                        Ok(packets) => packets,
                        Err(e) => {
                            log::warn!("Dropping undecodable poll payload: {}", e);
                            continue;
                        }
                    };

                    for packet in packets {
                        match packet {
                            EnginePacket::Ping(data) => {
                                let _ = control_tx.send(EnginePacket::Pong(data));
                            }
                            EnginePacket::Message(raw) => match SocketPacket::decode(&raw) {
                                Ok(socket_packet) => {
                                    if let Some(event) = broker_event(socket_packet) {
                                        if events_tx.send(event).is_err() {
                                            return;
                                        }
                                    }
                                }
                                Err(e) => log::debug!("Ignoring socket packet '{}': {}", raw, e),
                            },
                            EnginePacket::Close => {
                                let _ = events_tx
                                    .send(BrokerEvent::Disconnected("transport closed".to_string()));
                                return;
                            }
                            _ => {}
                        }
                    }

                    if events_tx.is_closed() {
                        break;
                    }
                }
            })
        };

        let writer = {
            let transport = self.clone();
            tokio::spawn(async move {
                loop {
                    let packet = tokio::select! {
                        Some(emit) = outbound_rx.recv() => {
                            let socket_packet = SocketPacket::event(&emit.event, emit.payload);
                            EnginePacket::Message(socket_packet.encode())
                        }
                        Some(control) = control_rx.recv() => control,
                        else => break,
                    };
                    if let Err(e) =
                        post_packets(&transport.client, transport.session_url(Some(&sid)), &[packet]).await
                    {
                        log::warn!("Push transport write failed: {}", e);
                        let _ = events_tx.send(BrokerEvent::Disconnected(e.to_string()));
                        break;
                    }
                }
            })
        };

        Ok(PushLink {
            events: events_rx,
            outbound: outbound_tx,
            guard: LinkGuard::new(vec![reader, writer]),
        })
    }
}
