//! WebSocket relay with one room per live event.
//!
//! Architecture:
//! ```text
//! Driver ──┐                               ┌──► Driver (echo)
//!          ├── Room (event_id) ── BroadcastGroup ──► Stage screen
//! Stage  ──┘        │                      └──► Confidence monitor
//!                   │
//!                   └── RetainedTopics (last song, last lyric)
//!                          │
//!                          └──► replay on request_current_state
//! ```
//!
//! The relay never interprets slide state. It checks the join token,
//! fans topic frames out in the order it read them, keeps the latest
//! replayable frame per topic, and answers the handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use worship_core::EventId;

use crate::broadcast::{BroadcastGroup, RoomManager};
use crate::protocol::{MessageType, PeerInfo, SyncMessage};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Joins beyond this are closed without a reply
    pub max_peers_per_room: usize,
    /// Frames buffered per peer before it starts lagging
    pub broadcast_capacity: usize,
    /// Accepted bearer tokens. Empty accepts any token.
    pub allowed_tokens: Vec<String>,
    /// Events whose last song and lyric are kept after their room empties
    pub max_retained_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
            allowed_tokens: Vec::new(),
            max_retained_events: 1024,
        }
    }
}

impl ServerConfig {
    pub fn accepts(&self, token: &str) -> bool {
        self.allowed_tokens.is_empty() || self.allowed_tokens.iter().any(|t| t == token)
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub rejected_joins: u64,
}

/// A peer that completed `join`.
struct Membership {
    peer: PeerInfo,
    event_id: EventId,
    room: Arc<BroadcastGroup>,
    frames: broadcast::Receiver<Arc<Vec<u8>>>,
}

type ConnResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let rooms = Arc::new(RoomManager::new(
            config.broadcast_capacity,
            config.max_retained_events,
        ));
        Self {
            config,
            rooms,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let config = self.config.clone();
            let rooms = self.rooms.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, config, rooms, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        config: ServerConfig,
        rooms: Arc<RoomManager>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> ConnResult<()> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut member: Option<Membership> = None;
        let result = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += bytes.len() as u64;
                            }
                            let sync_msg = match SyncMessage::decode(&bytes) {
                                Ok(m) => m,
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                    continue;
                                }
                            };

                            match sync_msg.msg_type {
                                MessageType::Join => {
                                    if member.is_some() {
                                        log::debug!("Duplicate join from {addr} ignored");
                                        continue;
                                    }
                                    match Self::join(&sync_msg, &config, &rooms, &stats).await {
                                        JoinOutcome::Joined(m) => member = Some(m),
                                        JoinOutcome::Rejected(reason) => {
                                            let reply = SyncMessage::auth_rejected(sync_msg.event_id, reason)?;
                                            ws_sender.send(Message::Binary(reply.encode()?.into())).await?;
                                            ws_sender.send(Message::Close(None)).await?;
                                            break;
                                        }
                                        JoinOutcome::RoomFull => {
                                            ws_sender.send(Message::Close(None)).await?;
                                            break;
                                        }
                                    }
                                }

                                MessageType::Ping => {
                                    let pong = SyncMessage::pong(sync_msg.peer_id);
                                    ws_sender.send(Message::Binary(pong.encode()?.into())).await?;
                                }

                                _ => {
                                    let Some(m) = member.as_ref() else {
                                        log::debug!(
                                            "Dropping {} from {addr} before join",
                                            sync_msg.msg_type.wire_name()
                                        );
                                        continue;
                                    };
                                    Self::route(m, sync_msg, bytes, &rooms, &mut ws_sender).await?;
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        Some(Ok(_)) => {}
                    },

                    frame = async {
                        match member.as_mut() {
                            Some(m) => m.frames.recv().await,
                            None => std::future::pending().await,
                        }
                    } => match frame {
                        Ok(data) => {
                            ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Peer at {addr} lagged by {n} frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
        }
        .await;

        if let Some(m) = member {
            if rooms.leave(m.event_id, &m.peer.peer_id).await {
                log::info!("Room {} removed (empty)", m.event_id);
            }
            log::info!("Peer {} ({}) left event {}", m.peer.name, m.peer.peer_id, m.event_id);
        }
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = rooms.room_count().await;
        }

        result
    }

    async fn join(
        msg: &SyncMessage,
        config: &ServerConfig,
        rooms: &RoomManager,
        stats: &RwLock<ServerStats>,
    ) -> JoinOutcome {
        let payload = match msg.join_payload() {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Malformed join for event {}: {e}", msg.event_id);
                stats.write().await.rejected_joins += 1;
                return JoinOutcome::Rejected("malformed join");
            }
        };
        if !config.accepts(&payload.token) {
            log::warn!(
                "Rejected {} for event {}: token not accepted",
                payload.display_name,
                msg.event_id
            );
            stats.write().await.rejected_joins += 1;
            return JoinOutcome::Rejected("invalid token");
        }

        let peer = PeerInfo::with_id(msg.peer_id, payload.display_name);
        let Some((room, frames)) = rooms
            .join(msg.event_id, peer.clone(), config.max_peers_per_room)
            .await
        else {
            log::warn!("Event {} is full, closing join from {}", msg.event_id, peer.name);
            return JoinOutcome::RoomFull;
        };
        stats.write().await.active_rooms = rooms.room_count().await;
        log::info!("Peer {} ({}) joined event {}", peer.name, peer.peer_id, msg.event_id);

        JoinOutcome::Joined(Membership {
            peer,
            event_id: msg.event_id,
            room,
            frames,
        })
    }

    /// Handle a post-join message: handshake requests and topic frames.
    async fn route(
        member: &Membership,
        msg: SyncMessage,
        bytes: Vec<u8>,
        rooms: &RoomManager,
        ws_sender: &mut WsSink,
    ) -> ConnResult<()> {
        match msg.msg_type {
            MessageType::ListenersReady => {
                log::debug!("{} has listeners ready on event {}", member.peer.name, member.event_id);
            }

            MessageType::RequestCurrentState => {
                let frames = rooms.retained_frames(member.event_id).await;
                let count = frames.len() as u32;
                for frame in frames {
                    ws_sender.send(Message::Binary(frame.to_vec().into())).await?;
                }
                let done = SyncMessage::current_state_sent(member.event_id, count)?;
                ws_sender.send(Message::Binary(done.encode()?.into())).await?;
                log::debug!(
                    "Replayed {count} messages to {} on event {}",
                    member.peer.name,
                    member.event_id
                );
            }

            t if t.is_topic() => {
                if msg.event_id != member.event_id {
                    log::warn!(
                        "Dropping {} from {}: joined event {}",
                        msg.topic().unwrap_or_default(),
                        member.peer.name,
                        member.event_id
                    );
                    return Ok(());
                }
                let frame = Arc::new(bytes);
                rooms.retain(&msg, frame.clone()).await;
                let receivers = member.room.broadcast_raw(frame);
                log::trace!(
                    "{} from {} to {receivers} peers",
                    msg.topic().unwrap_or_default(),
                    member.peer.name
                );
            }

            other => {
                log::debug!("Unhandled message type: {other:?}");
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

enum JoinOutcome {
    Joined(Membership),
    Rejected(&'static str),
    RoomFull,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.max_peers_per_room, 100);
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.allowed_tokens.is_empty());
        assert_eq!(config.max_retained_events, 1024);
    }

    #[test]
    fn test_open_relay_accepts_any_token() {
        let config = ServerConfig::default();
        assert!(config.accepts("anything"));
        assert!(config.accepts(""));
    }

    #[test]
    fn test_allow_list() {
        let config = ServerConfig {
            allowed_tokens: vec!["band-42".to_string()],
            ..ServerConfig::default()
        };
        assert!(config.accepts("band-42"));
        assert!(!config.accepts("band-43"));
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert_eq!(server.stats().await, ServerStats::default());
        assert_eq!(server.room_manager().room_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_rejects_bad_token() {
        let config = ServerConfig {
            allowed_tokens: vec!["band-42".to_string()],
            ..ServerConfig::default()
        };
        let rooms = RoomManager::new(16, 64);
        let stats = RwLock::new(ServerStats::default());
        let peer = PeerInfo::new("Stage");

        let bad = SyncMessage::join(&peer, 42, "nope").unwrap();
        assert!(matches!(
            RelayServer::join(&bad, &config, &rooms, &stats).await,
            JoinOutcome::Rejected(_)
        ));
        assert_eq!(stats.read().await.rejected_joins, 1);
        assert_eq!(rooms.room_count().await, 0);

        let good = SyncMessage::join(&peer, 42, "band-42").unwrap();
        match RelayServer::join(&good, &config, &rooms, &stats).await {
            JoinOutcome::Joined(m) => {
                assert_eq!(m.event_id, 42);
                assert_eq!(m.peer.name, "Stage");
                assert!(m.room.has_peer(&peer.peer_id).await);
            }
            _ => panic!("expected join"),
        }
    }

    #[tokio::test]
    async fn test_join_malformed_payload_is_rejected() {
        let rooms = RoomManager::new(16, 64);
        let stats = RwLock::new(ServerStats::default());
        let mut msg = SyncMessage::join(&PeerInfo::new("Stage"), 42, "t").unwrap();
        msg.payload = vec![0xFF];

        assert!(matches!(
            RelayServer::join(&msg, &ServerConfig::default(), &rooms, &stats).await,
            JoinOutcome::Rejected("malformed join")
        ));
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let config = ServerConfig {
            max_peers_per_room: 1,
            ..ServerConfig::default()
        };
        let rooms = RoomManager::new(16, 64);
        let stats = RwLock::new(ServerStats::default());

        let first = SyncMessage::join(&PeerInfo::new("Driver"), 42, "t").unwrap();
        let second = SyncMessage::join(&PeerInfo::with_id(Uuid::new_v4(), "Stage"), 42, "t").unwrap();

        let _kept = match RelayServer::join(&first, &config, &rooms, &stats).await {
            JoinOutcome::Joined(m) => m,
            _ => panic!("expected join"),
        };
        assert!(matches!(
            RelayServer::join(&second, &config, &rooms, &stats).await,
            JoinOutcome::RoomFull
        ));
    }
}
