//! WebSocket sync channel for one live event.
//!
//! Provides:
//! - Connection lifecycle with bounded, exponentially backed-off reconnects
//! - The join / `listeners_ready` / `request_current_state` handshake, re-run
//!   on every successful (re)connect
//! - Decoding of the three event topics into [`Update`]s for the
//!   presentation actor
//! - Driver sends, gated on a [`DriverCapability`]
//!
//! Nothing is queued while disconnected: a send that cannot go out now is
//! reported as [`ProtocolError::NotConnected`] and never retried. The next
//! driver action supersedes it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use worship_core::{EventId, SongId};

use crate::actor::{PresentationHandle, UpdateSender};
use crate::protocol::{MessageType, PeerInfo, ProtocolError, SyncMessage};
use crate::reconciler::Update;
use crate::state::{LyricAction, PresentationState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Reconnect schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based): doubles from the initial
    /// backoff, capped at the maximum.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Client-side channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Relay base URL, e.g. `ws://127.0.0.1:9090`.
    pub server_url: String,
    /// Pause between `listeners_ready` and `request_current_state`.
    pub settle_delay_ms: u64,
    pub live_message_ttl_ms: u64,
    pub ping_interval_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9090".to_string(),
            settle_delay_ms: 250,
            live_message_ttl_ms: 5_000,
            ping_interval_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChannelConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn live_message_ttl(&self) -> Duration {
        Duration::from_millis(self.live_message_ttl_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Connection URL for one event.
    pub fn event_url(&self, event_id: EventId) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), event_id)
    }
}

/// Connection state shown to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Retries exhausted. Terminal.
    Disconnected,
    /// The relay refused the token, or none was available. Terminal.
    Unauthorized,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Unauthorized)
    }
}

/// Supplies the bearer token. Called on every connect attempt so a token
/// refreshed in the meantime is picked up.
pub trait TokenProvider: Send + Sync {
    /// `None` when no valid token is available.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Proof that the permission service let this client drive the event.
///
/// Sends require one, so a viewer cannot build control messages at all.
#[derive(Debug)]
pub struct DriverCapability {
    _private: (),
}

impl DriverCapability {
    /// `can_drive` is the permission service's verdict.
    pub fn grant(can_drive: bool) -> Option<Self> {
        can_drive.then_some(Self { _private: () })
    }
}

/// Control messages a driver can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverAction {
    SelectSong(SongId),
    SelectLyricPosition { position: u32, action: LyricAction },
    LiveMessage(String),
}

/// One live-event connection plus the presentation state it feeds.
pub struct SyncChannel {
    peer: PeerInfo,
    event_id: EventId,
    outgoing_tx: mpsc::Sender<SyncMessage>,
    status: watch::Receiver<ConnectionStatus>,
    clock: AtomicU64,
    presentation: PresentationHandle,
    supervisor: JoinHandle<()>,
}

impl SyncChannel {
    /// Open a channel for `event_id`.
    ///
    /// Returns immediately; connecting, the handshake, and reconnects run
    /// on a background task. Watch [`SyncChannel::subscribe_status`] for
    /// progress.
    pub fn connect(
        config: ChannelConfig,
        event_id: EventId,
        peer: PeerInfo,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let presentation = PresentationHandle::spawn(config.live_message_ttl());
        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        let connection = Connection {
            config,
            event_id,
            peer: peer.clone(),
            tokens,
            outgoing_rx,
            updates: presentation.sender(),
            status: status_tx,
        };
        let supervisor = tokio::spawn(connection.supervise());

        Self {
            peer,
            event_id,
            outgoing_tx,
            status: status_rx,
            clock: AtomicU64::new(0),
            presentation,
            supervisor,
        }
    }

    /// Send one driver action.
    pub async fn send(
        &self,
        _capability: &DriverCapability,
        action: DriverAction,
    ) -> Result<(), ProtocolError> {
        if !self.status().is_connected() {
            log::debug!("Dropping {action:?}: not connected");
            return Err(ProtocolError::NotConnected);
        }

        let clock = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let msg = match action {
            DriverAction::SelectSong(song_id) => {
                SyncMessage::song_selected(&self.peer, self.event_id, clock, song_id)?
            }
            DriverAction::SelectLyricPosition { position, action } => {
                SyncMessage::lyric_selected(&self.peer, self.event_id, clock, position, action)?
            }
            DriverAction::LiveMessage(text) => {
                SyncMessage::live_message(self.peer.peer_id, self.event_id, clock, text)?
            }
        };

        log::debug!(
            "Sending {} (clock {clock})",
            msg.topic().unwrap_or_default()
        );
        self.outgoing_tx
            .send(msg)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Send actions in order, stopping at the first failure.
    pub async fn send_all(
        &self,
        capability: &DriverCapability,
        actions: Vec<DriverAction>,
    ) -> Result<(), ProtocolError> {
        for action in actions {
            self.send(capability, action).await?;
        }
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn presentation(&self) -> &PresentationHandle {
        &self.presentation
    }

    pub fn snapshot(&self) -> PresentationState {
        self.presentation.snapshot()
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Close the connection and discard local state.
    pub fn close(self) {
        log::info!("Closing live channel for event {}", self.event_id);
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.supervisor.abort();
        self.presentation.close();
    }
}

enum SessionEnd {
    Lost,
    Unauthorized,
    Shutdown,
}

enum Dispatch {
    Continue,
    Unauthorized,
    Shutdown,
}

/// Connection state owned by the supervisor task.
struct Connection {
    config: ChannelConfig,
    event_id: EventId,
    peer: PeerInfo,
    tokens: Arc<dyn TokenProvider>,
    outgoing_rx: mpsc::Receiver<SyncMessage>,
    updates: UpdateSender,
    status: watch::Sender<ConnectionStatus>,
}

impl Connection {
    async fn supervise(mut self) {
        let url = self.config.event_url(self.event_id);
        let mut attempt: u32 = 0;

        loop {
            let Some(token) = self.tokens.bearer_token() else {
                log::error!("No bearer token available for event {}", self.event_id);
                self.set_status(ConnectionStatus::Unauthorized);
                return;
            };

            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    attempt = 0;
                    match self.run_session(ws, token).await {
                        SessionEnd::Lost => log::warn!("Connection to {url} lost"),
                        SessionEnd::Unauthorized => {
                            self.set_status(ConnectionStatus::Unauthorized);
                            return;
                        }
                        SessionEnd::Shutdown => return,
                    }
                }
                Err(e) => log::warn!("Connect to {url} failed: {e}"),
            }

            attempt += 1;
            if attempt > self.config.reconnect.max_attempts {
                log::error!(
                    "Giving up on {url} after {} attempts",
                    self.config.reconnect.max_attempts
                );
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
            self.set_status(ConnectionStatus::Reconnecting { attempt });
            let delay = self.config.reconnect.delay_for(attempt);
            log::info!("Reconnect attempt {attempt} to {url} in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_session(&mut self, ws: WsStream, token: String) -> SessionEnd {
        let (mut writer, mut reader) = ws.split();

        // Anything queued between a status check and a disconnect is stale.
        while let Ok(stale) = self.outgoing_rx.try_recv() {
            log::debug!("Discarding stale {} from previous connection", stale.msg_type.wire_name());
        }

        let join = match SyncMessage::join(&self.peer, self.event_id, token) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Failed to encode join: {e}");
                return SessionEnd::Lost;
            }
        };
        let ready = SyncMessage::listeners_ready(self.peer.peer_id, self.event_id);
        for msg in [join, ready] {
            if Self::write(&mut writer, &msg).await.is_err() {
                return SessionEnd::Lost;
            }
        }
        self.set_status(ConnectionStatus::Connected);
        log::info!("Listeners ready for event {}", self.event_id);

        let settle = tokio::time::sleep(self.config.settle_delay());
        tokio::pin!(settle);
        let mut handshake_pending = true;

        let period = self.config.ping_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(Message::Binary(data))) => match self.dispatch(&data).await {
                        Dispatch::Continue => {}
                        Dispatch::Unauthorized => return SessionEnd::Unauthorized,
                        Dispatch::Shutdown => return SessionEnd::Shutdown,
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Err(e)) => {
                        log::warn!("WebSocket error on event {}: {e}", self.event_id);
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                },

                outgoing = self.outgoing_rx.recv() => match outgoing {
                    Some(msg) => {
                        if Self::write(&mut writer, &msg).await.is_err() {
                            return SessionEnd::Lost;
                        }
                    }
                    None => {
                        let _ = writer.close().await;
                        return SessionEnd::Shutdown;
                    }
                },

                () = &mut settle, if handshake_pending => {
                    handshake_pending = false;
                    let request = SyncMessage::request_current_state(self.peer.peer_id, self.event_id);
                    if Self::write(&mut writer, &request).await.is_err() {
                        return SessionEnd::Lost;
                    }
                    log::debug!("Requested current state for event {}", self.event_id);
                }

                _ = heartbeat.tick() => {
                    if Self::write(&mut writer, &SyncMessage::ping(self.peer.peer_id)).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    async fn write(writer: &mut WsWriter, msg: &SyncMessage) -> Result<(), ProtocolError> {
        let encoded = msg.encode()?;
        writer
            .send(Message::Binary(encoded.into()))
            .await
            .map_err(|e| {
                log::warn!("Failed to send {}: {e}", msg.msg_type.wire_name());
                ProtocolError::ConnectionClosed
            })
    }

    async fn dispatch(&self, data: &[u8]) -> Dispatch {
        let msg = match SyncMessage::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Dropping malformed frame: {e}");
                return Dispatch::Continue;
            }
        };

        if msg.msg_type.is_topic() && msg.event_id != self.event_id {
            log::debug!(
                "Dropping {} addressed to another event",
                msg.topic().unwrap_or_default()
            );
            return Dispatch::Continue;
        }

        let update = match msg.msg_type {
            MessageType::SongSelected => msg.song_selected_payload().map(|p| Update::SongSelected {
                song_id: p.song_id,
                driver_name: p.driver_name,
            }),
            MessageType::LyricSelected => {
                msg.lyric_selected_payload().map(|p| Update::LyricSelected {
                    position: p.position,
                    action: p.action,
                    driver_name: p.driver_name,
                })
            }
            MessageType::LiveMessage => msg.live_message_text().map(Update::LiveMessage),
            MessageType::CurrentStateSent => msg
                .messages_count()
                .map(|messages_count| Update::HandshakeResult { messages_count }),
            MessageType::AuthRejected => {
                log::error!(
                    "Relay rejected credentials for event {}: {}",
                    self.event_id,
                    msg.rejection_reason().unwrap_or_default()
                );
                return Dispatch::Unauthorized;
            }
            MessageType::Pong => {
                log::trace!("Pong");
                return Dispatch::Continue;
            }
            other => {
                log::debug!("Ignoring unexpected {}", other.wire_name());
                return Dispatch::Continue;
            }
        };

        match update {
            Ok(update) => {
                if self.updates.send(update).await {
                    Dispatch::Continue
                } else {
                    Dispatch::Shutdown
                }
            }
            Err(e) => {
                log::warn!("Dropping {} with bad payload: {e}", msg.msg_type.wire_name());
                Dispatch::Continue
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }
}
