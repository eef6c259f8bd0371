//! Binary protocol for live presentation sync.
//!
//! Wire format (bincode-encoded, one WebSocket binary frame per message):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ event_id │ clock    │ payload  │
//! │ varint   │ len + 16  │ varint   │ varint   │ len + N  │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! `msg_type` is the variant index of [`MessageType`] in declaration order,
//! so new variants go at the end.
//!
//! Three message types are per-event topics (`eventSelectedSong-{id}`,
//! `lyricSelected-{id}`, `liveMessage-{id}`); the rest are the control plane
//! (`join`, `listeners_ready`, `request_current_state`,
//! `current_state_sent`, `auth_rejected`, `ping`, `pong`).
//!
//! Ordering contract: the relay delivers messages of one topic in the order
//! it received them. Nothing orders messages across topics.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use worship_core::{EventId, SongId};

use crate::state::LyricAction;

/// Message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Client joins an event room with its bearer token
    Join,
    /// Client has its topic listeners in place
    ListenersReady,
    /// Client asks the relay to replay retained topic messages
    RequestCurrentState,
    /// Relay finished replaying; payload carries the replay count
    CurrentStateSent,
    /// `eventSelectedSong-{eventId}` topic
    SongSelected,
    /// `lyricSelected-{eventId}` topic
    LyricSelected,
    /// `liveMessage-{eventId}` topic
    LiveMessage,
    /// Relay refused the join (bad token)
    AuthRejected,
    /// Heartbeat ping
    Ping,
    /// Heartbeat pong
    Pong,
}

impl MessageType {
    /// Event name as it appears in the topic namespace and logs.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::ListenersReady => "listeners_ready",
            Self::RequestCurrentState => "request_current_state",
            Self::CurrentStateSent => "current_state_sent",
            Self::SongSelected => "eventSelectedSong",
            Self::LyricSelected => "lyricSelected",
            Self::LiveMessage => "liveMessage",
            Self::AuthRejected => "auth_rejected",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Whether this type is one of the per-event broadcast topics.
    pub fn is_topic(&self) -> bool {
        matches!(self, Self::SongSelected | Self::LyricSelected | Self::LiveMessage)
    }

    /// Topics whose latest message the relay keeps for late joiners.
    /// Live messages expire on their own and are never replayed.
    pub fn is_replayable(&self) -> bool {
        matches!(self, Self::SongSelected | Self::LyricSelected)
    }

    /// Full topic name for `event_id`, e.g. `lyricSelected-42`.
    pub fn topic_name(&self, event_id: EventId) -> Option<String> {
        self.is_topic()
            .then(|| format!("{}-{}", self.wire_name(), event_id))
    }
}

/// Peer identity with display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    /// Shown to viewers as the driver name when this peer sends control messages.
    pub name: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Create with explicit peer_id (for testing)
    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinPayload {
    pub token: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SongSelectedPayload {
    pub song_id: SongId,
    pub driver_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LyricSelectedPayload {
    pub position: u32,
    pub action: LyricAction,
    pub driver_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentStateSentPayload {
    pub messages_count: u32,
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    pub event_id: EventId,
    /// Per-sender send counter, informational only. Receivers do not
    /// reorder on it.
    pub clock: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl SyncMessage {
    fn with_payload<T: Serialize>(
        msg_type: MessageType,
        peer_id: Uuid,
        event_id: EventId,
        clock: u64,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let payload = bincode::serde::encode_to_vec(payload, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        Ok(Self {
            msg_type,
            peer_id,
            event_id,
            clock,
            payload,
        })
    }

    fn empty(msg_type: MessageType, peer_id: Uuid, event_id: EventId) -> Self {
        Self {
            msg_type,
            peer_id,
            event_id,
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a join request carrying the bearer token.
    pub fn join(
        peer: &PeerInfo,
        event_id: EventId,
        token: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let payload = JoinPayload {
            token: token.into(),
            display_name: peer.name.clone(),
        };
        Self::with_payload(MessageType::Join, peer.peer_id, event_id, 0, &payload)
    }

    pub fn listeners_ready(peer_id: Uuid, event_id: EventId) -> Self {
        Self::empty(MessageType::ListenersReady, peer_id, event_id)
    }

    pub fn request_current_state(peer_id: Uuid, event_id: EventId) -> Self {
        Self::empty(MessageType::RequestCurrentState, peer_id, event_id)
    }

    /// Relay's end-of-replay marker.
    pub fn current_state_sent(event_id: EventId, messages_count: u32) -> Result<Self, ProtocolError> {
        let payload = CurrentStateSentPayload { messages_count };
        Self::with_payload(MessageType::CurrentStateSent, Uuid::nil(), event_id, 0, &payload)
    }

    pub fn song_selected(
        peer: &PeerInfo,
        event_id: EventId,
        clock: u64,
        song_id: SongId,
    ) -> Result<Self, ProtocolError> {
        let payload = SongSelectedPayload {
            song_id,
            driver_name: peer.name.clone(),
        };
        Self::with_payload(MessageType::SongSelected, peer.peer_id, event_id, clock, &payload)
    }

    pub fn lyric_selected(
        peer: &PeerInfo,
        event_id: EventId,
        clock: u64,
        position: u32,
        action: LyricAction,
    ) -> Result<Self, ProtocolError> {
        let payload = LyricSelectedPayload {
            position,
            action,
            driver_name: peer.name.clone(),
        };
        Self::with_payload(MessageType::LyricSelected, peer.peer_id, event_id, clock, &payload)
    }

    pub fn live_message(
        peer_id: Uuid,
        event_id: EventId,
        clock: u64,
        text: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::LiveMessage, peer_id, event_id, clock, &text.into())
    }

    pub fn auth_rejected(event_id: EventId, reason: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::AuthRejected, Uuid::nil(), event_id, 0, &reason.into())
    }

    /// Create a ping message.
    pub fn ping(peer_id: Uuid) -> Self {
        Self::empty(MessageType::Ping, peer_id, 0)
    }

    /// Create a pong message.
    pub fn pong(peer_id: Uuid) -> Self {
        Self::empty(MessageType::Pong, peer_id, 0)
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    /// Topic this message belongs to, `None` for control-plane messages.
    pub fn topic(&self) -> Option<String> {
        self.msg_type.topic_name(self.event_id)
    }

    fn decode_payload<T: DeserializeOwned>(&self, expected: MessageType) -> Result<T, ProtocolError> {
        if self.msg_type != expected {
            return Err(ProtocolError::InvalidMessageType);
        }
        let (value, _) = bincode::serde::decode_from_slice(&self.payload, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(value)
    }

    pub fn join_payload(&self) -> Result<JoinPayload, ProtocolError> {
        self.decode_payload(MessageType::Join)
    }

    pub fn song_selected_payload(&self) -> Result<SongSelectedPayload, ProtocolError> {
        self.decode_payload(MessageType::SongSelected)
    }

    pub fn lyric_selected_payload(&self) -> Result<LyricSelectedPayload, ProtocolError> {
        self.decode_payload(MessageType::LyricSelected)
    }

    pub fn live_message_text(&self) -> Result<String, ProtocolError> {
        self.decode_payload(MessageType::LiveMessage)
    }

    pub fn messages_count(&self) -> Result<u32, ProtocolError> {
        self.decode_payload::<CurrentStateSentPayload>(MessageType::CurrentStateSent)
            .map(|p| p.messages_count)
    }

    pub fn rejection_reason(&self) -> Result<String, ProtocolError> {
        self.decode_payload(MessageType::AuthRejected)
    }
}

/// Protocol and transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Invalid message type")]
    InvalidMessageType,
    #[error("Not connected")]
    NotConnected,
    #[error("Connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(
            MessageType::SongSelected.topic_name(42).as_deref(),
            Some("eventSelectedSong-42")
        );
        assert_eq!(
            MessageType::LyricSelected.topic_name(42).as_deref(),
            Some("lyricSelected-42")
        );
        assert_eq!(
            MessageType::LiveMessage.topic_name(7).as_deref(),
            Some("liveMessage-7")
        );
        assert!(MessageType::CurrentStateSent.topic_name(42).is_none());
        assert_eq!(MessageType::RequestCurrentState.wire_name(), "request_current_state");
    }

    #[test]
    fn test_replayable_topics() {
        assert!(MessageType::SongSelected.is_replayable());
        assert!(MessageType::LyricSelected.is_replayable());
        assert!(!MessageType::LiveMessage.is_replayable());
        assert!(!MessageType::Ping.is_replayable());
    }

    #[test]
    fn test_lyric_selected_roundtrip() {
        let peer = PeerInfo::new("Worship Leader");
        let msg = SyncMessage::lyric_selected(&peer, 42, 3, 5, LyricAction::Forward).unwrap();
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::LyricSelected);
        assert_eq!(decoded.event_id, 42);
        assert_eq!(decoded.clock, 3);
        assert_eq!(decoded.topic().as_deref(), Some("lyricSelected-42"));

        let payload = decoded.lyric_selected_payload().unwrap();
        assert_eq!(payload.position, 5);
        assert_eq!(payload.action, LyricAction::Forward);
        assert_eq!(payload.driver_name, "Worship Leader");
    }

    #[test]
    fn test_song_selected_carries_driver_name() {
        let peer = PeerInfo::new("Ana");
        let msg = SyncMessage::song_selected(&peer, 1, 1, 17).unwrap();
        let payload = msg.song_selected_payload().unwrap();
        assert_eq!(payload.song_id, 17);
        assert_eq!(payload.driver_name, "Ana");
        assert_eq!(msg.peer_id, peer.peer_id);
    }

    #[test]
    fn test_join_payload() {
        let peer = PeerInfo::new("Projector");
        let msg = SyncMessage::join(&peer, 9, "secret").unwrap();
        let payload = msg.join_payload().unwrap();
        assert_eq!(payload.token, "secret");
        assert_eq!(payload.display_name, "Projector");
    }

    #[test]
    fn test_current_state_sent_count() {
        let msg = SyncMessage::current_state_sent(42, 2).unwrap();
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.messages_count().unwrap(), 2);
        assert_eq!(decoded.peer_id, Uuid::nil());
    }

    #[test]
    fn test_live_message_text() {
        let msg = SyncMessage::live_message(Uuid::new_v4(), 42, 1, "Next: offering").unwrap();
        assert_eq!(msg.live_message_text().unwrap(), "Next: offering");
    }

    #[test]
    fn test_invalid_message_type_error() {
        let msg = SyncMessage::ping(Uuid::new_v4());
        assert_eq!(msg.song_selected_payload(), Err(ProtocolError::InvalidMessageType));
        assert_eq!(msg.messages_count(), Err(ProtocolError::InvalidMessageType));
    }

    #[test]
    fn test_msg_type_byte_is_variant_index() {
        let peer = PeerInfo::new("Ana");
        let join = SyncMessage::join(&peer, 42, "band-42").unwrap();
        assert_eq!(join.encode().unwrap()[0], 0);
        assert_eq!(SyncMessage::ping(peer.peer_id).encode().unwrap()[0], 8);
        assert_eq!(SyncMessage::pong(peer.peer_id).encode().unwrap()[0], 9);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(SyncMessage::decode(&garbage).is_err());
    }

    #[test]
    fn test_truncated_payload_is_error() {
        let peer = PeerInfo::new("Ana");
        let mut msg = SyncMessage::song_selected(&peer, 1, 1, 17).unwrap();
        msg.payload.truncate(1);
        assert!(matches!(
            msg.song_selected_payload(),
            Err(ProtocolError::DeserializationError(_))
        ));
    }
}
