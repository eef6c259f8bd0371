//! # worship-live — Real-time slide sync for live worship events
//!
//! One driver steers the slides; every projector, stage screen and
//! confidence monitor joined to the same event follows along.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌──────────────┐
//! │ SyncChannel  │ ◄─────────────────► │ RelayServer  │
//! │ (per screen) │     Binary Proto    │ (central)    │
//! └──────┬───────┘                     └──────┬───────┘
//!        │ Update                             │
//!        ▼                                    ▼
//! ┌──────────────┐                     ┌──────────────┐
//! │ Presentation │                     │ RoomManager  │
//! │ actor        │                     │ rooms +      │
//! │ (Reconciler) │                     │ retained     │
//! └──────┬───────┘                     └──────────────┘
//!        │ watch snapshot
//!        ▼
//!    renderer
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded SyncMessage)
//! - [`state`] — The presentation record renderers draw from
//! - [`reconciler`] — Applies inbound messages to the presentation state
//! - [`actor`] — Single-owner task around the reconciler, plus the live-message timer
//! - [`channel`] — WebSocket client: handshake, reconnects, driver sends
//! - [`navigation`] — Driver gestures to lyric positions
//! - [`broadcast`] — Per-event fan-out and retained topic state
//! - [`server`] — The relay
//! - [`config`] — TOML configuration

pub mod actor;
pub mod broadcast;
pub mod channel;
pub mod config;
pub mod navigation;
pub mod protocol;
pub mod reconciler;
pub mod server;
pub mod state;

pub use actor::{PresentationHandle, UpdateSender, DEFAULT_LIVE_MESSAGE_TTL};
pub use broadcast::{BroadcastGroup, BroadcastStats, RoomManager};
pub use channel::{
    ChannelConfig, ConnectionStatus, DriverAction, DriverCapability, ReconnectPolicy,
    StaticToken, SyncChannel, TokenProvider,
};
pub use config::{ConfigError, LiveConfig};
pub use navigation::{backward_position, forward_position, Gesture, NavigationController};
pub use protocol::{MessageType, PeerInfo, ProtocolError, SyncMessage};
pub use reconciler::{Reconciler, Update};
pub use server::{RelayServer, ServerConfig, ServerStats};
pub use state::{LyricAction, LyricPosition, PresentationState};
