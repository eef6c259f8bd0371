//! Per-event fan-out and retained topic state.
//!
//! Every peer in an event room shares one tokio broadcast channel, so a
//! topic message is encoded once and handed to all subscribers, the sender
//! included. Each receiver buffers up to `capacity` frames; a lagging peer
//! drops the oldest ones.
//!
//! Retained state lives beside the rooms, not in them: the last
//! `eventSelectedSong` and `lyricSelected` frame of an event survive the
//! room emptying out, so a screen joining later still gets the current
//! slide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;
use worship_core::EventId;

use crate::protocol::{MessageType, PeerInfo, ProtocolError, SyncMessage};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Lock-free counters, read via [`BroadcastGroup::stats`].
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// The broadcast group for one live event.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    peers: Arc<RwLock<HashMap<Uuid, PeerInfo>>>,
    capacity: usize,
    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// `capacity` is how many frames a receiver buffers before lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Add a peer and return its receiver.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        let mut peers = self.peers.write().await;
        peers.remove(peer_id)
    }

    /// Encode once and send to every subscriber.
    ///
    /// Returns the number of receivers that got the frame.
    pub fn broadcast(&self, msg: &SyncMessage) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(msg.encode()?);
        Ok(self.broadcast_raw(encoded))
    }

    /// Send pre-encoded bytes.
    pub fn broadcast_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(encoded) {
            Ok(count) => count,
            Err(_) => {
                self.atomic_stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let peers = self.peers.read().await;
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: peers.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Last frame of each replayable topic for one event.
#[derive(Debug, Default)]
struct RetainedTopics {
    /// `(update sequence, encoded frame)` per topic.
    latest: HashMap<MessageType, (u64, Arc<Vec<u8>>)>,
}

impl RetainedTopics {
    fn last_update(&self) -> u64 {
        self.latest.values().map(|(seq, _)| *seq).max().unwrap_or(0)
    }
}

/// Maps event ids to broadcast groups and retained topic state.
///
/// Room membership only changes under the `rooms` write lock, so a room is
/// never dropped between a peer finding it and joining it.
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<EventId, Arc<BroadcastGroup>>>>,
    retained: Arc<RwLock<HashMap<EventId, RetainedTopics>>>,
    sequence: AtomicU64,
    default_capacity: usize,
    max_retained_events: usize,
}

impl RoomManager {
    /// `max_retained_events` bounds how many events keep retained frames;
    /// past it the least recently updated event without a room is evicted.
    pub fn new(default_capacity: usize, max_retained_events: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            retained: Arc::new(RwLock::new(HashMap::new())),
            sequence: AtomicU64::new(0),
            default_capacity,
            max_retained_events,
        }
    }

    /// Add `peer` to the room for `event_id`, creating the room if needed.
    ///
    /// Returns `None` when the room already holds `max_peers` peers.
    pub async fn join(
        &self,
        event_id: EventId,
        peer: PeerInfo,
        max_peers: usize,
    ) -> Option<(Arc<BroadcastGroup>, broadcast::Receiver<Arc<Vec<u8>>>)> {
        let mut rooms = self.rooms.write().await;
        let room = match rooms.get(&event_id) {
            Some(room) => room.clone(),
            None => Arc::new(BroadcastGroup::new(self.default_capacity)),
        };
        if room.peer_count().await >= max_peers {
            return None;
        }

        let frames = room.add_peer(peer).await;
        if !rooms.contains_key(&event_id) {
            rooms.insert(event_id, room.clone());
            log::debug!("Room {event_id} created");
        }
        Some((room, frames))
    }

    /// Remove `peer_id` from the room for `event_id`. Returns `true` when
    /// the room was emptied and dropped. Retained topics are kept.
    pub async fn leave(&self, event_id: EventId, peer_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(&event_id).cloned() else {
            return false;
        };
        room.remove_peer(peer_id).await;
        if room.peer_count().await == 0 {
            rooms.remove(&event_id);
            return true;
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_events(&self) -> Vec<EventId> {
        self.rooms.read().await.keys().copied().collect()
    }

    /// Remember `encoded` as the latest frame of its topic. Non-replayable
    /// types are ignored.
    pub async fn retain(&self, msg: &SyncMessage, encoded: Arc<Vec<u8>>) {
        if !msg.msg_type.is_replayable() {
            return;
        }
        let active = self.active_events().await;
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut retained = self.retained.write().await;
        retained
            .entry(msg.event_id)
            .or_default()
            .latest
            .insert(msg.msg_type, (seq, encoded));

        while retained.len() > self.max_retained_events {
            let stale = retained
                .iter()
                .filter(|(event_id, _)| **event_id != msg.event_id && !active.contains(event_id))
                .min_by_key(|(_, topics)| topics.last_update())
                .map(|(event_id, _)| *event_id);
            match stale {
                Some(event_id) => {
                    retained.remove(&event_id);
                    log::debug!("Evicted retained state of event {event_id}");
                }
                // Every retained event still has a room.
                None => break,
            }
        }
    }

    /// Retained frames for `event_id`, oldest update first.
    pub async fn retained_frames(&self, event_id: EventId) -> Vec<Arc<Vec<u8>>> {
        let retained = self.retained.read().await;
        let Some(topics) = retained.get(&event_id) else {
            return Vec::new();
        };
        let mut frames: Vec<_> = topics.latest.values().cloned().collect();
        frames.sort_by_key(|(seq, _)| *seq);
        frames.into_iter().map(|(_, frame)| frame).collect()
    }
}
