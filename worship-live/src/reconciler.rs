//! Applies inbound live messages to [`PresentationState`].
//!
//! `eventSelectedSong` and `lyricSelected` are independent topics with no
//! ordering between them, so during replay a position can arrive before the
//! song selection it belongs to. The reconciler only resets the position on
//! a song change both sides of which it has seen: `previous_song_id` must be
//! known (non-zero) and differ from the incoming id. Position updates are
//! applied unconditionally.
//!
//! Within a topic, messages are assumed to arrive in send order. Nothing here
//! detects or repairs within-topic reordering.

use worship_core::SongId;

use crate::state::{LyricAction, LyricPosition, PresentationState};

/// One inbound change, already decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    SongSelected {
        song_id: SongId,
        driver_name: String,
    },
    LyricSelected {
        position: u32,
        action: LyricAction,
        driver_name: String,
    },
    LiveMessage(String),
    /// `current_state_sent` from the relay.
    HandshakeResult { messages_count: u32 },
}

/// Sole writer of a [`PresentationState`].
#[derive(Debug, Default)]
pub struct Reconciler {
    state: PresentationState,
    previous_song_id: SongId,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    pub fn previous_song_id(&self) -> SongId {
        self.previous_song_id
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::SongSelected {
                song_id,
                driver_name,
            } => {
                self.song_selected(song_id, driver_name);
            }
            Update::LyricSelected {
                position,
                action,
                driver_name,
            } => self.lyric_position_changed(position, action, driver_name),
            Update::LiveMessage(text) => self.set_live_message(text),
            Update::HandshakeResult { messages_count } => self.handshake_result(messages_count),
        }
    }

    /// Returns `true` when the selection was a genuine change and the
    /// position was reset to the title slide.
    pub fn song_selected(&mut self, song_id: SongId, driver_name: impl Into<String>) -> bool {
        let previous = self.previous_song_id;
        let is_change = previous != 0 && previous != song_id;

        self.state.selected_song_id = song_id;
        self.state.driver_name = driver_name.into();
        if is_change {
            self.state.lyric_position = LyricPosition::TITLE_BACKWARD;
        }
        self.previous_song_id = song_id;

        log::debug!("Song selected: {song_id} (previous {previous}, reset: {is_change})");
        is_change
    }

    pub fn lyric_position_changed(
        &mut self,
        position: u32,
        action: LyricAction,
        driver_name: impl Into<String>,
    ) {
        self.state.lyric_position = LyricPosition::new(position, action);
        self.state.driver_name = driver_name.into();
        log::trace!("Lyric position: {position} ({action:?})");
    }

    /// A zero count means the relay holds nothing for this event: every
    /// field returns to its default. A non-zero count needs no action, the
    /// replayed messages have already been applied.
    pub fn handshake_result(&mut self, messages_count: u32) {
        if messages_count == 0 {
            self.state = PresentationState::default();
            self.previous_song_id = 0;
            log::debug!("Handshake: nothing to replay, state reset");
        } else {
            log::debug!("Handshake: {messages_count} messages replayed");
        }
    }

    pub fn set_live_message(&mut self, text: impl Into<String>) {
        self.state.live_message = Some(text.into());
    }

    pub fn clear_live_message(&mut self) {
        self.state.live_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(song_id: SongId) -> Update {
        Update::SongSelected {
            song_id,
            driver_name: "Driver".to_string(),
        }
    }

    fn lyric(position: u32, action: LyricAction) -> Update {
        Update::LyricSelected {
            position,
            action,
            driver_name: "Driver".to_string(),
        }
    }

    #[test]
    fn test_position_before_song_on_fresh_client_survives() {
        let mut r = Reconciler::new();
        r.apply(lyric(4, LyricAction::Forward));
        r.apply(song(17));

        assert_eq!(r.state().selected_song_id, 17);
        assert_eq!(
            r.state().lyric_position,
            LyricPosition::new(4, LyricAction::Forward)
        );
    }

    #[test]
    fn test_genuine_song_change_resets_position() {
        let mut r = Reconciler::new();
        r.apply(song(17));
        r.apply(lyric(4, LyricAction::Forward));
        r.apply(song(18));

        assert_eq!(r.state().selected_song_id, 18);
        assert_eq!(r.state().lyric_position, LyricPosition::TITLE_BACKWARD);
        assert_eq!(r.previous_song_id(), 18);
    }

    #[test]
    fn test_duplicate_song_messages_keep_position() {
        let mut r = Reconciler::new();
        r.apply(song(17));
        r.apply(song(17));
        r.apply(lyric(3, LyricAction::Forward));

        assert_eq!(r.state().selected_song_id, 17);
        assert_eq!(r.state().lyric_position.position, 3);

        assert!(!r.song_selected(17, "Driver"));
        assert_eq!(r.state().lyric_position.position, 3);
    }

    #[test]
    fn test_handshake_zero_resets_everything() {
        let mut r = Reconciler::new();
        r.apply(song(17));
        r.apply(lyric(6, LyricAction::Backward));
        r.apply(Update::LiveMessage("Welcome".to_string()));

        r.apply(Update::HandshakeResult { messages_count: 0 });

        assert_eq!(r.state(), &PresentationState::default());
        assert_eq!(r.previous_song_id(), 0);
        assert!(r.state().driver_name.is_empty());
    }

    #[test]
    fn test_handshake_reset_forgets_previous_song() {
        let mut r = Reconciler::new();
        r.apply(song(17));
        r.apply(Update::HandshakeResult { messages_count: 0 });

        // After a reset the client is fresh again, so a position arriving
        // ahead of its song must survive.
        r.apply(lyric(5, LyricAction::Forward));
        r.apply(song(18));
        assert_eq!(r.state().lyric_position.position, 5);
    }

    #[test]
    fn test_handshake_nonzero_is_noop() {
        let mut r = Reconciler::new();
        r.apply(song(17));
        r.apply(lyric(2, LyricAction::Forward));
        let before = r.state().clone();

        r.apply(Update::HandshakeResult { messages_count: 2 });
        assert_eq!(r.state(), &before);
        assert_eq!(r.previous_song_id(), 17);
    }

    #[test]
    fn test_driver_name_tracks_last_sender() {
        let mut r = Reconciler::new();
        r.song_selected(17, "Ana");
        assert_eq!(r.state().driver_name, "Ana");
        r.lyric_position_changed(1, LyricAction::Forward, "Ben");
        assert_eq!(r.state().driver_name, "Ben");
    }

    #[test]
    fn test_live_message_set_and_clear() {
        let mut r = Reconciler::new();
        r.apply(Update::LiveMessage("Sound check".to_string()));
        assert_eq!(r.state().live_message.as_deref(), Some("Sound check"));
        r.clear_live_message();
        assert!(r.state().live_message.is_none());
    }
}
