//! The presentation record renderers draw from.

use serde::{Deserialize, Serialize};
use worship_core::SongId;

/// Direction hint for the slide transition. Renderers use it to pick an
/// animation; it carries no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LyricAction {
    #[default]
    Forward,
    Backward,
}

/// Slide position plus the direction it was reached from.
///
/// `position` is `0` for the title slide, `1..=L` for lyric lines of the
/// selected song, and `L + 1` for the end slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LyricPosition {
    pub position: u32,
    pub action: LyricAction,
}

impl LyricPosition {
    pub const fn new(position: u32, action: LyricAction) -> Self {
        Self { position, action }
    }

    /// Title slide entered backward, the reset applied on a song change.
    pub const TITLE_BACKWARD: Self = Self::new(0, LyricAction::Backward);
}

/// Per-event live state, one per open live screen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationState {
    /// `0` when no song is selected.
    pub selected_song_id: SongId,
    pub lyric_position: LyricPosition,
    /// Display name of whoever sent the last control message.
    pub driver_name: String,
    /// Transient banner text, cleared automatically after its TTL.
    pub live_message: Option<String>,
}

impl PresentationState {
    pub fn has_song(&self) -> bool {
        self.selected_song_id != 0
    }
}
