//! Driver-side slide navigation.
//!
//! Turns advance/retreat gestures into the [`DriverAction`]s to broadcast.
//! Slides page through a song [`PAGE_SIZE`] lines at a time:
//!
//! ```text
//!  L = 10:  title(0) ─► 1 ─► 5 ─► 9 ─► end(11) ─► next song title(0)
//!  L = 2:   title(0) ─► 1 ─► end(3)
//! ```
//!
//! Leaving the title slide always lands on line 1. Once the page on screen
//! already shows the song's last line, advancing goes to the end slide.

use worship_core::{clamp_position, Event, SongId, PAGE_SIZE};

use crate::channel::DriverAction;
use crate::state::{LyricAction, PresentationState};

/// Driver input, independent of the device it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Advance,
    Retreat,
}

impl Gesture {
    /// Keyboard mapping used by the presenter view.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowRight" | "ArrowDown" | "PageDown" | " " | "n" => Some(Self::Advance),
            "ArrowLeft" | "ArrowUp" | "PageUp" | "p" => Some(Self::Retreat),
            _ => None,
        }
    }
}

/// Next position within a song of `line_count` lines, `None` at the end
/// slide (crossing to the next song is the caller's decision).
pub fn forward_position(position: u32, line_count: u32) -> Option<u32> {
    let end = line_count + 1;
    if position >= end {
        return None;
    }
    if position == 0 {
        // Title slide. A song without lyrics goes straight to its end.
        return Some(if line_count == 0 { end } else { 1 });
    }
    if line_count > PAGE_SIZE && position + (PAGE_SIZE - 1) <= line_count {
        return Some(position + PAGE_SIZE);
    }
    // The page starting at `position` already reaches the last line.
    Some(end)
}

/// Previous position, `None` on the title slide.
pub fn backward_position(position: u32) -> Option<u32> {
    match position {
        0 => None,
        p if p > PAGE_SIZE => Some(p - PAGE_SIZE),
        p => Some(p - 1),
    }
}

/// Computes driver broadcasts against an event's setlist.
pub struct NavigationController<'a> {
    event: &'a Event,
}

impl<'a> NavigationController<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self { event }
    }

    pub fn handle(&self, gesture: Gesture, state: &PresentationState) -> Vec<DriverAction> {
        match gesture {
            Gesture::Advance => self.advance(state),
            Gesture::Retreat => self.retreat(state),
        }
    }

    /// Advance one slide. From the end slide this crosses into the next
    /// setlist song; with nothing selected it opens the first one.
    pub fn advance(&self, state: &PresentationState) -> Vec<DriverAction> {
        if !state.has_song() {
            return match self.event.songs.first() {
                Some(entry) => Self::enter_song(entry.song.id, LyricAction::Forward),
                None => Vec::new(),
            };
        }

        let Some(song) = self.event.song(state.selected_song_id) else {
            log::warn!(
                "Selected song {} is not in event {}",
                state.selected_song_id,
                self.event.id
            );
            return Vec::new();
        };

        let position = clamp_position(song, state.lyric_position.position);
        match forward_position(position, song.line_count()) {
            Some(next) => vec![DriverAction::SelectLyricPosition {
                position: next,
                action: LyricAction::Forward,
            }],
            None => match self.event.next_song(song.id) {
                Some(next_song) => Self::enter_song(next_song.id, LyricAction::Forward),
                None => {
                    log::debug!("Already at the end of the setlist");
                    Vec::new()
                }
            },
        }
    }

    /// Step back one slide. Stays put on a title slide.
    pub fn retreat(&self, state: &PresentationState) -> Vec<DriverAction> {
        if !state.has_song() {
            return Vec::new();
        }
        // A position broadcast for a longer song renders as this song's end
        // slide, so step back from there.
        let position = match self.event.song(state.selected_song_id) {
            Some(song) => clamp_position(song, state.lyric_position.position),
            None => state.lyric_position.position,
        };
        match backward_position(position) {
            Some(previous) => vec![DriverAction::SelectLyricPosition {
                position: previous,
                action: LyricAction::Backward,
            }],
            None => Vec::new(),
        }
    }

    /// Jump to a setlist song's title slide.
    pub fn jump_to_song(&self, song_id: SongId) -> Vec<DriverAction> {
        if self.event.song(song_id).is_none() {
            log::warn!("Song {song_id} is not in event {}", self.event.id);
            return Vec::new();
        }
        Self::enter_song(song_id, LyricAction::Backward)
    }

    fn enter_song(song_id: SongId, action: LyricAction) -> Vec<DriverAction> {
        vec![
            DriverAction::SelectSong(song_id),
            DriverAction::SelectLyricPosition {
                position: 0,
                action,
            },
        ]
    }
}
