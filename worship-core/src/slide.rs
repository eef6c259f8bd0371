//! Resolves a presentation position into the slide a renderer draws.

use crate::catalog::{Lyric, Song};

/// Lines shown on one lyric slide.
pub const PAGE_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slide<'a> {
    /// Position `0`: song title card.
    Title {
        title: &'a str,
        artist: Option<&'a str>,
    },
    /// Positions `1..=L`: a page of up to [`PAGE_SIZE`] lines starting at
    /// the position.
    Lines(&'a [Lyric]),
    /// Position `L + 1`.
    End,
}

/// Clamp a broadcast position into `[0, L + 1]` for `song`.
///
/// Positions can arrive ahead of the matching song selection, so a position
/// computed for a longer song may reach a client showing a shorter one.
pub fn clamp_position(song: &Song, position: u32) -> u32 {
    position.min(song.end_position())
}

impl<'a> Slide<'a> {
    pub fn resolve(song: &'a Song, position: u32) -> Self {
        let position = clamp_position(song, position);
        if position == 0 {
            return Slide::Title {
                title: &song.title,
                artist: song.artist.as_deref(),
            };
        }
        if position == song.end_position() {
            return Slide::End;
        }
        let start = (position - 1) as usize;
        let end = (start + PAGE_SIZE as usize).min(song.lyrics.len());
        Slide::Lines(&song.lyrics[start..end])
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Slide::End)
    }
}
