//! Setlist catalog: the event, song, and lyric model a live screen is seeded with.
//!
//! The shape mirrors the JSON payload returned by the event-by-id fetch
//! (camelCase field names), so a fetched body can be handed to
//! [`Event::from_json`] directly. Loading normalizes ordering:
//! setlist entries are sorted by `order`, lyrics by `position`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Song identifier. `0` is reserved for "no song selected".
pub type SongId = u64;

/// Event identifier, used to scope the live topic namespace.
pub type EventId = u64;

/// Lowest transpose accepted on a setlist entry, in semitones.
pub const MIN_TRANSPOSE: i8 = -6;
/// Highest transpose accepted on a setlist entry, in semitones.
pub const MAX_TRANSPOSE: i8 = 6;

/// Catalog loading and validation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("song {song_id}: transpose {transpose} outside -6..=6")]
    TransposeOutOfRange { song_id: SongId, transpose: i8 },

    #[error("song {song_id}: lyric positions are 1-based, found 0")]
    ZeroLyricPosition { song_id: SongId },

    #[error("song {song_id}: duplicate lyric position {position}")]
    DuplicateLyricPosition { song_id: SongId, position: u32 },

    #[error("duplicate setlist order {order}")]
    DuplicateOrder { order: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongType {
    Worship,
    Praise,
}

/// A chord placed over a lyric line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordAnnotation {
    /// Chord symbol as written, e.g. `"G/B"`.
    pub chord: String,
    /// Character offset into the lyric text the chord sits above.
    #[serde(default)]
    pub offset: usize,
}

/// One lyric line of a song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lyric {
    pub id: u64,
    /// 1-based, unique within the song.
    pub position: u32,
    pub text: String,
    /// Section label such as `"Verse"` or `"Chorus"`.
    pub structure: String,
    #[serde(default)]
    pub chords: Vec<ChordAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub song_type: SongType,
    /// Musical key, `None` when the song has no key recorded.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub lyrics: Vec<Lyric>,
}

impl Song {
    /// Number of lyric lines (`L`). Slide positions run from `0` (title)
    /// through `L + 1` (end slide).
    pub fn line_count(&self) -> u32 {
        self.lyrics.len() as u32
    }

    /// Position of the end slide for this song.
    pub fn end_position(&self) -> u32 {
        self.line_count() + 1
    }

    fn normalize(&mut self) -> Result<(), CatalogError> {
        self.lyrics.sort_by_key(|l| l.position);
        let mut seen = HashSet::with_capacity(self.lyrics.len());
        for lyric in &self.lyrics {
            if lyric.position == 0 {
                return Err(CatalogError::ZeroLyricPosition { song_id: self.id });
            }
            if !seen.insert(lyric.position) {
                return Err(CatalogError::DuplicateLyricPosition {
                    song_id: self.id,
                    position: lyric.position,
                });
            }
        }
        Ok(())
    }
}

/// A song's slot in an event setlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSong {
    /// 1-based setlist position.
    pub order: u32,
    /// Semitones, within `MIN_TRANSPOSE..=MAX_TRANSPOSE`.
    #[serde(default)]
    pub transpose: i8,
    pub song: Song,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    /// ISO-8601 date as delivered by the API.
    pub date: String,
    pub band_id: u64,
    #[serde(default)]
    pub songs: Vec<EventSong>,
}

impl Event {
    /// Parse and normalize an event payload.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let mut event: Event = serde_json::from_str(json)?;
        event.normalize()?;
        log::debug!(
            "Loaded event {} ({}) with {} songs",
            event.id,
            event.title,
            event.songs.len()
        );
        Ok(event)
    }

    /// Read an event payload from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    fn normalize(&mut self) -> Result<(), CatalogError> {
        self.songs.sort_by_key(|s| s.order);
        let mut orders = HashSet::with_capacity(self.songs.len());
        for entry in &mut self.songs {
            if !orders.insert(entry.order) {
                return Err(CatalogError::DuplicateOrder { order: entry.order });
            }
            if !(MIN_TRANSPOSE..=MAX_TRANSPOSE).contains(&entry.transpose) {
                return Err(CatalogError::TransposeOutOfRange {
                    song_id: entry.song.id,
                    transpose: entry.transpose,
                });
            }
            entry.song.normalize()?;
        }
        Ok(())
    }

    /// Look up a setlist song by id.
    pub fn song(&self, song_id: SongId) -> Option<&Song> {
        self.songs
            .iter()
            .map(|entry| &entry.song)
            .find(|song| song.id == song_id)
    }

    /// The song following `song_id` in setlist order.
    pub fn next_song(&self, song_id: SongId) -> Option<&Song> {
        let index = self.songs.iter().position(|e| e.song.id == song_id)?;
        self.songs.get(index + 1).map(|entry| &entry.song)
    }

    /// Song ids in setlist order.
    pub fn song_ids(&self) -> Vec<SongId> {
        self.songs.iter().map(|entry| entry.song.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT_JSON: &str = r#"{
        "id": 42,
        "title": "Sunday Service",
        "date": "2026-10-18",
        "bandId": 7,
        "songs": [
            {
                "order": 2,
                "transpose": -2,
                "song": {
                    "id": 18,
                    "title": "Second",
                    "songType": "praise",
                    "key": null,
                    "lyrics": [
                        { "id": 3, "position": 2, "text": "b", "structure": "Verse" },
                        { "id": 2, "position": 1, "text": "a", "structure": "Verse",
                          "chords": [ { "chord": "G", "offset": 0 } ] }
                    ]
                }
            },
            {
                "order": 1,
                "song": {
                    "id": 17,
                    "title": "First",
                    "artist": "Someone",
                    "songType": "worship",
                    "key": "D"
                }
            }
        ]
    }"#;

    #[test]
    fn test_event_from_json_sorts_setlist_and_lyrics() {
        let event = Event::from_json(EVENT_JSON).unwrap();
        assert_eq!(event.band_id, 7);
        assert_eq!(event.song_ids(), vec![17, 18]);

        let second = event.song(18).unwrap();
        let positions: Vec<u32> = second.lyrics.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(second.lyrics[0].chords[0].chord, "G");
        assert_eq!(second.song_type, SongType::Praise);
        assert!(second.key.is_none());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let event = Event::from_json(EVENT_JSON).unwrap();
        let first = &event.songs[0];
        assert_eq!(first.transpose, 0);
        assert_eq!(first.song.line_count(), 0);
        assert_eq!(first.song.end_position(), 1);
        assert_eq!(first.song.artist.as_deref(), Some("Someone"));
    }

    #[test]
    fn test_next_song() {
        let event = Event::from_json(EVENT_JSON).unwrap();
        assert_eq!(event.next_song(17).map(|s| s.id), Some(18));
        assert!(event.next_song(18).is_none());
        assert!(event.next_song(99).is_none());
    }

    #[test]
    fn test_transpose_out_of_range_rejected() {
        let json = EVENT_JSON.replace("\"transpose\": -2", "\"transpose\": 7");
        match Event::from_json(&json) {
            Err(CatalogError::TransposeOutOfRange { song_id, transpose }) => {
                assert_eq!(song_id, 18);
                assert_eq!(transpose, 7);
            }
            other => panic!("Expected TransposeOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_lyric_position_rejected() {
        let json = EVENT_JSON.replace("\"position\": 2", "\"position\": 1");
        assert!(matches!(
            Event::from_json(&json),
            Err(CatalogError::DuplicateLyricPosition { song_id: 18, position: 1 })
        ));
    }

    #[test]
    fn test_zero_lyric_position_rejected() {
        let json = EVENT_JSON.replace("\"position\": 2", "\"position\": 0");
        assert!(matches!(
            Event::from_json(&json),
            Err(CatalogError::ZeroLyricPosition { song_id: 18 })
        ));
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let json = EVENT_JSON.replace("\"order\": 2", "\"order\": 1");
        assert!(matches!(
            Event::from_json(&json),
            Err(CatalogError::DuplicateOrder { order: 1 })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(Event::from_json("{"), Err(CatalogError::Json(_))));
    }
}
