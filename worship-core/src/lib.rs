//! # worship-core — Setlist model for live worship presentation
//!
//! Holds the data a live-event screen works from and the pure helpers the
//! renderer and exporter share.
//!
//! ## Modules
//!
//! - [`catalog`] — Event / EventSong / Song / Lyric, loaded from the API's JSON shape
//! - [`structure`] — Groups lyric lines into Verse / Chorus / ... sections
//! - [`slide`] — Maps a lyric position to the title, lyric page, or end slide

pub mod catalog;
pub mod slide;
pub mod structure;

pub use catalog::{
    CatalogError, ChordAnnotation, Event, EventId, EventSong, Lyric, Song, SongId, SongType,
};
pub use slide::{clamp_position, Slide, PAGE_SIZE};
pub use structure::{group_by_structure, Section};
