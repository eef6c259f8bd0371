//! Groups lyric lines into display sections by their structure label.
//!
//! Both the live slide view and the print/offline exporter section a song
//! through [`group_by_structure`], so the two always agree on section
//! boundaries.

use crate::catalog::Lyric;

/// A run of consecutive lyric lines sharing one structure label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub structure: &'a str,
    pub lines: Vec<&'a Lyric>,
}

impl Section<'_> {
    /// Lyric positions covered by this section, in order.
    pub fn positions(&self) -> Vec<u32> {
        self.lines.iter().map(|l| l.position).collect()
    }
}

/// Fold lyric lines, ordered by `position`, into sections.
///
/// Only adjacent lines merge: a label that reappears after a different one
/// (verse, chorus, verse) opens a new section.
pub fn group_by_structure(lyrics: &[Lyric]) -> Vec<Section<'_>> {
    let mut ordered: Vec<&Lyric> = lyrics.iter().collect();
    ordered.sort_by_key(|l| l.position);

    ordered.into_iter().fold(Vec::new(), |mut sections, lyric| {
        match sections.last_mut() {
            Some(current) if current.structure == lyric.structure => {
                current.lines.push(lyric);
            }
            _ => sections.push(Section {
                structure: &lyric.structure,
                lines: vec![lyric],
            }),
        }
        sections
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(position: u32, structure: &str) -> Lyric {
        Lyric {
            id: u64::from(position) + 100,
            position,
            text: format!("line {position}"),
            structure: structure.to_string(),
            chords: Vec::new(),
        }
    }

    fn summary(sections: &[Section<'_>]) -> Vec<(String, Vec<u32>)> {
        sections
            .iter()
            .map(|s| (s.structure.to_string(), s.positions()))
            .collect()
    }

    #[test]
    fn test_adjacent_lines_merge() {
        let lyrics = vec![line(1, "Verse"), line(2, "Verse"), line(3, "Chorus")];
        let sections = group_by_structure(&lyrics);
        assert_eq!(
            summary(&sections),
            vec![
                ("Verse".to_string(), vec![1, 2]),
                ("Chorus".to_string(), vec![3]),
            ]
        );
    }

    #[test]
    fn test_repeated_label_starts_new_section() {
        let lyrics = vec![
            line(1, "Verse"),
            line(2, "Chorus"),
            line(3, "Verse"),
            line(4, "Verse"),
        ];
        let sections = group_by_structure(&lyrics);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].positions(), vec![1]);
        assert_eq!(sections[2].structure, "Verse");
        assert_eq!(sections[2].positions(), vec![3, 4]);
    }

    #[test]
    fn test_unsorted_input_grouped_by_position() {
        let lyrics = vec![line(3, "Chorus"), line(1, "Verse"), line(2, "Verse")];
        let sections = group_by_structure(&lyrics);
        assert_eq!(sections[0].positions(), vec![1, 2]);
        assert_eq!(sections[1].positions(), vec![3]);
    }

    #[test]
    fn test_empty_song() {
        assert!(group_by_structure(&[]).is_empty());
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let lyrics = vec![line(1, "Verse"), line(2, "verse")];
        assert_eq!(group_by_structure(&lyrics).len(), 2);
    }
}
