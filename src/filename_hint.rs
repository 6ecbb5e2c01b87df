//! Artist / title hints from upload filenames.
//!
//! Vendor exports are commonly saved as `"<Artist> - <Title>.csv"`. The only
//! separator recognized is a hyphen with a single space on each side; a name
//! without it, or with more than one, yields an empty [`EntityHint`]. An empty
//! hint is a normal outcome: the operator can name the artist explicitly.

use std::path::Path;

use crate::models::EntityHint;

const SEPARATOR: &str = " - ";

/// Parse an [`EntityHint`] from a filename. Never fails.
pub fn parse_filename_hint(filename: &str) -> EntityHint {
    // Uploads from Windows browsers may carry a full path.
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let segments: Vec<&str> = stem.split(SEPARATOR).collect();
    if segments.len() != 2 {
        return EntityHint::default();
    }

    let artist = segments[0].trim();
    let title = segments[1].trim();
    if artist.is_empty() || title.is_empty() {
        return EntityHint::default();
    }

    EntityHint {
        artist_name: Some(artist.to_string()),
        song_title: Some(title.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_and_title() {
        let hint = parse_filename_hint("Jonathan Fitas - Radiance.csv");
        assert_eq!(hint.artist_name.as_deref(), Some("Jonathan Fitas"));
        assert_eq!(hint.song_title.as_deref(), Some("Radiance"));
    }

    #[test]
    fn no_separator_is_empty() {
        assert!(parse_filename_hint("export_2024.csv").is_empty());
        assert!(parse_filename_hint("Jonathan Fitas-Radiance.csv").is_empty());
    }

    #[test]
    fn more_than_two_segments_is_empty() {
        assert!(parse_filename_hint("A - B - C.csv").is_empty());
    }

    #[test]
    fn empty_segment_is_empty() {
        assert!(parse_filename_hint(" - Radiance.csv").is_empty());
        assert!(parse_filename_hint("").is_empty());
    }

    #[test]
    fn directories_and_inner_dots() {
        let hint = parse_filename_hint("C:\\Users\\me\\Downloads\\Mr. Blue - Song No. 2.csv");
        assert_eq!(hint.artist_name.as_deref(), Some("Mr. Blue"));
        assert_eq!(hint.song_title.as_deref(), Some("Song No. 2"));

        let hint = parse_filename_hint("uploads/Jonathan Fitas - Radiance.tsv");
        assert_eq!(hint.song_title.as_deref(), Some("Radiance"));
    }

    #[test]
    fn no_extension() {
        let hint = parse_filename_hint("Jonathan Fitas - Radiance");
        assert_eq!(hint.song_title.as_deref(), Some("Radiance"));
    }
}
