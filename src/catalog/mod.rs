//! Read-only catalog access.
//!
//! The [`Catalog`] trait is the seam between the matcher and whatever holds
//! the label's artists and songs. Lookups take keys already built by
//! [`crate::normalize`]; implementations compare against keys computed the
//! same way when the catalog was loaded.
//!
//! Two implementations ship with the crate:
//!
//! | Type | Backing |
//! |------|---------|
//! | [`SqliteCatalog`] | `artists` / `catalog_songs` tables |
//! | [`InMemoryCatalog`] | `RwLock`-guarded vectors, for tests |
//!
//! [`parse_catalog_csv`] reads the seed format used by `promo catalog load`.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{CatalogArtist, CatalogSong};

/// Which artists a song lookup is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongScope {
    Any,
    Artists(Vec<String>),
}

impl SongScope {
    pub fn admits(&self, artist_id: &str) -> bool {
        match self {
            SongScope::Any => true,
            SongScope::Artists(ids) => ids.iter().any(|id| id == artist_id),
        }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Songs whose exact normalized title equals `normalized_title`.
    async fn find_songs(&self, normalized_title: &str, scope: &SongScope)
        -> Result<Vec<CatalogSong>>;

    /// Songs whose loose title key equals `loose_title`.
    async fn find_songs_loose(&self, loose_title: &str, scope: &SongScope)
        -> Result<Vec<CatalogSong>>;

    /// Artists whose normalized name equals `normalized_name`.
    async fn find_artists(&self, normalized_name: &str) -> Result<Vec<CatalogArtist>>;

    async fn get_song(&self, song_id: &str) -> Result<Option<CatalogSong>>;

    async fn get_artist(&self, artist_id: &str) -> Result<Option<CatalogArtist>>;
}

/// Artists and songs read from a catalog seed file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CatalogSeed {
    pub artists: Vec<CatalogArtist>,
    pub songs: Vec<CatalogSong>,
}

/// Parse a catalog seed CSV with the header
/// `artist_id,artist_name,song_id,title,isrc,upc`.
///
/// One line per song; the artist columns repeat. `isrc` and `upc` may be
/// empty. Artists are deduplicated by id, first name wins.
pub fn parse_catalog_csv(bytes: &[u8]) -> Result<CatalogSeed> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers().context("reading catalog header")?.clone();
    let index = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("catalog file is missing the '{}' column", name))
    };
    let artist_id_col = index("artist_id")?;
    let artist_name_col = index("artist_name")?;
    let song_id_col = index("song_id")?;
    let title_col = index("title")?;
    let isrc_col = headers.iter().position(|h| h.eq_ignore_ascii_case("isrc"));
    let upc_col = headers.iter().position(|h| h.eq_ignore_ascii_case("upc"));

    let mut seed = CatalogSeed::default();
    let mut seen_artists: HashMap<String, usize> = HashMap::new();

    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading catalog record {}", i + 1))?;
        let get = |col: usize| record.get(col).unwrap_or("").to_string();
        let optional = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let artist_id = get(artist_id_col);
        let song_id = get(song_id_col);
        let title = get(title_col);
        if artist_id.is_empty() || song_id.is_empty() || title.is_empty() {
            bail!(
                "catalog record {} needs artist_id, song_id and title",
                i + 1
            );
        }

        if !seen_artists.contains_key(&artist_id) {
            seen_artists.insert(artist_id.clone(), seed.artists.len());
            seed.artists.push(CatalogArtist {
                artist_id: artist_id.clone(),
                name: get(artist_name_col),
            });
        }

        seed.songs.push(CatalogSong {
            song_id,
            artist_id,
            canonical_title: title,
            isrc: optional(isrc_col),
            upc: optional(upc_col),
        });
    }

    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seed_file() {
        let csv = "artist_id,artist_name,song_id,title,isrc,upc\n\
                   a1,Jonathan Fitas,s1,Radiance,USRC1,\n\
                   a1,Jonathan Fitas,s2,Golden Hour,,0001\n\
                   a2,Other,s3,Radiance,,\n";
        let seed = parse_catalog_csv(csv.as_bytes()).unwrap();
        assert_eq!(seed.artists.len(), 2);
        assert_eq!(seed.songs.len(), 3);
        assert_eq!(seed.songs[0].isrc.as_deref(), Some("USRC1"));
        assert_eq!(seed.songs[0].upc, None);
        assert_eq!(seed.songs[1].upc.as_deref(), Some("0001"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = parse_catalog_csv(b"artist_id,song_id,title\na,b,c\n").unwrap_err();
        assert!(err.to_string().contains("artist_name"));
    }

    #[test]
    fn scope_admits() {
        assert!(SongScope::Any.admits("x"));
        let scope = SongScope::Artists(vec!["a1".into()]);
        assert!(scope.admits("a1"));
        assert!(!scope.admits("a2"));
    }
}
