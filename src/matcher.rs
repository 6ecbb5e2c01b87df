//! Catalog matching for a single row.
//!
//! The matcher is a fixed rule chain, evaluated in order, first success wins:
//!
//! 1. **Scope.** An explicit artist id scopes lookups to that artist. Else an
//!    artist name, if known, is resolved by normalized name; no catalog
//!    artist with that name ends the chain with `artist_not_found`. With no
//!    artist at all the whole catalog is searched.
//! 2. **Exact title.** Normalized title equality within the scope. One song
//!    matches; several is `ambiguous`.
//! 3. **Loose title.** The same on the punctuation-tolerant key.
//! 4. Anything else is `not_found`.
//!
//! The title is the row's own: reconciliation passes the title cell, or the
//! campaign-URL slug when the cell is empty, or the filename hint when both
//! are absent. A title that misses is never retried under another source.
//!
//! Nothing is scored. Two catalog songs that both fit are never silently
//! resolved to one of them.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};

use crate::catalog::{Catalog, SongScope};
use crate::models::{CatalogSong, MatchResult, UnmatchedReason};
use crate::normalize::{loose_title, normalize_artist, normalize_title};

pub struct Matcher<'a> {
    catalog: &'a dyn Catalog,
    explicit_artist_id: Option<String>,
    /// Normalized artist name -> catalog artist ids.
    artist_cache: HashMap<String, Vec<String>>,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a dyn Catalog, explicit_artist_id: Option<String>) -> Self {
        Self {
            catalog,
            explicit_artist_id,
            artist_cache: HashMap::new(),
        }
    }

    /// Match one row given its artist name (if any) and its song title.
    pub async fn match_row(
        &mut self,
        artist_name: Option<&str>,
        title: &str,
    ) -> Result<MatchResult> {
        let Some(scope) = self.resolve_scope(artist_name).await? else {
            return Ok(MatchResult::Unmatched {
                reason: UnmatchedReason::ArtistNotFound,
            });
        };
        self.match_title(&scope, title).await
    }

    /// `None` when an artist name was given but the catalog has no such artist.
    pub async fn resolve_scope(&mut self, artist_name: Option<&str>) -> Result<Option<SongScope>> {
        if let Some(id) = &self.explicit_artist_id {
            return Ok(Some(SongScope::Artists(vec![id.clone()])));
        }

        let Some(name) = artist_name.map(normalize_artist).filter(|n| !n.is_empty()) else {
            return Ok(Some(SongScope::Any));
        };

        if !self.artist_cache.contains_key(&name) {
            let ids = self
                .catalog
                .find_artists(&name)
                .await?
                .into_iter()
                .map(|a| a.artist_id)
                .collect();
            self.artist_cache.insert(name.clone(), ids);
        }

        match self.artist_cache.get(&name) {
            Some(ids) if !ids.is_empty() => Ok(Some(SongScope::Artists(ids.clone()))),
            _ => Ok(None),
        }
    }

    pub async fn match_title(&self, scope: &SongScope, title: &str) -> Result<MatchResult> {
        let not_found = MatchResult::Unmatched {
            reason: UnmatchedReason::NotFound,
        };

        let exact = normalize_title(title);
        if exact.is_empty() {
            return Ok(not_found);
        }
        let found = self.catalog.find_songs(&exact, scope).await?;
        if let Some(result) = decide(found) {
            tracing::debug!(title = %title, rule = "exact", "Title lookup decided");
            return Ok(result);
        }

        let loose = loose_title(title);
        if loose.is_empty() {
            return Ok(not_found);
        }
        let found = self.catalog.find_songs_loose(&loose, scope).await?;
        if let Some(result) = decide(found) {
            tracing::debug!(title = %title, rule = "loose", "Title lookup decided");
            return Ok(result);
        }

        Ok(not_found)
    }
}

/// `None` when nothing was found, so the chain continues.
fn decide(found: Vec<CatalogSong>) -> Option<MatchResult> {
    let mut distinct: BTreeMap<String, CatalogSong> = BTreeMap::new();
    for song in found {
        distinct.entry(song.song_id.clone()).or_insert(song);
    }

    match distinct.len() {
        0 => None,
        1 => distinct.into_values().next().map(|song| MatchResult::Matched {
            catalog_key: song.catalog_key(),
            artist_id: song.artist_id,
            song_id: song.song_id,
        }),
        _ => Some(MatchResult::Unmatched {
            reason: UnmatchedReason::Ambiguous,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::models::CatalogArtist;

    fn song(id: &str, artist: &str, title: &str) -> CatalogSong {
        CatalogSong {
            song_id: id.into(),
            artist_id: artist.into(),
            canonical_title: title.into(),
            isrc: None,
            upc: None,
        }
    }

    fn catalog() -> InMemoryCatalog {
        let c = InMemoryCatalog::new();
        c.add_artist(CatalogArtist {
            artist_id: "a1".into(),
            name: "Jonathan Fitas".into(),
        });
        c.add_artist(CatalogArtist {
            artist_id: "a2".into(),
            name: "Sigur Rós".into(),
        });
        c.add_song(CatalogSong {
            isrc: Some("PTXX12400001".into()),
            ..song("s1", "a1", "Radiance")
        });
        c.add_song(song("s2", "a2", "Radiance"));
        c.add_song(song("s3", "a1", "Don't Stop"));
        c.add_song(song("s4", "a2", "Hoppípolla"));
        c
    }

    #[tokio::test]
    async fn scoped_exact_match() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m
            .match_row(Some("Jonathan Fitas"), "Radiance (Radio Edit)")
            .await
            .unwrap();
        assert_eq!(
            r,
            MatchResult::Matched {
                artist_id: "a1".into(),
                song_id: "s1".into(),
                catalog_key: "PTXX12400001".into()
            }
        );
    }

    #[tokio::test]
    async fn unscoped_duplicate_title_is_ambiguous() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m.match_row(None, "Radiance").await.unwrap();
        assert_eq!(
            r,
            MatchResult::Unmatched {
                reason: UnmatchedReason::Ambiguous
            }
        );
    }

    #[tokio::test]
    async fn explicit_artist_wins_over_name() {
        let c = catalog();
        let mut m = Matcher::new(&c, Some("a2".into()));
        let r = m
            .match_row(Some("Jonathan Fitas"), "radiance")
            .await
            .unwrap();
        assert!(matches!(r, MatchResult::Matched { ref song_id, .. } if song_id == "s2"));
    }

    #[tokio::test]
    async fn loose_match_on_apostrophes() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m.match_row(None, "Dont Stop").await.unwrap();
        assert!(matches!(r, MatchResult::Matched { ref song_id, .. } if song_id == "s3"));
    }

    #[tokio::test]
    async fn diacritics_fold_on_both_sides() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m
            .match_row(Some("sigur ros"), "Hoppipolla")
            .await
            .unwrap();
        assert!(matches!(r, MatchResult::Matched { ref song_id, .. } if song_id == "s4"));
    }

    #[tokio::test]
    async fn unknown_artist_name() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m
            .match_row(Some("Nobody"), "Radiance")
            .await
            .unwrap();
        assert_eq!(
            r,
            MatchResult::Unmatched {
                reason: UnmatchedReason::ArtistNotFound
            }
        );
    }

    #[tokio::test]
    async fn unknown_title_in_scope() {
        let c = catalog();
        let mut m = Matcher::new(&c, None);
        let r = m
            .match_row(Some("Jonathan Fitas"), "Unknown Song")
            .await
            .unwrap();
        assert_eq!(
            r,
            MatchResult::Unmatched {
                reason: UnmatchedReason::NotFound
            }
        );

        let r = m.match_row(Some("Jonathan Fitas"), "   ").await.unwrap();
        assert_eq!(
            r,
            MatchResult::Unmatched {
                reason: UnmatchedReason::NotFound
            }
        );
    }
}
