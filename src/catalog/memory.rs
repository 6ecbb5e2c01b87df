//! In-memory [`Catalog`] for tests.
//!
//! Normalized keys are computed on insert, the same way the SQLite catalog
//! stores them in its key columns.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{Catalog, CatalogSeed, SongScope};
use crate::models::{CatalogArtist, CatalogSong};
use crate::normalize::{loose_title, normalize_artist, normalize_title};

struct StoredSong {
    song: CatalogSong,
    normalized_title: String,
    loose_title: String,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    artists: RwLock<Vec<CatalogArtist>>,
    songs: RwLock<Vec<StoredSong>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for artist in seed.artists {
            catalog.add_artist(artist);
        }
        for song in seed.songs {
            catalog.add_song(song);
        }
        catalog
    }

    pub fn add_artist(&self, artist: CatalogArtist) {
        let mut artists = self.artists.write().unwrap_or_else(|e| e.into_inner());
        artists.retain(|a| a.artist_id != artist.artist_id);
        artists.push(artist);
    }

    pub fn add_song(&self, song: CatalogSong) {
        let mut songs = self.songs.write().unwrap_or_else(|e| e.into_inner());
        songs.retain(|s| s.song.song_id != song.song_id);
        songs.push(StoredSong {
            normalized_title: normalize_title(&song.canonical_title),
            loose_title: loose_title(&song.canonical_title),
            song,
        });
    }

    /// Drop a song, as if it had been deleted from the catalog.
    pub fn remove_song(&self, song_id: &str) {
        let mut songs = self.songs.write().unwrap_or_else(|e| e.into_inner());
        songs.retain(|s| s.song.song_id != song_id);
    }

    fn songs_where(&self, scope: &SongScope, pred: impl Fn(&StoredSong) -> bool) -> Vec<CatalogSong> {
        let songs = self.songs.read().unwrap_or_else(|e| e.into_inner());
        songs
            .iter()
            .filter(|s| scope.admits(&s.song.artist_id) && pred(s))
            .map(|s| s.song.clone())
            .collect()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn find_songs(
        &self,
        normalized_title: &str,
        scope: &SongScope,
    ) -> Result<Vec<CatalogSong>> {
        Ok(self.songs_where(scope, |s| s.normalized_title == normalized_title))
    }

    async fn find_songs_loose(
        &self,
        loose: &str,
        scope: &SongScope,
    ) -> Result<Vec<CatalogSong>> {
        Ok(self.songs_where(scope, |s| s.loose_title == loose))
    }

    async fn find_artists(&self, normalized_name: &str) -> Result<Vec<CatalogArtist>> {
        let artists = self.artists.read().unwrap_or_else(|e| e.into_inner());
        Ok(artists
            .iter()
            .filter(|a| normalize_artist(&a.name) == normalized_name)
            .cloned()
            .collect())
    }

    async fn get_song(&self, song_id: &str) -> Result<Option<CatalogSong>> {
        let songs = self.songs.read().unwrap_or_else(|e| e.into_inner());
        Ok(songs
            .iter()
            .find(|s| s.song.song_id == song_id)
            .map(|s| s.song.clone()))
    }

    async fn get_artist(&self, artist_id: &str) -> Result<Option<CatalogArtist>> {
        let artists = self.artists.read().unwrap_or_else(|e| e.into_inner());
        Ok(artists.iter().find(|a| a.artist_id == artist_id).cloned())
    }
}
