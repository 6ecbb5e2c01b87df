//! SQLite-backed [`Catalog`].
//!
//! Title keys are precomputed into `catalog_songs.normalized_title` and
//! `catalog_songs.loose_title` when songs are inserted, so lookups are plain
//! indexed equality queries.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{Catalog, CatalogSeed, SongScope};
use crate::models::{CatalogArtist, CatalogSong};
use crate::normalize::{loose_title, normalize_artist, normalize_title};

const SONG_COLUMNS: &str = "song_id, artist_id, canonical_title, isrc, upc";

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_artist(&self, artist: &CatalogArtist) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO artists (artist_id, name, normalized_name)
            VALUES (?, ?, ?)
            ON CONFLICT(artist_id) DO UPDATE SET
                name = excluded.name,
                normalized_name = excluded.normalized_name
            "#,
        )
        .bind(&artist.artist_id)
        .bind(&artist.name)
        .bind(normalize_artist(&artist.name))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_song(&self, song: &CatalogSong) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_songs (song_id, artist_id, canonical_title, normalized_title, loose_title, isrc, upc)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(song_id) DO UPDATE SET
                artist_id = excluded.artist_id,
                canonical_title = excluded.canonical_title,
                normalized_title = excluded.normalized_title,
                loose_title = excluded.loose_title,
                isrc = excluded.isrc,
                upc = excluded.upc
            "#,
        )
        .bind(&song.song_id)
        .bind(&song.artist_id)
        .bind(&song.canonical_title)
        .bind(normalize_title(&song.canonical_title))
        .bind(loose_title(&song.canonical_title))
        .bind(&song.isrc)
        .bind(&song.upc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a parsed seed file. Returns `(artists, songs)` written.
    pub async fn load_seed(&self, seed: &CatalogSeed) -> Result<(usize, usize)> {
        for artist in &seed.artists {
            self.upsert_artist(artist).await?;
        }
        for song in &seed.songs {
            self.upsert_song(song).await?;
        }
        Ok((seed.artists.len(), seed.songs.len()))
    }

    async fn songs_by(&self, column: &str, key: &str, scope: &SongScope) -> Result<Vec<CatalogSong>> {
        let sql = format!(
            "SELECT {} FROM catalog_songs WHERE {} = ? ORDER BY song_id",
            SONG_COLUMNS, column
        );
        let rows = sqlx::query(&sql).bind(key).fetch_all(&self.pool).await?;
        let songs = rows
            .iter()
            .map(song_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(songs
            .into_iter()
            .filter(|s| scope.admits(&s.artist_id))
            .collect())
    }
}

fn song_from_row(row: &SqliteRow) -> Result<CatalogSong> {
    Ok(CatalogSong {
        song_id: row.try_get("song_id")?,
        artist_id: row.try_get("artist_id")?,
        canonical_title: row.try_get("canonical_title")?,
        isrc: row.try_get("isrc")?,
        upc: row.try_get("upc")?,
    })
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn find_songs(
        &self,
        normalized_title: &str,
        scope: &SongScope,
    ) -> Result<Vec<CatalogSong>> {
        self.songs_by("normalized_title", normalized_title, scope).await
    }

    async fn find_songs_loose(&self, loose: &str, scope: &SongScope) -> Result<Vec<CatalogSong>> {
        self.songs_by("loose_title", loose, scope).await
    }

    async fn find_artists(&self, normalized_name: &str) -> Result<Vec<CatalogArtist>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT artist_id, name FROM artists WHERE normalized_name = ? ORDER BY artist_id",
        )
        .bind(normalized_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(artist_id, name)| CatalogArtist { artist_id, name })
            .collect())
    }

    async fn get_song(&self, song_id: &str) -> Result<Option<CatalogSong>> {
        let sql = format!("SELECT {} FROM catalog_songs WHERE song_id = ?", SONG_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(song_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(song_from_row).transpose()
    }

    async fn get_artist(&self, artist_id: &str) -> Result<Option<CatalogArtist>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT artist_id, name FROM artists WHERE artist_id = ?")
                .bind(artist_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(artist_id, name)| CatalogArtist { artist_id, name }))
    }
}
