use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index if missing. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            artist_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_songs (
            song_id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            canonical_title TEXT NOT NULL,
            normalized_title TEXT NOT NULL,
            loose_title TEXT NOT NULL,
            isrc TEXT,
            upc TEXT,
            FOREIGN KEY (artist_id) REFERENCES artists(artist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per committed submission; (idempotency_key, row_ordinal) is the dedupe key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            idempotency_key TEXT NOT NULL,
            row_ordinal INTEGER NOT NULL,
            source_filename TEXT NOT NULL,
            vendor TEXT NOT NULL,
            raw_json TEXT NOT NULL DEFAULT '{}',
            artist_id TEXT,
            song_id TEXT,
            catalog_key TEXT,
            match_status TEXT NOT NULL,
            unmatched_reason TEXT,
            song_title TEXT,
            artist_name TEXT,
            outlet_name TEXT,
            outlet_type TEXT,
            action TEXT,
            feedback TEXT,
            campaign_url TEXT,
            listen_time_secs INTEGER,
            sharing_link TEXT,
            submitted_on TEXT,
            responded_on TEXT,
            campaign_name TEXT,
            campaign_budget_cents INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(idempotency_key, row_ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaigns (
            idempotency_key TEXT PRIMARY KEY,
            name TEXT,
            budget_cents INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artists_normalized_name ON artists(normalized_name)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_songs_normalized_title ON catalog_songs(normalized_title)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_loose_title ON catalog_songs(loose_title)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_song_id ON submissions(song_id)")
        .execute(pool)
        .await?;

    Ok(())
}
