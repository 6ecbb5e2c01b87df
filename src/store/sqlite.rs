//! SQLite-backed submission and campaign store.
//!
//! Each record is one `INSERT ... ON CONFLICT DO NOTHING` against
//! `UNIQUE(idempotency_key, row_ordinal)`; a conflict reports the existing
//! record's id with `created = false`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{CampaignStore, CreateOutcome, SubmissionFilter, SubmissionStore};
use crate::models::{
    Budget, Campaign, NewSubmission, SubmissionFields, SubmissionRecord, UnmatchedReason,
    VendorFormat,
};
use crate::stats::{sort_tracks, SubmissionStats, TrackSummary, UNKNOWN_TITLE};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn date_to_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Columns [`record_from_row`] reads, in table order.
const RECORD_COLUMNS: &str = "id, idempotency_key, row_ordinal, source_filename, vendor, raw_json, \
     artist_id, song_id, catalog_key, unmatched_reason, \
     song_title, artist_name, outlet_name, outlet_type, action, feedback, \
     campaign_url, listen_time_secs, sharing_link, submitted_on, responded_on, \
     campaign_name, campaign_budget_cents, created_at";

fn text_to_date(row: &SqliteRow, column: &str) -> Result<Option<NaiveDate>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()?)
}

fn record_from_row(row: &SqliteRow) -> Result<SubmissionRecord> {
    let vendor: String = row.try_get("vendor")?;
    let reason: Option<String> = row.try_get("unmatched_reason")?;
    let listen_time: Option<i64> = row.try_get("listen_time_secs")?;
    let budget: Option<i64> = row.try_get("campaign_budget_cents")?;
    let created_at: i64 = row.try_get("created_at")?;
    let ordinal: i64 = row.try_get("row_ordinal")?;

    Ok(SubmissionRecord {
        id: row.try_get("id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        row_ordinal: ordinal as u64,
        source_filename: row.try_get("source_filename")?,
        vendor: vendor.parse::<VendorFormat>().map_err(|e| anyhow!(e))?,
        artist_id: row.try_get("artist_id")?,
        song_id: row.try_get("song_id")?,
        catalog_key: row.try_get("catalog_key")?,
        unmatched_reason: reason
            .map(|r| r.parse::<UnmatchedReason>().map_err(|e| anyhow!(e)))
            .transpose()?,
        raw_json: row.try_get("raw_json")?,
        fields: SubmissionFields {
            song_title: row.try_get("song_title")?,
            artist_name: row.try_get("artist_name")?,
            outlet_name: row.try_get("outlet_name")?,
            outlet_type: row.try_get("outlet_type")?,
            action: row.try_get("action")?,
            feedback: row.try_get("feedback")?,
            campaign_url: row.try_get("campaign_url")?,
            listen_time_secs: listen_time.map(|s| s as u32),
            sharing_link: row.try_get("sharing_link")?,
            submitted_on: text_to_date(row, "submitted_on")?,
            responded_on: text_to_date(row, "responded_on")?,
        },
        campaign: Campaign {
            name: row.try_get("campaign_name")?,
            budget: budget.map(Budget::from_cents),
        },
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0)
            .ok_or_else(|| anyhow!("bad created_at timestamp {}", created_at))?,
    })
}

// SQL forms of `Outcome::classify`. SQLite's `instr` on `lower(...)` keeps
// them case-insensitive like the Rust side.
const LISTENED: &str = "instr(lower(COALESCE(action, '')), 'listen') > 0";
const APPROVED: &str = "(instr(lower(COALESCE(action, '')), 'approved') > 0 \
     OR instr(lower(COALESCE(action, '')), 'accepted') > 0)";
const DECLINED: &str = "(instr(lower(COALESCE(action, '')), 'declined') > 0 \
     OR instr(lower(COALESCE(action, '')), 'rejected') > 0)";
const SHARED: &str = "instr(lower(COALESCE(action, '')), 'shar') > 0";

fn playlist_expr() -> String {
    format!(
        "(instr(lower(COALESCE(action, '')), 'playlist') > 0 \
         OR instr(lower(COALESCE(action, '')), 'added') > 0 \
         OR (lower(COALESCE(outlet_type, '')) = 'playlist' AND {}))",
        APPROVED
    )
}

fn count_when(expr: &str) -> String {
    format!("COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0)", expr)
}

impl SqliteStore {
    async fn grouped_counts(
        &self,
        column: &str,
        artist_id: Option<&str>,
    ) -> Result<BTreeMap<String, usize>> {
        let sql = format!(
            "SELECT {col}, COUNT(*) FROM submissions \
             WHERE {col} IS NOT NULL AND (?1 IS NULL OR artist_id = ?1) \
             GROUP BY {col}",
            col = column
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .bind(artist_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(k, n)| (k, n as usize)).collect())
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn create_submission(&self, record: &NewSubmission) -> Result<CreateOutcome> {
        let id = Uuid::new_v4().to_string();
        let status = if record.song_id.is_some() {
            "matched"
        } else {
            "unmatched"
        };
        let f = &record.fields;

        let result = sqlx::query(
            r#"
            INSERT INTO submissions (
                id, idempotency_key, row_ordinal, source_filename, vendor, raw_json,
                artist_id, song_id, catalog_key, match_status, unmatched_reason,
                song_title, artist_name, outlet_name, outlet_type, action, feedback,
                campaign_url, listen_time_secs, sharing_link, submitted_on, responded_on,
                campaign_name, campaign_budget_cents, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(idempotency_key, row_ordinal) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&record.idempotency_key)
        .bind(record.row_ordinal as i64)
        .bind(&record.source_filename)
        .bind(record.vendor.as_str())
        .bind(&record.raw_json)
        .bind(&record.artist_id)
        .bind(&record.song_id)
        .bind(&record.catalog_key)
        .bind(status)
        .bind(record.unmatched_reason.map(|r| r.as_str()))
        .bind(&f.song_title)
        .bind(&f.artist_name)
        .bind(&f.outlet_name)
        .bind(&f.outlet_type)
        .bind(&f.action)
        .bind(&f.feedback)
        .bind(&f.campaign_url)
        .bind(f.listen_time_secs.map(i64::from))
        .bind(&f.sharing_link)
        .bind(date_to_text(f.submitted_on))
        .bind(date_to_text(f.responded_on))
        .bind(&record.campaign.name)
        .bind(record.campaign.budget.map(|b| b.cents()))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(CreateOutcome {
                record_id: id,
                created: true,
            });
        }

        let existing: String = sqlx::query_scalar(
            "SELECT id FROM submissions WHERE idempotency_key = ? AND row_ordinal = ?",
        )
        .bind(&record.idempotency_key)
        .bind(record.row_ordinal as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(CreateOutcome {
            record_id: existing,
            created: false,
        })
    }

    async fn committed_records(&self, idempotency_key: &str) -> Result<Vec<SubmissionRecord>> {
        let sql = format!(
            "SELECT {} FROM submissions WHERE idempotency_key = ? ORDER BY row_ordinal",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(idempotency_key)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>> {
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM submissions \
             WHERE (?1 IS NULL OR idempotency_key = ?1) \
             ORDER BY idempotency_key, row_ordinal \
             LIMIT ?2",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&filter.idempotency_key)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete_submission(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn submission_stats(&self, artist_id: Option<&str>) -> Result<SubmissionStats> {
        let sql = format!(
            "SELECT COUNT(*), {}, {}, {} FROM submissions WHERE (?1 IS NULL OR artist_id = ?1)",
            count_when(LISTENED),
            count_when(APPROVED),
            count_when(&playlist_expr())
        );
        let (total, listens, approvals, playlists): (i64, i64, i64, i64) = sqlx::query_as(&sql)
            .bind(artist_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(SubmissionStats {
            total_submissions: total as usize,
            by_vendor: self.grouped_counts("vendor", artist_id).await?,
            by_action: self.grouped_counts("action", artist_id).await?,
            by_outlet_type: self.grouped_counts("outlet_type", artist_id).await?,
            total_listens: listens as usize,
            total_approvals: approvals as usize,
            total_playlists: playlists as usize,
        })
    }

    async fn track_summaries(&self, artist_id: Option<&str>) -> Result<Vec<TrackSummary>> {
        let sql = format!(
            r#"
            SELECT COALESCE(song_title, '{unknown}') AS title, artist_id, catalog_key,
                   COUNT(*) AS total,
                   {listened} AS listened,
                   {approved} AS approved,
                   {declined} AS declined,
                   {shared} AS shared,
                   {playlists} AS playlists,
                   GROUP_CONCAT(DISTINCT vendor) AS vendors,
                   MAX(submitted_on) AS latest
            FROM submissions
            WHERE (?1 IS NULL OR artist_id = ?1)
            GROUP BY title, catalog_key, artist_id
            "#,
            unknown = UNKNOWN_TITLE,
            listened = count_when(LISTENED),
            approved = count_when(APPROVED),
            declined = count_when(DECLINED),
            shared = count_when(SHARED),
            playlists = count_when(&playlist_expr()),
        );
        let rows = sqlx::query(&sql)
            .bind(artist_id)
            .fetch_all(&self.pool)
            .await?;

        let mut tracks = Vec::with_capacity(rows.len());
        for row in &rows {
            let vendors: Option<String> = row.try_get("vendors")?;
            let mut vendors: Vec<String> = vendors
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            vendors.sort();
            let count = |column: &str| -> Result<usize> {
                let n: i64 = row.try_get(column)?;
                Ok(n as usize)
            };

            tracks.push(TrackSummary {
                song_title: row.try_get("title")?,
                artist_id: row.try_get("artist_id")?,
                catalog_key: row.try_get("catalog_key")?,
                total_submissions: count("total")?,
                total_listened: count("listened")?,
                total_approved: count("approved")?,
                total_declined: count("declined")?,
                total_shared: count("shared")?,
                total_playlists: count("playlists")?,
                vendors,
                latest_submitted_on: text_to_date(row, "latest")?,
            });
        }
        sort_tracks(&mut tracks);
        Ok(tracks)
    }
}

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn upsert_campaign(&self, idempotency_key: &str, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (idempotency_key, name, budget_cents, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(idempotency_key) DO UPDATE SET
                name = excluded.name,
                budget_cents = excluded.budget_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(idempotency_key)
        .bind(&campaign.name)
        .bind(campaign.budget.map(|b| b.cents()))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_campaign(&self, idempotency_key: &str) -> Result<Option<Campaign>> {
        let row: Option<(Option<String>, Option<i64>)> =
            sqlx::query_as("SELECT name, budget_cents FROM campaigns WHERE idempotency_key = ?")
                .bind(idempotency_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(name, cents)| Campaign {
            name,
            budget: cents.map(Budget::from_cents),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};

    async fn store(dir: &tempfile::TempDir) -> SqliteStore {
        let mut config = Config::minimal();
        config.db.path = dir.path().join("promo.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn submission(ordinal: u64, title: &str, action: &str, outlet_type: &str) -> NewSubmission {
        NewSubmission {
            idempotency_key: "key-1".into(),
            row_ordinal: ordinal,
            source_filename: "Jonathan Fitas - Radiance.csv".into(),
            vendor: VendorFormat::SubmitHub,
            raw_json: format!(r#"{{"Song":"{}"}}"#, title),
            artist_id: Some("a1".into()),
            song_id: Some("s1".into()),
            catalog_key: Some("USRC17607839".into()),
            unmatched_reason: None,
            fields: SubmissionFields {
                song_title: Some(title.into()),
                outlet_name: Some("Indie Blog".into()),
                outlet_type: Some(outlet_type.into()),
                action: Some(action.into()),
                feedback: Some("Loved it".into()),
                listen_time_secs: Some(180),
                submitted_on: NaiveDate::from_ymd_opt(2024, 3, ordinal as u32),
                responded_on: NaiveDate::from_ymd_opt(2024, 3, 20),
                ..Default::default()
            },
            campaign: Campaign::new(Some("Spring"), Some(Budget::from_cents(15000))),
        }
    }

    #[tokio::test]
    async fn reads_back_every_stored_field() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(&dir).await;
        let new = submission(1, "Radiance", "Approved", "blog");
        store.create_submission(&new).await.unwrap();

        let records = store.committed_records("key-1").await.unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.raw_json, new.raw_json);
        assert_eq!(r.fields, new.fields);
        assert_eq!(r.campaign, new.campaign);
        assert_eq!(r.catalog_key.as_deref(), Some("USRC17607839"));
    }

    #[tokio::test]
    async fn stats_tracks_and_delete() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(&dir).await;
        store
            .create_submission(&submission(1, "Radiance", "Approved", "playlist"))
            .await
            .unwrap();
        store
            .create_submission(&submission(2, "Radiance", "Declined", "blog"))
            .await
            .unwrap();
        let mut other = submission(3, "Afterglow", "Listened", "radio");
        other.artist_id = Some("a2".into());
        other.song_id = None;
        other.catalog_key = None;
        other.unmatched_reason = Some(UnmatchedReason::NotFound);
        store.create_submission(&other).await.unwrap();

        let stats = store.submission_stats(None).await.unwrap();
        assert_eq!(stats.total_submissions, 3);
        assert_eq!(stats.by_vendor["submithub"], 3);
        assert_eq!(stats.by_action["Declined"], 1);
        assert_eq!(stats.by_outlet_type["playlist"], 1);
        assert_eq!(stats.total_listens, 1);
        assert_eq!(stats.total_approvals, 1);
        assert_eq!(stats.total_playlists, 1);

        let scoped = store.submission_stats(Some("a1")).await.unwrap();
        assert_eq!(scoped.total_submissions, 2);
        assert_eq!(scoped.total_listens, 0);

        let tracks = store.track_summaries(None).await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].song_title, "Afterglow");
        assert_eq!(tracks[0].total_listened, 1);
        assert_eq!(tracks[1].song_title, "Radiance");
        assert_eq!(tracks[1].total_submissions, 2);
        assert_eq!(tracks[1].total_approved, 1);
        assert_eq!(tracks[1].total_declined, 1);
        assert_eq!(tracks[1].total_playlists, 1);
        assert_eq!(tracks[1].vendors, vec!["submithub"]);
        assert_eq!(tracks[1].latest_submitted_on, NaiveDate::from_ymd_opt(2024, 3, 2));

        let id = store.committed_records("key-1").await.unwrap()[0].id.clone();
        assert!(store.delete_submission(&id).await.unwrap());
        assert!(!store.delete_submission(&id).await.unwrap());
        assert_eq!(store.submission_stats(None).await.unwrap().total_submissions, 2);
    }
}
