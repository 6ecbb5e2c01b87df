//! Submission and campaign persistence.
//!
//! The commit engine only writes through these traits. Both are
//! row-granular: there is no file-level transaction, and
//! [`SubmissionStore::create_submission`] is idempotent on
//! `(idempotency_key, row_ordinal)` so a repeated commit never duplicates a
//! row.
//!
//! | Type | Backing |
//! |------|---------|
//! | [`SqliteStore`] | `submissions` / `campaigns` tables |
//! | [`InMemoryStore`] | `RwLock`-guarded maps, with fault injection for tests |

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Campaign, NewSubmission, SubmissionRecord};
use crate::stats::{SubmissionStats, TrackSummary};

/// What the store did with one proposed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    pub record_id: String,
    /// `false` when a record for the same key and ordinal already existed.
    pub created: bool,
}

/// Filter for [`SubmissionStore::list_submissions`].
#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub idempotency_key: Option<String>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create_submission(&self, record: &NewSubmission) -> Result<CreateOutcome>;

    /// Records already committed under `idempotency_key`, by row ordinal.
    async fn committed_records(&self, idempotency_key: &str) -> Result<Vec<SubmissionRecord>>;

    /// Records ordered by key then row ordinal.
    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>>;

    /// `false` when no record has that id.
    async fn delete_submission(&self, id: &str) -> Result<bool>;

    /// Totals over all submissions, or those linked to `artist_id`.
    async fn submission_stats(&self, artist_id: Option<&str>) -> Result<SubmissionStats>;

    /// Per-song outcome counts, most recently submitted first.
    async fn track_summaries(&self, artist_id: Option<&str>) -> Result<Vec<TrackSummary>>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn upsert_campaign(&self, idempotency_key: &str, campaign: &Campaign) -> Result<()>;

    async fn get_campaign(&self, idempotency_key: &str) -> Result<Option<Campaign>>;
}
