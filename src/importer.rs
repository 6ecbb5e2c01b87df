//! The import pipeline as seen by the CLI and the HTTP server.
//!
//! [`Importer`] wires the stages together for one file:
//!
//! ```text
//! bytes ─▶ sniff ─▶ filename hint ─▶ reconcile ─▶ commit ─▶ ImportSummary
//! ```
//!
//! [`Importer::analyze`] stops after sniffing and never touches a store.
//! [`Importer::commit_batch`] runs the whole pipeline over many files; see
//! [`crate::batch`].

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::batch::{self, BatchFile, BatchReport};
use crate::catalog::{Catalog, SqliteCatalog};
use crate::commit::{self, CommitContext, Stores};
use crate::config::ImportConfig;
use crate::error::{FileError, ImportFailure};
use crate::filename_hint::parse_filename_hint;
use crate::idempotency::idempotency_key;
use crate::models::{Campaign, ColumnRole, EntityHint, ImportSummary, SubmissionRecord};
use crate::progress::BatchProgressReporter;
use crate::reconcile::reconcile;
use crate::sniff::{sniff, FilePreview, PreviewWarning};
use crate::stats::{SubmissionStats, TrackSummary};
use crate::store::{CampaignStore, SqliteStore, SubmissionFilter, SubmissionStore};

/// One file to commit.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// Operator-selected artist; overrides any artist found in the file.
    pub explicit_artist_id: Option<String>,
    pub campaign: Campaign,
}

/// Result of [`analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub file_name: String,
    pub hint: EntityHint,
    #[serde(flatten)]
    pub preview: FilePreview,
}

#[derive(Clone)]
pub struct Importer {
    catalog: Arc<dyn Catalog>,
    submissions: Arc<dyn SubmissionStore>,
    campaigns: Arc<dyn CampaignStore>,
    settings: ImportConfig,
}

impl Importer {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        submissions: Arc<dyn SubmissionStore>,
        campaigns: Arc<dyn CampaignStore>,
        settings: ImportConfig,
    ) -> Self {
        Self {
            catalog,
            submissions,
            campaigns,
            settings,
        }
    }

    /// Importer backed by the SQLite catalog and store sharing one pool.
    pub fn sqlite(pool: SqlitePool, settings: ImportConfig) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        Self::new(
            Arc::new(SqliteCatalog::new(pool)),
            store.clone(),
            store,
            settings,
        )
    }

    pub fn settings(&self) -> &ImportConfig {
        &self.settings
    }

    /// Structural preview of a file. Side-effect free.
    pub fn analyze(&self, bytes: &[u8], filename: &str) -> Result<Analysis, FileError> {
        analyze(bytes, filename, &self.settings)
    }

    /// Run the full pipeline for one file.
    pub async fn commit(
        &self,
        request: &CommitRequest,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ImportFailure> {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled.into());
        }

        let parsed = sniff(&request.bytes, self.settings.delimiter_byte())?;
        let hint = parse_filename_hint(&request.filename);
        let key = idempotency_key(&request.bytes, &request.campaign);

        tracing::info!(
            file = %request.filename,
            vendor = parsed.vendor.as_str(),
            rows = parsed.rows.len(),
            "Importing file"
        );

        let recon = reconcile(
            &parsed,
            &hint,
            request.explicit_artist_id.as_deref(),
            self.catalog.as_ref(),
            cancel,
        )
        .await?;

        tracing::debug!(
            matched = recon.valid_matched.len(),
            unmatched = recon.valid_unmatched.len(),
            invalid = recon.invalid.len(),
            "Reconciled"
        );

        let ctx = CommitContext {
            source_filename: &request.filename,
            idempotency_key: &key,
            campaign: &request.campaign,
            error_display_limit: self.settings.error_display_limit,
        };
        let stores = Stores {
            catalog: self.catalog.as_ref(),
            submissions: self.submissions.as_ref(),
            campaigns: self.campaigns.as_ref(),
        };
        commit::commit(&recon, &ctx, stores, cancel).await
    }

    /// Commit many files with bounded concurrency. Outcomes come back in
    /// input order.
    pub async fn commit_batch(
        &self,
        files: Vec<BatchFile>,
        cancel: &CancellationToken,
        reporter: &dyn BatchProgressReporter,
    ) -> BatchReport {
        batch::run_batch(self, files, cancel, reporter).await
    }

    pub async fn list_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> anyhow::Result<Vec<SubmissionRecord>> {
        self.submissions.list_submissions(filter).await
    }

    /// `false` when no submission has that id.
    pub async fn delete_submission(&self, id: &str) -> anyhow::Result<bool> {
        let deleted = self.submissions.delete_submission(id).await?;
        if deleted {
            tracing::info!(id, "Deleted submission");
        }
        Ok(deleted)
    }

    pub async fn submission_stats(&self, artist_id: Option<&str>) -> anyhow::Result<SubmissionStats> {
        self.submissions.submission_stats(artist_id).await
    }

    pub async fn track_summaries(&self, artist_id: Option<&str>) -> anyhow::Result<Vec<TrackSummary>> {
        self.submissions.track_summaries(artist_id).await
    }

    pub async fn get_campaign(&self, idempotency_key: &str) -> anyhow::Result<Option<Campaign>> {
        self.campaigns.get_campaign(idempotency_key).await
    }
}

/// Sniff `bytes` and read the filename hint without any catalog or store.
///
/// Adds the warnings that depend on the hint: no hint at all, and no source
/// for a song title (no title column, no campaign URL, no hint title).
pub fn analyze(bytes: &[u8], filename: &str, settings: &ImportConfig) -> Result<Analysis, FileError> {
    let parsed = sniff(bytes, settings.delimiter_byte())?;
    let hint = parse_filename_hint(filename);
    let mut preview = parsed.preview(settings.sample_rows);

    if hint.is_empty() {
        preview.warnings.push(PreviewWarning::NoFilenameHint);
    }
    let title_available = parsed.has_role(ColumnRole::SongTitle)
        || parsed.has_role(ColumnRole::CampaignUrl)
        || hint.song_title.is_some();
    if !title_available {
        preview.warnings.push(PreviewWarning::MissingColumn {
            role: ColumnRole::SongTitle,
        });
    }

    Ok(Analysis {
        file_name: filename.to_string(),
        hint,
        preview,
    })
}
