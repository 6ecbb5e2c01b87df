//! Multi-file imports.
//!
//! Each file runs the full pipeline on its own; at most
//! `max_concurrent_files` run at once. `buffered` keeps outcomes in input
//! order regardless of which file finishes first.
//!
//! A [`BatchFile`] is loaded inside its own slot, so only the files in
//! flight are held in memory, and a file that cannot be read or decoded
//! fails alone with the rest of the batch still running.
//!
//! Cancellation, in terms of what each file reports:
//!
//! | When the token fires | Outcome |
//! |----------------------|---------|
//! | before the file started | `skipped` |
//! | while the file was running | `failed` with `cancelled` (plus any partial summary) |
//! | after the file finished | unchanged |

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::error::FileError;
use crate::importer::{CommitRequest, Importer};
use crate::models::{Campaign, ImportSummary};
use crate::progress::{BatchProgressEvent, BatchProgressReporter};

/// Where a batch file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Bytes(Vec<u8>),
    /// Read when the file's turn comes.
    Path(PathBuf),
    /// Input already known to be unusable, e.g. an upload that failed to
    /// decode. Reported as that file's failure.
    Rejected(FileError),
}

/// One file of a batch, not yet loaded.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub filename: String,
    pub source: FileSource,
    pub explicit_artist_id: Option<String>,
    pub campaign: Campaign,
}

impl BatchFile {
    pub fn from_path(path: &Path, explicit_artist_id: Option<String>, campaign: Campaign) -> Self {
        Self {
            filename: file_name(path),
            source: FileSource::Path(path.to_path_buf()),
            explicit_artist_id,
            campaign,
        }
    }

    pub fn rejected(filename: impl Into<String>, error: FileError) -> Self {
        Self {
            filename: filename.into(),
            source: FileSource::Rejected(error),
            explicit_artist_id: None,
            campaign: Campaign::default(),
        }
    }

    pub async fn load(self) -> Result<CommitRequest, FileError> {
        let bytes = match self.source {
            FileSource::Bytes(bytes) => bytes,
            FileSource::Path(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| FileError::Read(format!("{}: {}", path.display(), e)))?,
            FileSource::Rejected(error) => return Err(error),
        };
        Ok(CommitRequest {
            bytes,
            filename: self.filename,
            explicit_artist_id: self.explicit_artist_id,
            campaign: self.campaign,
        })
    }
}

impl From<CommitRequest> for BatchFile {
    fn from(request: CommitRequest) -> Self {
        Self {
            filename: request.filename,
            source: FileSource::Bytes(request.bytes),
            explicit_artist_id: request.explicit_artist_id,
            campaign: request.campaign,
        }
    }
}

/// Final path component, or the whole path when there is none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// How one file of a batch ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded {
        summary: ImportSummary,
    },
    Failed {
        error: FileError,
        partial: Option<ImportSummary>,
    },
    Skipped,
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Succeeded { .. } => "succeeded",
            FileOutcome::Failed { .. } => "failed",
            FileOutcome::Skipped => "skipped",
        }
    }

    fn created(&self) -> usize {
        match self {
            FileOutcome::Succeeded { summary } => summary.created_count,
            FileOutcome::Failed {
                partial: Some(summary),
                ..
            } => summary.created_count,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub files: Vec<BatchEntry>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchReport {
    fn from_entries(files: Vec<BatchEntry>) -> Self {
        let count = |label: &str| files.iter().filter(|e| e.outcome.label() == label).count();
        Self {
            succeeded: count("succeeded"),
            failed: count("failed"),
            skipped: count("skipped"),
            files,
        }
    }
}

pub async fn run_batch(
    importer: &Importer,
    files: Vec<BatchFile>,
    cancel: &CancellationToken,
    reporter: &dyn BatchProgressReporter,
) -> BatchReport {
    let total = files.len();
    let limit = importer.settings().max_concurrent_files.max(1);

    tracing::info!(files = total, concurrency = limit, "Starting batch import");

    let entries: Vec<BatchEntry> = stream::iter(files.into_iter().enumerate())
        .map(|(index, file)| async move {
            let file_name = file.filename.clone();

            if cancel.is_cancelled() {
                reporter.report(BatchProgressEvent::FileFinished {
                    index,
                    total,
                    file: file_name.clone(),
                    outcome: "skipped",
                    created: 0,
                });
                return BatchEntry {
                    file_name,
                    outcome: FileOutcome::Skipped,
                };
            }

            reporter.report(BatchProgressEvent::FileStarted {
                index,
                total,
                file: file_name.clone(),
            });

            let result = match file.load().await {
                Ok(request) => importer.commit(&request, cancel).await,
                Err(error) => Err(error.into()),
            };
            let outcome = match result {
                Ok(summary) => FileOutcome::Succeeded { summary },
                Err(failure) => {
                    tracing::warn!(file = %file_name, error = %failure.error, "File failed");
                    FileOutcome::Failed {
                        error: failure.error,
                        partial: failure.partial,
                    }
                }
            };

            reporter.report(BatchProgressEvent::FileFinished {
                index,
                total,
                file: file_name.clone(),
                outcome: outcome.label(),
                created: outcome.created(),
            });

            BatchEntry { file_name, outcome }
        })
        .buffered(limit)
        .collect()
        .await;

    let report = BatchReport::from_entries(entries);
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Batch import finished"
    );
    report
}

/// Cancel `token` after `after`, unless it is cancelled first. The returned
/// handle can be aborted once the work it guards is done.
pub fn cancel_after(token: CancellationToken, after: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                tracing::warn!(seconds = after.as_secs(), "Import deadline reached; cancelling");
                token.cancel();
            }
        }
    })
}
