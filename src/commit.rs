//! Persisting reconciled rows.
//!
//! Every valid row (matched or not) becomes one submission record; invalid
//! rows are only reported. Writes are per row with no enclosing
//! transaction. The store's create is idempotent on
//! `(idempotency_key, row_ordinal)`, so re-running a commit after a fault
//! writes only what is missing and reports the rest as already committed.
//!
//! Rows that were already committed are reported from what the store holds,
//! not from this run's reconciliation, so a catalog change between runs
//! does not rewrite history in the summary.
//!
//! Before a matched row is written its song is fetched from the catalog
//! again. A song that vanished since reconciliation is written as
//! `not_found` instead of carrying a dangling reference.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::error::{FileError, ImportFailure};
use crate::models::{
    Campaign, CommitStatus, ImportSummary, MatchResult, NewSubmission, SongMatch,
    SubmissionRecord, UnmatchedReason, UnmatchedSong,
};
use crate::reconcile::{ReconciledRow, Reconciliation};
use crate::store::{CampaignStore, SubmissionStore};

/// Everything about one commit that is not the rows themselves.
pub struct CommitContext<'a> {
    pub source_filename: &'a str,
    pub idempotency_key: &'a str,
    pub campaign: &'a Campaign,
    pub error_display_limit: usize,
}

/// Stores a commit writes through.
#[derive(Clone, Copy)]
pub struct Stores<'a> {
    pub catalog: &'a dyn Catalog,
    pub submissions: &'a dyn SubmissionStore,
    pub campaigns: &'a dyn CampaignStore,
}

/// Rows that made it into the store, in file order.
struct Persisted<'r> {
    row: &'r ReconciledRow,
    result: MatchResult,
    canonical_title: Option<String>,
}

#[derive(Default)]
struct Tally<'r> {
    created: usize,
    already: usize,
    persisted: Vec<Persisted<'r>>,
    /// (line, reason) for valid rows that were not written.
    failed: Vec<(u64, String)>,
}

pub async fn commit(
    recon: &Reconciliation,
    ctx: &CommitContext<'_>,
    stores: Stores<'_>,
    cancel: &CancellationToken,
) -> Result<ImportSummary, ImportFailure> {
    let valid = recon.valid_rows();
    let mut tally = Tally::default();

    if let Err(e) = stores
        .campaigns
        .upsert_campaign(ctx.idempotency_key, ctx.campaign)
        .await
    {
        return Err(stop(recon, ctx, tally, &valid, FileError::StoreFault(e.to_string())));
    }

    let existing: HashMap<u64, SubmissionRecord> = match stores
        .submissions
        .committed_records(ctx.idempotency_key)
        .await
    {
        Ok(records) => records.into_iter().map(|r| (r.row_ordinal, r)).collect(),
        Err(e) => {
            return Err(stop(recon, ctx, tally, &valid, FileError::StoreFault(e.to_string())));
        }
    };

    for row in valid.iter().copied() {
        if cancel.is_cancelled() {
            return Err(stop(recon, ctx, tally, &valid, FileError::Cancelled));
        }

        if let Some(stored) = existing.get(&row.line) {
            tally.already += 1;
            tally.persisted.push(Persisted {
                row,
                result: stored_result(stored),
                canonical_title: None,
            });
            continue;
        }

        let (result, canonical_title) = match revalidate(stores.catalog, &row.result).await {
            Ok(r) => r,
            Err(e) => return Err(stop(recon, ctx, tally, &valid, e)),
        };

        let record = new_submission(row, &result, ctx, recon);
        match stores.submissions.create_submission(&record).await {
            Ok(outcome) => {
                if outcome.created {
                    tally.created += 1;
                } else {
                    tally.already += 1;
                }
                tally.persisted.push(Persisted {
                    row,
                    result,
                    canonical_title,
                });
            }
            Err(e) => {
                tracing::warn!(line = row.line, error = %e, "Submission write failed");
                return Err(stop(recon, ctx, tally, &valid, FileError::StoreFault(e.to_string())));
            }
        }
    }

    let summary = summarize(recon, ctx, tally);
    tracing::info!(
        file = ctx.source_filename,
        created = summary.created_count,
        already_committed = summary.already_committed_count,
        invalid = summary.invalid_count,
        "Commit complete"
    );
    Ok(summary)
}

/// Check a matched song still exists. Returns the result to persist and the
/// catalog's canonical title.
async fn revalidate(
    catalog: &dyn Catalog,
    result: &MatchResult,
) -> Result<(MatchResult, Option<String>), FileError> {
    let MatchResult::Matched { song_id, .. } = result else {
        return Ok((result.clone(), None));
    };
    match catalog.get_song(song_id).await {
        Ok(Some(song)) => Ok((result.clone(), Some(song.canonical_title))),
        Ok(None) => {
            tracing::warn!(song_id = %song_id, "Matched song no longer in catalog");
            Ok((
                MatchResult::Unmatched {
                    reason: UnmatchedReason::NotFound,
                },
                None,
            ))
        }
        Err(e) => Err(FileError::CatalogFault(e.to_string())),
    }
}

/// The match outcome a committed record was written with.
fn stored_result(record: &SubmissionRecord) -> MatchResult {
    match (&record.artist_id, &record.song_id, &record.catalog_key) {
        (Some(artist_id), Some(song_id), Some(catalog_key)) => MatchResult::Matched {
            artist_id: artist_id.clone(),
            song_id: song_id.clone(),
            catalog_key: catalog_key.clone(),
        },
        _ => MatchResult::Unmatched {
            reason: record.unmatched_reason.unwrap_or(UnmatchedReason::NotFound),
        },
    }
}

fn new_submission(
    row: &ReconciledRow,
    result: &MatchResult,
    ctx: &CommitContext<'_>,
    recon: &Reconciliation,
) -> NewSubmission {
    let (artist_id, song_id, catalog_key, unmatched_reason) = match result {
        MatchResult::Matched {
            artist_id,
            song_id,
            catalog_key,
        } => (
            Some(artist_id.clone()),
            Some(song_id.clone()),
            Some(catalog_key.clone()),
            None,
        ),
        MatchResult::Unmatched { reason } => (None, None, None, Some(*reason)),
        MatchResult::Invalid { .. } => (None, None, None, None),
    };

    NewSubmission {
        idempotency_key: ctx.idempotency_key.to_string(),
        row_ordinal: row.line,
        source_filename: ctx.source_filename.to_string(),
        vendor: recon.vendor,
        raw_json: row.raw_json.clone(),
        artist_id,
        song_id,
        catalog_key,
        unmatched_reason,
        fields: row.fields.clone(),
        campaign: ctx.campaign.clone(),
    }
}

/// Mark every valid row not yet persisted as failed and build the failure.
fn stop<'r>(
    recon: &'r Reconciliation,
    ctx: &CommitContext<'_>,
    mut tally: Tally<'r>,
    valid: &[&'r ReconciledRow],
    error: FileError,
) -> ImportFailure {
    let done: HashSet<u64> = tally.persisted.iter().map(|p| p.row.line).collect();
    let reason = match &error {
        FileError::Cancelled => "cancelled".to_string(),
        other => other.to_string(),
    };
    tally.failed = valid
        .iter()
        .filter(|r| !done.contains(&r.line))
        .map(|r| (r.line, reason.clone()))
        .collect();

    tracing::warn!(
        file = ctx.source_filename,
        written = tally.created,
        failed = tally.failed.len(),
        error = %error,
        "Commit stopped early"
    );
    ImportFailure::with_partial(error, summarize(recon, ctx, tally))
}

fn summarize(recon: &Reconciliation, ctx: &CommitContext<'_>, tally: Tally<'_>) -> ImportSummary {
    let mut matched: Vec<SongMatch> = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut unmatched: Vec<UnmatchedSong> = Vec::new();
    let mut seen_unmatched: HashSet<(String, Option<String>)> = HashSet::new();

    for p in &tally.persisted {
        let title = p.row.fields.song_title.clone().unwrap_or_default();
        match &p.result {
            MatchResult::Matched {
                artist_id,
                song_id,
                catalog_key,
            } => {
                if seen_keys.insert(catalog_key.clone()) {
                    matched.push(SongMatch {
                        catalog_key: catalog_key.clone(),
                        song_id: song_id.clone(),
                        artist_id: artist_id.clone(),
                        song_title: p.canonical_title.clone().unwrap_or(title),
                    });
                }
            }
            MatchResult::Unmatched { reason } => {
                let artist_hint = p.row.fields.artist_name.clone();
                if seen_unmatched.insert((title.clone(), artist_hint.clone())) {
                    unmatched.push(UnmatchedSong {
                        song_title: title,
                        artist_hint,
                        reason: *reason,
                    });
                }
            }
            MatchResult::Invalid { .. } => {}
        }
    }

    let mut audit_errors: Vec<(u64, String)> = recon
        .invalid
        .iter()
        .filter_map(|r| match &r.result {
            MatchResult::Invalid { message, .. } => {
                Some((r.line, format!("Row {}: {}", r.line, message)))
            }
            _ => None,
        })
        .collect();
    audit_errors.extend(
        tally
            .failed
            .iter()
            .map(|(line, reason)| (*line, format!("Row {}: not committed ({})", line, reason))),
    );
    audit_errors.sort_by_key(|(line, _)| *line);
    let audit_errors: Vec<String> = audit_errors.into_iter().map(|(_, m)| m).collect();

    let errors: Vec<String> = audit_errors
        .iter()
        .take(ctx.error_display_limit)
        .cloned()
        .collect();
    let errors_omitted = audit_errors.len() - errors.len();

    ImportSummary {
        file_name: ctx.source_filename.to_string(),
        vendor: recon.vendor,
        idempotency_key: ctx.idempotency_key.to_string(),
        status: if tally.failed.is_empty() {
            CommitStatus::Complete
        } else {
            CommitStatus::Partial
        },
        total_rows: recon.total_rows(),
        created_count: tally.created,
        already_committed_count: tally.already,
        invalid_count: recon.invalid.len(),
        failed_count: tally.failed.len(),
        matched_songs: matched,
        unmatched_songs: unmatched,
        errors,
        errors_omitted,
        audit_errors,
        campaign: ctx.campaign.clone(),
    }
}
