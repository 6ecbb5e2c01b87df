//! In-memory store for tests.
//!
//! [`InMemoryStore::fail_writes_after`] makes the store start refusing
//! writes after a number of successful creates, which is how the commit
//! engine's partial-failure path is exercised.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CampaignStore, CreateOutcome, SubmissionFilter, SubmissionStore};
use crate::models::{Campaign, NewSubmission, SubmissionRecord};
use crate::stats::{compute_stats, summarize_tracks, SubmissionStats, TrackSummary};

pub struct InMemoryStore {
    /// Keyed by (idempotency key, row ordinal) so iteration is ordered.
    submissions: RwLock<BTreeMap<(String, u64), SubmissionRecord>>,
    campaigns: RwLock<HashMap<String, Campaign>>,
    writes_left: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            submissions: RwLock::new(BTreeMap::new()),
            campaigns: RwLock::new(HashMap::new()),
            writes_left: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `n` more record creations, then fail every write.
    pub fn fail_writes_after(&self, n: usize) {
        self.writes_left.store(n, Ordering::SeqCst);
    }

    /// Lift a limit set by [`fail_writes_after`](Self::fail_writes_after).
    pub fn heal(&self) {
        self.writes_left.store(usize::MAX, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.submissions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn create_submission(&self, record: &NewSubmission) -> Result<CreateOutcome> {
        let key = (record.idempotency_key.clone(), record.row_ordinal);
        let mut submissions = self.submissions.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = submissions.get(&key) {
            return Ok(CreateOutcome {
                record_id: existing.id.clone(),
                created: false,
            });
        }

        let allowed = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            bail!("simulated store outage");
        }

        let id = Uuid::new_v4().to_string();
        submissions.insert(
            key,
            SubmissionRecord {
                id: id.clone(),
                idempotency_key: record.idempotency_key.clone(),
                row_ordinal: record.row_ordinal,
                source_filename: record.source_filename.clone(),
                vendor: record.vendor,
                artist_id: record.artist_id.clone(),
                song_id: record.song_id.clone(),
                catalog_key: record.catalog_key.clone(),
                unmatched_reason: record.unmatched_reason,
                raw_json: record.raw_json.clone(),
                fields: record.fields.clone(),
                campaign: record.campaign.clone(),
                created_at: Utc::now(),
            },
        );

        Ok(CreateOutcome {
            record_id: id,
            created: true,
        })
    }

    async fn committed_records(&self, idempotency_key: &str) -> Result<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        Ok(submissions
            .iter()
            .filter(|((key, _), _)| key == idempotency_key)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        Ok(submissions
            .values()
            .filter(|r| {
                filter
                    .idempotency_key
                    .as_ref()
                    .map_or(true, |k| &r.idempotency_key == k)
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn delete_submission(&self, id: &str) -> Result<bool> {
        let mut submissions = self.submissions.write().unwrap_or_else(|e| e.into_inner());
        let before = submissions.len();
        submissions.retain(|_, r| r.id != id);
        Ok(submissions.len() < before)
    }

    async fn submission_stats(&self, artist_id: Option<&str>) -> Result<SubmissionStats> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        Ok(compute_stats(
            submissions.values().filter(|r| by_artist(r, artist_id)),
        ))
    }

    async fn track_summaries(&self, artist_id: Option<&str>) -> Result<Vec<TrackSummary>> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        Ok(summarize_tracks(
            submissions.values().filter(|r| by_artist(r, artist_id)),
        ))
    }
}

fn by_artist(record: &SubmissionRecord, artist_id: Option<&str>) -> bool {
    artist_id.map_or(true, |id| record.artist_id.as_deref() == Some(id))
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn upsert_campaign(&self, idempotency_key: &str, campaign: &Campaign) -> Result<()> {
        let mut campaigns = self.campaigns.write().unwrap_or_else(|e| e.into_inner());
        campaigns.insert(idempotency_key.to_string(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, idempotency_key: &str) -> Result<Option<Campaign>> {
        let campaigns = self.campaigns.read().unwrap_or_else(|e| e.into_inner());
        Ok(campaigns.get(idempotency_key).cloned())
    }
}
