//! Aggregates over committed submissions.
//!
//! [`SubmissionStats`] is the overall picture (counts by vendor, action and
//! outlet type); [`TrackSummary`] groups submissions per song. Both are
//! produced by the store: SQLite computes them with `GROUP BY`, the
//! in-memory store folds records with [`compute_stats`] and
//! [`summarize_tracks`]. The outcome rules live in [`Outcome::classify`]
//! and are mirrored by the SQL expressions in `store::sqlite`.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::SubmissionRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionStats {
    pub total_submissions: usize,
    pub by_vendor: BTreeMap<String, usize>,
    pub by_action: BTreeMap<String, usize>,
    pub by_outlet_type: BTreeMap<String, usize>,
    pub total_listens: usize,
    pub total_approvals: usize,
    pub total_playlists: usize,
}

/// Outcome counts for one song across all its submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub song_title: String,
    pub artist_id: Option<String>,
    pub catalog_key: Option<String>,
    pub total_submissions: usize,
    pub total_listened: usize,
    pub total_approved: usize,
    pub total_declined: usize,
    pub total_shared: usize,
    pub total_playlists: usize,
    /// Vendors the song was promoted through, sorted.
    pub vendors: Vec<String>,
    pub latest_submitted_on: Option<NaiveDate>,
}

/// Title used for rows that carried none.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// What a normalized action says happened. Flags are not exclusive: an
/// approval by a playlist outlet is also a playlist placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub listened: bool,
    pub approved: bool,
    pub declined: bool,
    pub shared: bool,
    pub playlist: bool,
}

impl Outcome {
    pub fn classify(action: Option<&str>, outlet_type: Option<&str>) -> Self {
        let action = action.unwrap_or_default().to_lowercase();
        let has = |needle: &str| action.contains(needle);
        let approved = has("approved") || has("accepted");
        let playlist_outlet = outlet_type.is_some_and(|t| t.eq_ignore_ascii_case("playlist"));

        Self {
            listened: has("listen"),
            approved,
            declined: has("declined") || has("rejected"),
            shared: has("shar"),
            playlist: has("playlist") || has("added") || (playlist_outlet && approved),
        }
    }
}

pub fn compute_stats<'a>(records: impl IntoIterator<Item = &'a SubmissionRecord>) -> SubmissionStats {
    let mut stats = SubmissionStats::default();
    for r in records {
        stats.total_submissions += 1;
        *stats
            .by_vendor
            .entry(r.vendor.as_str().to_string())
            .or_default() += 1;
        if let Some(action) = &r.fields.action {
            *stats.by_action.entry(action.clone()).or_default() += 1;
        }
        if let Some(t) = &r.fields.outlet_type {
            *stats.by_outlet_type.entry(t.clone()).or_default() += 1;
        }

        let o = Outcome::classify(r.fields.action.as_deref(), r.fields.outlet_type.as_deref());
        stats.total_listens += o.listened as usize;
        stats.total_approvals += o.approved as usize;
        stats.total_playlists += o.playlist as usize;
    }
    stats
}

type TrackKey = (String, Option<String>, Option<String>);

/// One summary per (title, catalog key, artist), most recently submitted
/// first.
pub fn summarize_tracks<'a>(
    records: impl IntoIterator<Item = &'a SubmissionRecord>,
) -> Vec<TrackSummary> {
    let mut groups: BTreeMap<TrackKey, (TrackSummary, BTreeSet<String>)> = BTreeMap::new();

    for r in records {
        let title = r
            .fields
            .song_title
            .clone()
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let key = (title.clone(), r.catalog_key.clone(), r.artist_id.clone());
        let (track, vendors) = groups.entry(key).or_insert_with(|| {
            (
                TrackSummary {
                    song_title: title,
                    artist_id: r.artist_id.clone(),
                    catalog_key: r.catalog_key.clone(),
                    total_submissions: 0,
                    total_listened: 0,
                    total_approved: 0,
                    total_declined: 0,
                    total_shared: 0,
                    total_playlists: 0,
                    vendors: Vec::new(),
                    latest_submitted_on: None,
                },
                BTreeSet::new(),
            )
        });

        let o = Outcome::classify(r.fields.action.as_deref(), r.fields.outlet_type.as_deref());
        track.total_submissions += 1;
        track.total_listened += o.listened as usize;
        track.total_approved += o.approved as usize;
        track.total_declined += o.declined as usize;
        track.total_shared += o.shared as usize;
        track.total_playlists += o.playlist as usize;
        track.latest_submitted_on = track.latest_submitted_on.max(r.fields.submitted_on);
        vendors.insert(r.vendor.as_str().to_string());
    }

    let mut tracks: Vec<TrackSummary> = groups
        .into_values()
        .map(|(mut t, vendors)| {
            t.vendors = vendors.into_iter().collect();
            t
        })
        .collect();
    sort_tracks(&mut tracks);
    tracks
}

/// Most recent first; undated tracks last; ties by title.
pub fn sort_tracks(tracks: &mut [TrackSummary]) {
    tracks.sort_by(|a, b| {
        b.latest_submitted_on
            .cmp(&a.latest_submitted_on)
            .then_with(|| a.song_title.cmp(&b.song_title))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Campaign, SubmissionFields, VendorFormat};
    use chrono::Utc;

    fn record(title: &str, action: &str, outlet_type: Option<&str>, day: u32) -> SubmissionRecord {
        SubmissionRecord {
            id: format!("{}-{}-{}", title, action, day),
            idempotency_key: "k".into(),
            row_ordinal: day as u64,
            source_filename: "f.csv".into(),
            vendor: if outlet_type.is_some() {
                VendorFormat::SubmitHub
            } else {
                VendorFormat::Groover
            },
            artist_id: Some("a1".into()),
            song_id: None,
            catalog_key: None,
            unmatched_reason: None,
            raw_json: "{}".into(),
            fields: SubmissionFields {
                song_title: Some(title.into()),
                action: Some(action.into()),
                outlet_type: outlet_type.map(str::to_string),
                submitted_on: NaiveDate::from_ymd_opt(2024, 3, day),
                ..Default::default()
            },
            campaign: Campaign::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn classify_actions() {
        assert!(Outcome::classify(Some("listen"), None).listened);
        assert!(Outcome::classify(Some("Accepted"), None).approved);
        assert!(Outcome::classify(Some("rejected"), None).declined);
        assert!(Outcome::classify(Some("shared"), None).shared);
        assert!(Outcome::classify(Some("added to playlist"), None).playlist);
        assert!(Outcome::classify(Some("approved"), Some("playlist")).playlist);
        assert!(!Outcome::classify(Some("approved"), Some("blog")).playlist);
        assert_eq!(Outcome::classify(None, None), Outcome::default());
    }

    #[test]
    fn stats_and_tracks() {
        let records = vec![
            record("Radiance", "approved", Some("playlist"), 1),
            record("Radiance", "declined", Some("blog"), 2),
            record("Afterglow", "listen", None, 5),
        ];

        let stats = compute_stats(&records);
        assert_eq!(stats.total_submissions, 3);
        assert_eq!(stats.by_vendor["submithub"], 2);
        assert_eq!(stats.by_vendor["groover"], 1);
        assert_eq!(stats.by_action["declined"], 1);
        assert_eq!(stats.by_outlet_type["playlist"], 1);
        assert_eq!(stats.total_listens, 1);
        assert_eq!(stats.total_approvals, 1);
        assert_eq!(stats.total_playlists, 1);

        let tracks = summarize_tracks(&records);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].song_title, "Afterglow");
        assert_eq!(tracks[1].song_title, "Radiance");
        assert_eq!(tracks[1].total_submissions, 2);
        assert_eq!(tracks[1].total_approved, 1);
        assert_eq!(tracks[1].total_declined, 1);
        assert_eq!(tracks[1].vendors, vec!["submithub"]);
        assert_eq!(tracks[1].latest_submitted_on, NaiveDate::from_ymd_opt(2024, 3, 2));
    }
}
