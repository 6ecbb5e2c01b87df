//! Row-by-row validation and matching over a whole file.
//!
//! For every [`RawRow`] of a [`ParsedFile`], [`reconcile`] extracts the
//! submission fields (normalizing vendor spellings on the way), validates
//! the required ones, and asks the [`Matcher`] for a catalog song. Each row
//! ends in exactly one of three partitions, all kept in file order:
//!
//! - `valid_matched`: valid, linked to one catalog song
//! - `valid_unmatched`: valid, no unique song (kept for manual linking)
//! - `invalid`: a required field is missing or unparseable; never looked up
//!
//! A bad row never fails the file. Only the conditions in [`FileError`]
//! do: no data rows, an explicit artist id the catalog does not know, a
//! catalog fault, or cancellation.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::error::FileError;
use crate::matcher::Matcher;
use crate::models::{
    ColumnRole, EntityHint, MatchResult, RawRow, SubmissionFields, VendorFormat,
};
use crate::sniff::ParsedFile;

/// Date layouts seen in vendor exports, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// SubmitHub campaign links: `.../by/<artist-slug>/<song-slug>`.
static CAMPAIGN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/by/([^/?#]+)/([^/?#]+)").expect("valid regex"));

/// One row after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledRow {
    /// 1-based source line; doubles as the row ordinal for idempotency.
    pub line: u64,
    pub raw_json: String,
    pub fields: SubmissionFields,
    pub result: MatchResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub vendor: VendorFormat,
    pub valid_matched: Vec<ReconciledRow>,
    pub valid_unmatched: Vec<ReconciledRow>,
    pub invalid: Vec<ReconciledRow>,
}

impl Reconciliation {
    pub fn total_rows(&self) -> usize {
        self.valid_matched.len() + self.valid_unmatched.len() + self.invalid.len()
    }

    /// Valid rows merged back into file order.
    pub fn valid_rows(&self) -> Vec<&ReconciledRow> {
        let mut rows: Vec<&ReconciledRow> = self
            .valid_matched
            .iter()
            .chain(self.valid_unmatched.iter())
            .collect();
        rows.sort_by_key(|r| r.line);
        rows
    }
}

/// Reconcile every row of `parsed`.
///
/// `cancel` is checked before each row's catalog lookup; once it fires the
/// file ends with [`FileError::Cancelled`].
pub async fn reconcile(
    parsed: &ParsedFile,
    hint: &EntityHint,
    explicit_artist_id: Option<&str>,
    catalog: &dyn Catalog,
    cancel: &CancellationToken,
) -> Result<Reconciliation, FileError> {
    if parsed.rows.is_empty() {
        return Err(FileError::ZeroDataRows);
    }

    if let Some(id) = explicit_artist_id {
        let artist = catalog
            .get_artist(id)
            .await
            .map_err(|e| FileError::CatalogFault(e.to_string()))?;
        if artist.is_none() {
            return Err(FileError::UnknownArtist(id.to_string()));
        }
    }

    let mut matcher = Matcher::new(catalog, explicit_artist_id.map(str::to_string));
    let mut out = Reconciliation {
        vendor: parsed.vendor,
        valid_matched: Vec::new(),
        valid_unmatched: Vec::new(),
        invalid: Vec::new(),
    };

    for row in &parsed.rows {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }

        let fields = extract_fields(parsed, row, hint);
        let raw_json = row.to_json();

        if let Err((field, message)) = validate(parsed, row, &fields) {
            tracing::debug!(line = row.line, field = %field, %message, "Row invalid");
            out.invalid.push(ReconciledRow {
                line: row.line,
                raw_json,
                fields,
                result: MatchResult::Invalid { field, message },
            });
            continue;
        }

        // Valid rows always carry a title.
        let title = fields.song_title.as_deref().unwrap_or_default();
        let result = matcher
            .match_row(fields.artist_name.as_deref(), title)
            .await
            .map_err(|e| FileError::CatalogFault(e.to_string()))?;

        let reconciled = ReconciledRow {
            line: row.line,
            raw_json,
            fields,
            result,
        };
        if reconciled.result.is_matched() {
            out.valid_matched.push(reconciled);
        } else {
            out.valid_unmatched.push(reconciled);
        }
    }

    Ok(out)
}

/// Row fields with title and artist resolved. Each comes from the first
/// source that has one: the row's cell, then the SubmitHub campaign-URL
/// slug, then the filename hint. The hint only fills gaps; it never
/// overrides what the row says.
fn extract_fields(parsed: &ParsedFile, row: &RawRow, hint: &EntityHint) -> SubmissionFields {
    let value = |role| parsed.value(row, role).map(str::to_string);

    let mut title_cell = value(ColumnRole::SongTitle);
    let mut artist_cell = value(ColumnRole::Artist);

    // Groover exports without a band column put "Artist - Title" in the track cell.
    if parsed.vendor == VendorFormat::Groover && !parsed.has_role(ColumnRole::Artist) {
        if let Some((artist, title)) = title_cell.as_deref().and_then(split_artist_title) {
            artist_cell = Some(artist);
            title_cell = Some(title);
        }
    }

    let campaign_url = value(ColumnRole::CampaignUrl);
    let url_slug = campaign_url.as_deref().and_then(parse_campaign_url);

    let (url_artist, url_title) = url_slug.unzip();
    let song_title = title_cell
        .or(url_title)
        .or_else(|| hint.song_title.clone());
    let artist_name = artist_cell
        .or(url_artist)
        .or_else(|| hint.artist_name.clone());

    let outlet_type = value(ColumnRole::OutletType).map(|t| match parsed.vendor {
        VendorFormat::Groover => normalize_outlet_type(&t),
        _ => t,
    });

    SubmissionFields {
        song_title,
        artist_name,
        outlet_name: value(ColumnRole::Outlet),
        outlet_type,
        action: value(ColumnRole::Action).map(|a| normalize_action(&a)),
        feedback: merge_feedback(value(ColumnRole::Feedback), value(ColumnRole::AdditionalNotes)),
        campaign_url,
        listen_time_secs: value(ColumnRole::ListenTime).and_then(|t| parse_listen_time(&t)),
        sharing_link: value(ColumnRole::SharingLink),
        submitted_on: value(ColumnRole::Date).and_then(|d| parse_date(&d)),
        responded_on: value(ColumnRole::ResponseDate).and_then(|d| parse_date(&d)),
    }
}

/// First missing or unparseable required field, in a fixed order.
fn validate(
    parsed: &ParsedFile,
    row: &RawRow,
    fields: &SubmissionFields,
) -> Result<(), (ColumnRole, String)> {
    if fields.song_title.is_none() {
        return Err((ColumnRole::SongTitle, "missing song title".to_string()));
    }
    if fields.outlet_name.is_none() {
        return Err((ColumnRole::Outlet, "missing outlet name".to_string()));
    }
    if fields.action.is_none() {
        return Err((ColumnRole::Action, "missing action".to_string()));
    }
    if fields.submitted_on.is_none() {
        let message = match parsed.value(row, ColumnRole::Date) {
            Some(raw) => format!("unrecognized date '{}'", raw),
            None => "missing date".to_string(),
        };
        return Err((ColumnRole::Date, message));
    }
    Ok(())
}

/// Parse a vendor date in any supported layout.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Canonical action names; anything else is lower-cased as is.
pub fn normalize_action(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let mapped = match lower.as_str() {
        "listened" | "listen" => "listen",
        "declined" | "decline" | "rejected" => "declined",
        "approved" | "approve" | "accepted" => "approved",
        "shared" | "share" | "posted" => "shared",
        other => other,
    };
    mapped.to_string()
}

/// Groover influencer types folded onto a small vocabulary.
pub fn normalize_outlet_type(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    if lower.contains("playlist") {
        "playlist".to_string()
    } else if lower.contains("feedback") || lower.contains("only") {
        "feedback-only".to_string()
    } else if lower.contains("social") || lower.contains("media") || lower.contains("sharing") {
        "social-media-sharing".to_string()
    } else if lower.contains("radio") {
        "radio".to_string()
    } else if lower.contains("blog") {
        "blog".to_string()
    } else {
        lower.replace(' ', "-")
    }
}

/// Seconds from `180`, `3:00` or `1:30:00`.
pub fn parse_listen_time(input: &str) -> Option<u32> {
    let s = input.trim();
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok();
    }
    let parts: Vec<u32> = s
        .split(':')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [m, sec] => m.checked_mul(60)?.checked_add(*sec),
        [h, m, sec] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*sec),
        _ => None,
    }
}

/// `(artist, title)` from a SubmitHub campaign URL, slugs title-cased.
pub fn parse_campaign_url(url: &str) -> Option<(String, String)> {
    let caps = CAMPAIGN_URL.captures(url)?;
    let artist = unslug(caps.get(1)?.as_str());
    let title = unslug(caps.get(2)?.as_str());
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist, title))
}

fn unslug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn split_artist_title(cell: &str) -> Option<(String, String)> {
    let (artist, title) = cell.split_once(" - ")?;
    let (artist, title) = (artist.trim(), title.trim());
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist.to_string(), title.to_string()))
}

fn merge_feedback(feedback: Option<String>, notes: Option<String>) -> Option<String> {
    match (feedback, notes) {
        (Some(f), Some(n)) => Some(format!("{}\n\nAdditional notes: {}", f, n)),
        (Some(f), None) => Some(f),
        (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::models::{CatalogArtist, CatalogSong, UnmatchedReason};
    use crate::sniff::sniff;

    fn catalog() -> InMemoryCatalog {
        let c = InMemoryCatalog::new();
        c.add_artist(CatalogArtist {
            artist_id: "a1".into(),
            name: "Jonathan Fitas".into(),
        });
        c.add_song(CatalogSong {
            song_id: "s1".into(),
            artist_id: "a1".into(),
            canonical_title: "Radiance".into(),
            isrc: None,
            upc: None,
        });
        c
    }

    #[test]
    fn dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date("2024-03-01"), Some(d));
        assert_eq!(parse_date("03/01/2024"), Some(d));
        assert_eq!(parse_date("Mar 1, 2024"), Some(d));
        assert_eq!(parse_date("1 March 2024"), Some(d));
        assert_eq!(parse_date("01.03.2024"), Some(d));
        assert_eq!(parse_date("2024-03-01 14:22:05"), Some(d));
        assert_eq!(parse_date("2024-03-01T14:22:05+02:00"), Some(d));
        // Day first only when month-first is impossible.
        assert_eq!(
            parse_date("27/01/2026"),
            NaiveDate::from_ymd_opt(2026, 1, 27)
        );
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn actions() {
        assert_eq!(normalize_action("Listened"), "listen");
        assert_eq!(normalize_action(" REJECTED "), "declined");
        assert_eq!(normalize_action("Accepted"), "approved");
        assert_eq!(normalize_action("posted"), "shared");
        assert_eq!(normalize_action("Pending"), "pending");
    }

    #[test]
    fn outlet_types() {
        assert_eq!(normalize_outlet_type("Spotify Playlist"), "playlist");
        assert_eq!(normalize_outlet_type("Feedback only"), "feedback-only");
        assert_eq!(normalize_outlet_type("Social Media"), "social-media-sharing");
        assert_eq!(normalize_outlet_type("Web Radio"), "radio");
        assert_eq!(normalize_outlet_type("Music Label"), "music-label");
    }

    #[test]
    fn listen_times() {
        assert_eq!(parse_listen_time("180"), Some(180));
        assert_eq!(parse_listen_time("3:00"), Some(180));
        assert_eq!(parse_listen_time("1:30:00"), Some(5400));
        assert_eq!(parse_listen_time("abc"), None);
        assert_eq!(parse_listen_time(""), None);
    }

    #[test]
    fn campaign_urls() {
        assert_eq!(
            parse_campaign_url("https://www.submithub.com/by/jonathan-fitas/radiance?ref=x"),
            Some(("Jonathan Fitas".into(), "Radiance".into()))
        );
        assert_eq!(
            parse_campaign_url("https://www.submithub.com/by/some_band/golden-hour"),
            Some(("Some Band".into(), "Golden Hour".into()))
        );
        assert_eq!(parse_campaign_url("https://example.com/track/1"), None);
    }

    #[test]
    fn feedback_merges_notes() {
        assert_eq!(
            merge_feedback(Some("Nice".into()), Some("Repost".into())).as_deref(),
            Some("Nice\n\nAdditional notes: Repost")
        );
        assert_eq!(merge_feedback(None, Some("Repost".into())).as_deref(), Some("Repost"));
    }

    #[tokio::test]
    async fn partitions_rows_in_file_order() {
        let csv = "Song,Outlet,Action,Sent\n\
                   Radiance,Blog A,Approved,2024-03-01\n\
                   ,Blog B,Approved,2024-03-01\n\
                   Unknown Tune,Blog C,Declined,2024-03-02\n\
                   Radiance,Blog D,Listened,someday\n";
        let parsed = sniff(csv.as_bytes(), None).unwrap();
        let c = catalog();
        let out = reconcile(&parsed, &EntityHint::default(), None, &c, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.total_rows(), 4);
        assert_eq!(out.valid_matched.len(), 1);
        assert_eq!(out.valid_matched[0].line, 2);
        assert_eq!(out.valid_unmatched.len(), 1);
        assert_eq!(
            out.valid_unmatched[0].result,
            MatchResult::Unmatched {
                reason: UnmatchedReason::NotFound
            }
        );
        assert_eq!(out.invalid.len(), 2);
        assert_eq!(out.invalid[0].line, 3);
        assert_eq!(
            out.invalid[1].result,
            MatchResult::Invalid {
                field: ColumnRole::Date,
                message: "unrecognized date 'someday'".into()
            }
        );
    }

    #[tokio::test]
    async fn filename_hint_supplies_title() {
        let csv = "Outlet,Action,Sent\nBlog A,Approved,2024-03-01\n";
        let parsed = sniff(csv.as_bytes(), None).unwrap();
        let hint = EntityHint {
            artist_name: Some("Jonathan Fitas".into()),
            song_title: Some("Radiance".into()),
        };
        let c = catalog();
        let out = reconcile(&parsed, &hint, None, &c, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.valid_matched.len(), 1);
    }

    #[tokio::test]
    async fn row_title_is_not_replaced_by_filename_hint() {
        let csv = "Song,Outlet,Action,Sent\nAfterglow,Blog A,Approved,2024-03-01\n";
        let parsed = sniff(csv.as_bytes(), None).unwrap();
        let hint = EntityHint {
            artist_name: Some("Jonathan Fitas".into()),
            song_title: Some("Radiance".into()),
        };
        let c = catalog();
        let out = reconcile(&parsed, &hint, None, &c, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out.valid_matched.is_empty());
        let row = &out.valid_unmatched[0];
        assert_eq!(row.fields.song_title.as_deref(), Some("Afterglow"));
        assert_eq!(
            row.result,
            MatchResult::Unmatched {
                reason: UnmatchedReason::NotFound
            }
        );
    }

    #[tokio::test]
    async fn campaign_url_artist_beats_filename_hint() {
        let csv = "Song,Campaign url,Outlet,Action,Sent\n\
                   Radiance,https://www.submithub.com/by/jonathan-fitas/radiance,Blog A,Approved,2024-03-01\n\
                   ,https://www.submithub.com/by/jonathan-fitas/radiance,Blog B,Approved,2024-03-01\n";
        let parsed = sniff(csv.as_bytes(), None).unwrap();
        let c = catalog();
        c.add_artist(CatalogArtist {
            artist_id: "a2".into(),
            name: "Nova Lux".into(),
        });
        c.add_song(CatalogSong {
            song_id: "s9".into(),
            artist_id: "a2".into(),
            canonical_title: "Echo".into(),
            isrc: None,
            upc: None,
        });
        let hint = EntityHint {
            artist_name: Some("Nova Lux".into()),
            song_title: Some("Echo".into()),
        };
        let out = reconcile(&parsed, &hint, None, &c, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.valid_matched.len(), 2);
        for row in &out.valid_matched {
            assert_eq!(row.fields.artist_name.as_deref(), Some("Jonathan Fitas"));
            assert_eq!(row.fields.song_title.as_deref(), Some("Radiance"));
            assert!(matches!(&row.result, MatchResult::Matched { song_id, .. } if song_id == "s1"));
        }
    }

    #[tokio::test]
    async fn groover_track_cell_split() {
        let csv = "Track,Influencer,Type,Decisions,Sent\n\
                   Jonathan Fitas - Radiance,Curator X,Spotify Playlist,Accepted,2024-03-01\n";
        let parsed = sniff(csv.as_bytes(), None).unwrap();
        assert_eq!(parsed.vendor, VendorFormat::Groover);
        let c = catalog();
        let out = reconcile(&parsed, &EntityHint::default(), None, &c, &CancellationToken::new())
            .await
            .unwrap();
        let row = &out.valid_matched[0];
        assert_eq!(row.fields.artist_name.as_deref(), Some("Jonathan Fitas"));
        assert_eq!(row.fields.outlet_type.as_deref(), Some("playlist"));
        assert_eq!(row.fields.action.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn file_level_failures() {
        let c = catalog();
        let token = CancellationToken::new();

        let parsed = sniff(b"Song,Outlet,Action,Sent\n", None).unwrap();
        assert_eq!(
            reconcile(&parsed, &EntityHint::default(), None, &c, &token).await,
            Err(FileError::ZeroDataRows)
        );

        let parsed = sniff(b"Song,Outlet,Action,Sent\nA,B,C,2024-01-01\n", None).unwrap();
        assert_eq!(
            reconcile(&parsed, &EntityHint::default(), Some("nope"), &c, &token).await,
            Err(FileError::UnknownArtist("nope".into()))
        );

        token.cancel();
        assert_eq!(
            reconcile(&parsed, &EntityHint::default(), None, &c, &token).await,
            Err(FileError::Cancelled)
        );
    }
}
