//! Core data models used throughout the import pipeline.
//!
//! These types represent the rows, hints, match outcomes, and summaries that
//! flow from the schema sniffer through reconciliation to the commit engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One data row of a delimited file, keyed by header name in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based physical line number in the source file.
    pub line: u64,
    pub fields: Vec<(String, String)>,
}

impl RawRow {
    /// Snapshot of the row as a JSON object, preserving column order.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&RowFields(&self.fields)).unwrap_or_else(|_| "{}".to_string())
    }
}

struct RowFields<'a>(&'a [(String, String)]);

impl Serialize for RowFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("RawRow", 2)?;
        s.serialize_field("line", &self.line)?;
        s.serialize_field("fields", &RowFields(&self.fields))?;
        s.end()
    }
}

/// What a column carries, as inferred from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    SongTitle,
    Artist,
    Outlet,
    OutletType,
    Action,
    Date,
    ResponseDate,
    Feedback,
    AdditionalNotes,
    CampaignUrl,
    ListenTime,
    SharingLink,
    FreeText,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::SongTitle => "song_title",
            ColumnRole::Artist => "artist",
            ColumnRole::Outlet => "outlet",
            ColumnRole::OutletType => "outlet_type",
            ColumnRole::Action => "action",
            ColumnRole::Date => "date",
            ColumnRole::ResponseDate => "response_date",
            ColumnRole::Feedback => "feedback",
            ColumnRole::AdditionalNotes => "additional_notes",
            ColumnRole::CampaignUrl => "campaign_url",
            ColumnRole::ListenTime => "listen_time",
            ColumnRole::SharingLink => "sharing_link",
            ColumnRole::FreeText => "free_text",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Exact` when the header matched a known alias, `Inferred` when only a
/// keyword inside the header did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exact,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub index: usize,
    pub role: ColumnRole,
    pub confidence: Confidence,
}

/// Vendor the export appears to come from, judged by its header set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorFormat {
    SubmitHub,
    Groover,
    Generic,
}

impl VendorFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorFormat::SubmitHub => "submithub",
            VendorFormat::Groover => "groover",
            VendorFormat::Generic => "generic",
        }
    }
}

impl FromStr for VendorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submithub" => Ok(VendorFormat::SubmitHub),
            "groover" => Ok(VendorFormat::Groover),
            "generic" => Ok(VendorFormat::Generic),
            other => Err(format!("unknown vendor format: {}", other)),
        }
    }
}

/// Artist / song guess taken from the uploaded file's name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityHint {
    pub artist_name: Option<String>,
    pub song_title: Option<String>,
}

impl EntityHint {
    pub fn is_empty(&self) -> bool {
        self.artist_name.is_none() && self.song_title.is_none()
    }
}

/// Why a valid row was not linked to a catalog song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    /// No catalog song carries the title.
    NotFound,
    /// More than one catalog song carries the title; a human has to pick.
    Ambiguous,
    /// The artist named by the filename or campaign URL is not in the catalog.
    ArtistNotFound,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReason::NotFound => "not_found",
            UnmatchedReason::Ambiguous => "ambiguous",
            UnmatchedReason::ArtistNotFound => "artist_not_found",
        }
    }
}

impl FromStr for UnmatchedReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(UnmatchedReason::NotFound),
            "ambiguous" => Ok(UnmatchedReason::Ambiguous),
            "artist_not_found" => Ok(UnmatchedReason::ArtistNotFound),
            other => Err(format!("unknown unmatched reason: {}", other)),
        }
    }
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for exactly one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        artist_id: String,
        song_id: String,
        catalog_key: String,
    },
    Unmatched {
        reason: UnmatchedReason,
    },
    Invalid {
        field: ColumnRole,
        message: String,
    },
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogArtist {
    pub artist_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSong {
    pub song_id: String,
    pub artist_id: String,
    pub canonical_title: String,
    pub isrc: Option<String>,
    pub upc: Option<String>,
}

impl CatalogSong {
    /// ISRC when known, then UPC, then the catalog's own song id.
    pub fn catalog_key(&self) -> String {
        self.isrc
            .clone()
            .or_else(|| self.upc.clone())
            .unwrap_or_else(|| self.song_id.clone())
    }
}

/// Campaign budget in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Budget(i64);

impl Budget {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl FromStr for Budget {
    type Err = String;

    /// Accepts `150`, `150.5`, `150.50`; rejects negatives and more than two
    /// decimals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid budget: '{}'", s);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Budget)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Budget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Campaign metadata attached to a commit. Both fields are optional and
/// together form the campaign identity used in the idempotency key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub name: Option<String>,
    pub budget: Option<Budget>,
}

impl Campaign {
    /// A blank or whitespace-only name means no name, so every entry point
    /// derives the same idempotency key for the same campaign.
    pub fn new(name: Option<&str>, budget: Option<Budget>) -> Self {
        Self {
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            budget,
        }
    }
}

/// Submission fields parsed out of a row, vendor columns already normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionFields {
    pub song_title: Option<String>,
    pub artist_name: Option<String>,
    pub outlet_name: Option<String>,
    pub outlet_type: Option<String>,
    pub action: Option<String>,
    pub feedback: Option<String>,
    pub campaign_url: Option<String>,
    pub listen_time_secs: Option<u32>,
    pub sharing_link: Option<String>,
    pub submitted_on: Option<NaiveDate>,
    pub responded_on: Option<NaiveDate>,
}

/// A record proposed to the submission store for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub idempotency_key: String,
    pub row_ordinal: u64,
    pub source_filename: String,
    pub vendor: VendorFormat,
    pub raw_json: String,
    pub artist_id: Option<String>,
    pub song_id: Option<String>,
    pub catalog_key: Option<String>,
    pub unmatched_reason: Option<UnmatchedReason>,
    pub fields: SubmissionFields,
    pub campaign: Campaign,
}

/// A committed submission as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub idempotency_key: String,
    pub row_ordinal: u64,
    pub source_filename: String,
    pub vendor: VendorFormat,
    pub artist_id: Option<String>,
    pub song_id: Option<String>,
    pub catalog_key: Option<String>,
    pub unmatched_reason: Option<UnmatchedReason>,
    /// Original row cells as a JSON object, kept for audit.
    pub raw_json: String,
    #[serde(flatten)]
    pub fields: SubmissionFields,
    pub campaign: Campaign,
    pub created_at: DateTime<Utc>,
}

/// A matched catalog song listed in an [`ImportSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongMatch {
    pub catalog_key: String,
    pub song_id: String,
    pub artist_id: String,
    pub song_title: String,
}

/// A raw title that could not be linked, listed in an [`ImportSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedSong {
    pub song_title: String,
    pub artist_hint: Option<String>,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// Every valid row exists in the store.
    Complete,
    /// The commit stopped early; only some valid rows exist.
    Partial,
}

/// Result of one commit invocation, built from what the store reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub file_name: String,
    pub vendor: VendorFormat,
    pub idempotency_key: String,
    pub status: CommitStatus,
    pub total_rows: usize,
    /// Records written by this invocation.
    pub created_count: usize,
    /// Records that already existed from an earlier commit of the same key.
    pub already_committed_count: usize,
    pub invalid_count: usize,
    /// Valid rows the commit did not get to write.
    pub failed_count: usize,
    pub matched_songs: Vec<SongMatch>,
    pub unmatched_songs: Vec<UnmatchedSong>,
    /// Row-level messages, capped for display.
    pub errors: Vec<String>,
    /// Messages left out of `errors` by the display cap.
    pub errors_omitted: usize,
    /// Every row-level message.
    pub audit_errors: Vec<String>,
    pub campaign: Campaign,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_parsing() {
        assert_eq!("150".parse::<Budget>().unwrap().cents(), 15_000);
        assert_eq!("150.5".parse::<Budget>().unwrap().cents(), 15_050);
        assert_eq!("0.07".parse::<Budget>().unwrap().to_string(), "0.07");
        assert!("-3".parse::<Budget>().is_err());
        assert!("1.234".parse::<Budget>().is_err());
        assert!("abc".parse::<Budget>().is_err());
        assert!(".5".parse::<Budget>().is_err());
    }

    #[test]
    fn catalog_key_prefers_isrc() {
        let mut song = CatalogSong {
            song_id: "s1".into(),
            artist_id: "a1".into(),
            canonical_title: "Radiance".into(),
            isrc: Some("USRC17607839".into()),
            upc: Some("0123456789012".into()),
        };
        assert_eq!(song.catalog_key(), "USRC17607839");
        song.isrc = None;
        assert_eq!(song.catalog_key(), "0123456789012");
        song.upc = None;
        assert_eq!(song.catalog_key(), "s1");
    }

    #[test]
    fn raw_row_json_keeps_column_order() {
        let row = RawRow {
            line: 2,
            fields: vec![
                ("Song".into(), "Radiance".into()),
                ("Outlet".into(), "Indie Blog".into()),
                ("Action".into(), "Approved".into()),
            ],
        };
        assert_eq!(
            row.to_json(),
            r#"{"Song":"Radiance","Outlet":"Indie Blog","Action":"Approved"}"#
        );
    }

    #[test]
    fn campaign_blank_name_is_none() {
        assert_eq!(Campaign::new(Some("   "), None), Campaign::default());
        assert_eq!(Campaign::new(Some(""), None).name, None);
        assert_eq!(
            Campaign::new(Some(" Spring push "), None).name.as_deref(),
            Some("Spring push")
        );
    }

    #[test]
    fn match_result_serializes_tagged() {
        let json = serde_json::to_value(MatchResult::Unmatched {
            reason: UnmatchedReason::Ambiguous,
        })
        .unwrap();
        assert_eq!(json["status"], "unmatched");
        assert_eq!(json["reason"], "ambiguous");
    }
}
