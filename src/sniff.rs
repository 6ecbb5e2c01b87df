//! Schema sniffing for vendor CSV exports.
//!
//! [`sniff`] decodes raw upload bytes, picks a delimiter, reads every record,
//! and classifies each header into a [`ColumnRole`]. It never touches
//! storage and never fails on malformed rows: problems become
//! [`PreviewWarning`]s and parsing continues. Only input that is empty or not
//! text at all is rejected.
//!
//! The same bytes always produce the same [`ParsedFile`], so a preview can be
//! requested as often as the operator likes before committing.

use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

use crate::error::FileError;
use crate::models::{ColumnProfile, ColumnRole, Confidence, RawRow, VendorFormat};

/// Delimiters tried during auto-detection, in tie-break order.
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Row-level warnings kept before the rest are summarized.
const MAX_ROW_WARNINGS: usize = 25;

/// Header aliases, compared after trimming and lower-casing.
const ROLE_ALIASES: &[(ColumnRole, &[&str])] = &[
    (
        ColumnRole::SongTitle,
        &["song", "song title", "song name", "track", "track name", "title"],
    ),
    (
        ColumnRole::Artist,
        &["artist", "artist name", "band", "band name"],
    ),
    (
        ColumnRole::Outlet,
        &[
            "outlet",
            "outlet name",
            "curator",
            "blog",
            "influencer",
            "influencer name",
            "contact",
        ],
    ),
    (
        ColumnRole::OutletType,
        &["outlet type", "type", "category", "influencer type", "contact type"],
    ),
    (
        ColumnRole::Action,
        &["action", "status", "result", "response", "decision", "decisions"],
    ),
    (
        ColumnRole::Date,
        &[
            "sent",
            "submitted",
            "submission date",
            "date sent",
            "sent date",
            "campaign date",
            "date",
        ],
    ),
    (
        ColumnRole::ResponseDate,
        &[
            "received",
            "response date",
            "date received",
            "replied",
            "answer date",
            "date answered",
            "action timestamp",
        ],
    ),
    (
        ColumnRole::Feedback,
        &["feedback", "comment", "comments", "review", "message"],
    ),
    (ColumnRole::AdditionalNotes, &["additional notes", "notes"]),
    (
        ColumnRole::CampaignUrl,
        &["campaign url", "url", "link", "track link", "track url"],
    ),
    (
        ColumnRole::ListenTime,
        &["listen time", "listened for", "duration", "listen time (seconds)"],
    ),
    (
        ColumnRole::SharingLink,
        &["sharing link", "share link", "playlist link", "post link"],
    ),
];

/// Advisory problems found while sniffing. Rendered as plain strings in
/// previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewWarning {
    Latin1Fallback,
    EmptyHeader { index: usize, assigned: String },
    DuplicateHeader { name: String },
    InconsistentColumnCount { line: u64, expected: usize, found: usize },
    MalformedRecord { line: u64, message: String },
    RowWarningsOmitted { count: usize },
    MissingColumn { role: ColumnRole },
    NoDataRows,
    NoFilenameHint,
}

impl fmt::Display for PreviewWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewWarning::Latin1Fallback => {
                write!(f, "file is not valid UTF-8; decoded as Latin-1")
            }
            PreviewWarning::EmptyHeader { index, assigned } => write!(
                f,
                "header cell {} is empty; using '{}'",
                index + 1,
                assigned
            ),
            PreviewWarning::DuplicateHeader { name } => write!(
                f,
                "duplicate column '{}'; only the first one is used",
                name
            ),
            PreviewWarning::InconsistentColumnCount {
                line,
                expected,
                found,
            } => write!(
                f,
                "inconsistent column count on line {}: expected {}, found {}",
                line, expected, found
            ),
            PreviewWarning::MalformedRecord { line, message } => {
                write!(f, "malformed record on line {}: {}", line, message)
            }
            PreviewWarning::RowWarningsOmitted { count } => {
                write!(f, "{} more row warnings not shown", count)
            }
            PreviewWarning::MissingColumn { role } => {
                write!(f, "no column detected for required field '{}'", role)
            }
            PreviewWarning::NoDataRows => write!(f, "file has a header but no data rows"),
            PreviewWarning::NoFilenameHint => write!(
                f,
                "could not extract artist and song from filename (expected 'Artist Name - Song Title.csv')"
            ),
        }
    }
}

impl Serialize for PreviewWarning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A fully read delimited file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub delimiter: u8,
    pub headers: Vec<String>,
    pub columns: Vec<ColumnProfile>,
    pub rows: Vec<RawRow>,
    pub warnings: Vec<PreviewWarning>,
    pub vendor: VendorFormat,
}

/// Structural preview shown to the operator before committing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePreview {
    pub total_rows: usize,
    pub columns_detected: Vec<String>,
    pub columns: Vec<ColumnProfile>,
    pub sample_rows: Vec<RawRow>,
    pub warnings: Vec<PreviewWarning>,
    pub delimiter: String,
    pub vendor: VendorFormat,
}

impl ParsedFile {
    /// Header of the column carrying `role`: the first exact alias match,
    /// else the first inferred one.
    pub fn column(&self, role: ColumnRole) -> Option<&ColumnProfile> {
        self.columns
            .iter()
            .find(|c| c.role == role && c.confidence == Confidence::Exact)
            .or_else(|| self.columns.iter().find(|c| c.role == role))
    }

    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.column(role).is_some()
    }

    /// Trimmed, non-empty value of `role` in `row`.
    pub fn value<'a>(&self, row: &'a RawRow, role: ColumnRole) -> Option<&'a str> {
        let col = self.column(role)?;
        row.fields
            .get(col.index)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn preview(&self, sample_rows: usize) -> FilePreview {
        FilePreview {
            total_rows: self.rows.len(),
            columns_detected: self.headers.clone(),
            columns: self.columns.clone(),
            sample_rows: self.rows.iter().take(sample_rows).cloned().collect(),
            warnings: self.warnings.clone(),
            delimiter: delimiter_name(self.delimiter),
            vendor: self.vendor,
        }
    }
}

fn delimiter_name(d: u8) -> String {
    match d {
        b'\t' => "tab".to_string(),
        other => (other as char).to_string(),
    }
}

/// Decode, split, and profile `bytes`.
///
/// `delimiter` overrides auto-detection when given.
pub fn sniff(bytes: &[u8], delimiter: Option<u8>) -> Result<ParsedFile, FileError> {
    let (text, latin1) = decode(bytes)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&text));

    let mut warnings = Vec::new();
    if latin1 {
        warnings.push(PreviewWarning::Latin1Fallback);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut row_warnings = 0usize;
    let mut omitted = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                push_row_warning(
                    &mut warnings,
                    &mut row_warnings,
                    &mut omitted,
                    PreviewWarning::MalformedRecord {
                        line,
                        message: err.to_string(),
                    },
                );
                continue;
            }
        };

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let Some(header) = headers.as_ref() else {
            headers = Some(read_headers(&record, &mut warnings));
            continue;
        };

        if record.len() != header.len() {
            push_row_warning(
                &mut warnings,
                &mut row_warnings,
                &mut omitted,
                PreviewWarning::InconsistentColumnCount {
                    line,
                    expected: header.len(),
                    found: record.len(),
                },
            );
        }

        let fields = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(RawRow { line, fields });
    }

    if omitted > 0 {
        warnings.push(PreviewWarning::RowWarningsOmitted { count: omitted });
    }

    let headers = headers.ok_or(FileError::EmptyInput)?;
    let columns = profile_columns(&headers);
    let vendor = detect_vendor(&headers);

    for role in [ColumnRole::Outlet, ColumnRole::Action, ColumnRole::Date] {
        if !columns.iter().any(|c| c.role == role) {
            warnings.push(PreviewWarning::MissingColumn { role });
        }
    }
    if rows.is_empty() {
        warnings.push(PreviewWarning::NoDataRows);
    }

    tracing::debug!(
        rows = rows.len(),
        columns = headers.len(),
        delimiter = %delimiter_name(delimiter),
        vendor = vendor.as_str(),
        "Sniffed delimited file"
    );

    Ok(ParsedFile {
        delimiter,
        headers,
        columns,
        rows,
        warnings,
        vendor,
    })
}

fn push_row_warning(
    warnings: &mut Vec<PreviewWarning>,
    kept: &mut usize,
    omitted: &mut usize,
    warning: PreviewWarning,
) {
    if *kept < MAX_ROW_WARNINGS {
        warnings.push(warning);
        *kept += 1;
    } else {
        *omitted += 1;
    }
}

fn read_headers(record: &csv::StringRecord, warnings: &mut Vec<PreviewWarning>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(record.len());
    for (index, cell) in record.iter().enumerate() {
        let mut name = cell.trim().to_string();
        if name.is_empty() {
            name = format!("column_{}", index + 1);
            warnings.push(PreviewWarning::EmptyHeader {
                index,
                assigned: name.clone(),
            });
        }
        if !seen.insert(name.to_lowercase()) {
            warnings.push(PreviewWarning::DuplicateHeader { name: name.clone() });
        }
        headers.push(name);
    }
    headers
}

/// UTF-8 (BOM stripped), else Latin-1 for text without NUL bytes.
fn decode(bytes: &[u8]) -> Result<(String, bool), FileError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(FileError::EmptyInput);
    }

    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    if let Some(offset) = body.iter().position(|b| *b == 0) {
        return Err(FileError::Decode(format!(
            "binary content (NUL byte at offset {})",
            offset
        )));
    }

    let (text, latin1) = match std::str::from_utf8(body) {
        Ok(s) => (s.to_string(), false),
        Err(_) => (body.iter().map(|&b| b as char).collect::<String>(), true),
    };

    if text.trim().is_empty() {
        return Err(FileError::EmptyInput);
    }
    Ok((text, latin1))
}

/// Most frequent candidate outside quotes on the first non-blank line.
fn detect_delimiter(text: &str) -> u8 {
    let header_line = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default();

    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in header_line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|d| *d == b) {
            counts[i] += 1;
        }
    }

    let mut best = 0;
    for i in 1..counts.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

fn profile_columns(headers: &[String]) -> Vec<ColumnProfile> {
    headers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let (role, confidence) = classify_header(name);
            ColumnProfile {
                name: name.clone(),
                index,
                role,
                confidence,
            }
        })
        .collect()
}

/// Role of a header: alias table first, then keyword inference.
pub fn classify_header(header: &str) -> (ColumnRole, Confidence) {
    let h = header.trim().to_lowercase();

    for (role, aliases) in ROLE_ALIASES {
        if aliases.contains(&h.as_str()) {
            return (*role, Confidence::Exact);
        }
    }

    let has = |needles: &[&str]| needles.iter().any(|n| h.contains(n));
    let role = if has(&["shar"]) && has(&["link", "url"]) {
        ColumnRole::SharingLink
    } else if has(&["url", "link"]) {
        ColumnRole::CampaignUrl
    } else if has(&["listen"]) {
        ColumnRole::ListenTime
    } else if has(&["type", "category"]) {
        ColumnRole::OutletType
    } else if has(&["artist", "band"]) {
        ColumnRole::Artist
    } else if has(&["song", "track", "title"]) {
        ColumnRole::SongTitle
    } else if has(&["outlet", "curator", "influencer", "blog", "playlist"]) {
        ColumnRole::Outlet
    } else if has(&["action", "decision", "status", "result"]) {
        ColumnRole::Action
    } else if has(&["feedback", "comment", "review"]) {
        ColumnRole::Feedback
    } else if has(&["note"]) {
        ColumnRole::AdditionalNotes
    } else if has(&["received", "answer", "repl", "response"]) {
        ColumnRole::ResponseDate
    } else if has(&["sent", "submi", "date"]) {
        ColumnRole::Date
    } else {
        return (ColumnRole::FreeText, Confidence::Inferred);
    };
    (role, Confidence::Inferred)
}

fn detect_vendor(headers: &[String]) -> VendorFormat {
    let lower: HashSet<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let any = |names: &[&str]| names.iter().any(|n| lower.contains(*n));

    if any(&["influencer", "decisions", "band", "answer date", "sharing link"]) {
        VendorFormat::Groover
    } else if any(&["campaign url", "outlet", "outlet type", "listen time"]) {
        VendorFormat::SubmitHub
    } else {
        VendorFormat::Generic
    }
}
