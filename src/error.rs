//! File-level error taxonomy.
//!
//! Row-level problems never show up here: they are recorded as
//! [`MatchResult::Invalid`](crate::models::MatchResult::Invalid) and
//! aggregated into the [`ImportSummary`](crate::models::ImportSummary).
//! A [`FileError`] ends processing of one file; in batch mode it is
//! attached to that file's outcome and never reaches sibling files.

use serde::Serialize;
use thiserror::Error;

use crate::models::ImportSummary;

/// Terminal errors for a single file's pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileError {
    #[error("file could not be read: {0}")]
    Read(String),

    #[error("invalid campaign: {0}")]
    InvalidCampaign(String),

    #[error("file is empty")]
    EmptyInput,

    #[error("file could not be decoded as text: {0}")]
    Decode(String),

    #[error("file has a header but no data rows")]
    ZeroDataRows,

    #[error("artist not found in catalog: {0}")]
    UnknownArtist(String),

    #[error("import cancelled before the file finished")]
    Cancelled,

    #[error("catalog lookup failed: {0}")]
    CatalogFault(String),

    #[error("submission store failed: {0}")]
    StoreFault(String),
}

impl FileError {
    /// Stable machine-readable code, used in JSON output and HTTP errors.
    pub fn code(&self) -> &'static str {
        match self {
            FileError::Read(_) => "read_error",
            FileError::InvalidCampaign(_) => "invalid_campaign",
            FileError::EmptyInput => "empty_input",
            FileError::Decode(_) => "decode_error",
            FileError::ZeroDataRows => "zero_data_rows",
            FileError::UnknownArtist(_) => "unknown_artist",
            FileError::Cancelled => "cancelled",
            FileError::CatalogFault(_) => "catalog_fault",
            FileError::StoreFault(_) => "store_fault",
        }
    }
}

impl Serialize for FileError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("FileError", 2)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

/// A commit that ended with a terminal error.
///
/// When the failure happened after rows were already written, `partial`
/// carries the summary of what actually exists in the store.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{error}")]
pub struct ImportFailure {
    pub error: FileError,
    pub partial: Option<ImportSummary>,
}

impl ImportFailure {
    pub fn new(error: FileError) -> Self {
        Self {
            error,
            partial: None,
        }
    }

    pub fn with_partial(error: FileError, partial: ImportSummary) -> Self {
        Self {
            error,
            partial: Some(partial),
        }
    }
}

impl From<FileError> for ImportFailure {
    fn from(error: FileError) -> Self {
        Self::new(error)
    }
}
