//! Domain error taxonomy.
//!
//! Each pipeline stage has its own error enum so callers can tell a client
//! mistake (bad filter operator, stale cursor) from an engine failure, and
//! map each to the right response without string matching.

use thiserror::Error;

/// Errors raised while resolving or running a harvest.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid harvest window: start {start} must be strictly before end {end}")]
    DateRange { start: String, end: String },

    #[error("datestamp {datestamp} outside harvested range {start}..{end} by more than a day")]
    DatestampOutOfRange {
        datestamp: String,
        start: String,
        end: String,
    },

    #[error("harvest fetch failed: {0}")]
    Fetch(#[from] anyhow::Error),
}

/// Errors raised by transform chain links.
///
/// The `MissingKey`, `IndexOutOfRange`, and `TypeMismatch` variants are
/// recoverable: `Try` and `Maybe` links absorb them. Everything else
/// fails the whole transform.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("index {0} out of range")]
    IndexOutOfRange(usize),

    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("could not recognize an iri in '{0}'")]
    InvalidIri(String),

    #[error("could not parse date from '{0}'")]
    InvalidDate(String),

    #[error("invalid integer '{0}'")]
    InvalidInt(String),

    #[error("no chain in one-of matched: {0:?}")]
    NoneOf(Vec<String>),

    #[error("no registered transform function named '{0}'")]
    UnknownFunction(String),

    #[error("get-index used outside of an iteration")]
    NotIterating,
}

impl ChainError {
    /// Whether `Try`/`Maybe` may absorb this error and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChainError::MissingKey(_)
                | ChainError::IndexOutOfRange(_)
                | ChainError::TypeMismatch { .. }
        )
    }
}

/// Opaque page cursor decoding failures.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("invalid page cursor")]
    InvalidPageCursor,
}

/// Client-side (4xx-class) request errors on the search surface.
#[derive(Debug, Error)]
pub enum SearchApiError {
    #[error("invalid search parameter: {0}")]
    InvalidParameter(String),

    #[error("unrecognized filter operator '{0}'")]
    InvalidFilterOperator(String),

    #[error("invalid property path '{0}'")]
    InvalidPropertyPath(String),

    #[error("invalid date value '{0}' (expected YYYY, YYYY-MM, or YYYY-MM-DD)")]
    InvalidDateValue(String),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Engine-side (5xx-class) search failures.
#[derive(Debug, Error)]
pub enum IndexStrategyError {
    #[error("search engine unavailable: {0}")]
    Unavailable(String),

    #[error("index backfill incomplete for '{0}'")]
    BackfillIncomplete(String),
}

/// OAI-PMH protocol error conditions, one variant per protocol error code.
#[derive(Debug, Error)]
pub enum OaiError {
    #[error("illegal verb '{0}'")]
    BadVerb(String),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("metadata format '{0}' not supported")]
    CannotDisseminateFormat(String),

    #[error("no item with identifier '{0}'")]
    IdDoesNotExist(String),

    #[error("resumption token invalid or expired")]
    BadResumptionToken,

    #[error("no records match the given criteria")]
    NoRecordsMatch,
}

impl OaiError {
    /// The protocol error code rendered into the XML response.
    pub fn code(&self) -> &'static str {
        match self {
            OaiError::BadVerb(_) => "badVerb",
            OaiError::BadArgument(_) => "badArgument",
            OaiError::CannotDisseminateFormat(_) => "cannotDisseminateFormat",
            OaiError::IdDoesNotExist(_) => "idDoesNotExist",
            OaiError::BadResumptionToken => "badResumptionToken",
            OaiError::NoRecordsMatch => "noRecordsMatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_chain_errors() {
        assert!(ChainError::MissingKey("x".into()).is_recoverable());
        assert!(ChainError::IndexOutOfRange(3).is_recoverable());
        assert!(!ChainError::InvalidIri("??".into()).is_recoverable());
        assert!(!ChainError::InvalidDate("yesterday-ish".into()).is_recoverable());
    }

    #[test]
    fn test_oai_error_codes_are_distinct() {
        let codes = [
            OaiError::BadVerb("x".into()).code(),
            OaiError::BadArgument("x".into()).code(),
            OaiError::CannotDisseminateFormat("x".into()).code(),
            OaiError::IdDoesNotExist("x".into()).code(),
            OaiError::BadResumptionToken.code(),
            OaiError::NoRecordsMatch.code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
