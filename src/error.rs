//! Error taxonomy for the accounting engine and its collaborators.
//!
//! - [`FormatError`] - a primitive string (elapsed time, memory size, count,
//!   partition pattern, date) could not be parsed. Always propagated to the
//!   immediate caller of the parser.
//! - [`LookupError`] - a collaborator (identity directory, group listing,
//!   accounting tool) could not resolve a request. Absorbed in batch paths,
//!   propagated for single mandatory reports.
//! - [`StoreError`] - the cache store or CSV export failed.
//! - [`ReportError`] - umbrella used by the report builder and the analyzer.

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("invalid elapsed time `{0}`, expected [D-]HH:MM:SS")]
    Elapsed(String),
    #[error("invalid memory size `{0}`")]
    Memory(String),
    #[error("invalid {field} value `{value}`")]
    Count { field: &'static str, value: String },
    #[error("invalid partition pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    Date(String),
    #[error("invalid month `{0}`, expected YYYY-MM")]
    Month(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("identity lookup for `{user}` failed: {reason}")]
    Identity { user: String, reason: String },
    #[error("group lookup for `{user}` failed: {reason}")]
    Groups { user: String, reason: String },
    #[error("accounting query failed: {0}")]
    Accounting(String),
}

impl LookupError {
    pub fn identity(user: &str, reason: impl ToString) -> Self {
        Self::Identity {
            user: user.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn groups(user: &str, reason: impl ToString) -> Self {
        Self::Groups {
            user: user.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache store lock poisoned")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
