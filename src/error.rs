// ❗ Error Types - What can go wrong while reconciling history
// Fatal errors carry the revision timestamp and offending field so the bad
// source data can be located in the export repository.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    /// No balances and no transactions anywhere in the history
    #[error("no balances or transactions found in any revision of the history")]
    MissingSource,

    /// A row in a revision's file failed numeric/date parsing
    #[error("malformed {field} value {value:?} in revision at {revision}")]
    MalformedRecord {
        revision: DateTime<Utc>,
        field: &'static str,
        value: String,
    },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconError {
    /// Shorthand for the parse-failure case
    pub fn malformed(revision: DateTime<Utc>, field: &'static str, value: &str) -> Self {
        ReconError::MalformedRecord {
            revision,
            field,
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
