//! Crate error type. Configuration and launch failures are kept apart from
//! extraction failures so a batch can contain the latter to one table.

use crate::namespace::NamespaceError;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad limits, unreadable or malformed declared files, tick-rate mismatch
    #[error("configuration error: {0}")]
    Config(String),

    /// The executable could not be started at all
    #[error("invocation '{invocation}': failed to launch '{}': {source}", program.display())]
    Launch {
        invocation: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error("table '{table}', column '{column}': cannot cast '{value}' to {ty}")]
    Cast {
        table: String,
        column: String,
        value: String,
        ty: String,
    },

    #[error("table '{table}': pattern columns disagree on match count ('{first}' has {first_count}, '{second}' has {second_count})")]
    Cardinality {
        table: String,
        first: String,
        first_count: usize,
        second: String,
        second_count: usize,
    },

    #[error("table '{table}': variable '{variable}' of column '{column}' was not available")]
    MissingValue {
        table: String,
        column: String,
        variable: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// True for failures confined to populating one table of one invocation.
    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            Error::Cast { .. } | Error::Cardinality { .. } | Error::MissingValue { .. }
        )
    }
}
