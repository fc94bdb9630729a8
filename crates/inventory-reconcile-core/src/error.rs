//! Failure taxonomy for imports and movements.
//!
//! Row-level resolution misses are not errors; they land in the
//! reconciliation report. Everything here aborts the whole operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing file, missing required columns or fields, malformed request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uploader mismatch or several receivers in one batch. Nothing is
    /// written. `names` carries the offending raw names.
    #[error("{message}")]
    Conflict { message: String, names: Vec<String> },

    /// A referenced user or item does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The acting user does not own the item.
    #[error("{0}")]
    Forbidden(String),

    /// The store failed. No partial commit is possible.
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        LedgerError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        LedgerError::Forbidden(msg.into())
    }

    /// Stable identifier used in the JSON error contract.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Conflict { .. } => "conflict",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::Persistence(_) => "persistence",
        }
    }

    /// Names surfaced to the caller for manual correction.
    pub fn names(&self) -> &[String] {
        match self {
            LedgerError::Conflict { names, .. } => names,
            _ => &[],
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
