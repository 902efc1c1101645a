use hearth_core::ValidationError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
///
/// Every engine operation runs inside a single store transaction, so any error
/// returned from the engine means no aggregate, expense or contribution changed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures raised before the store was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::NotADatabase
                ) =>
            {
                Self::BackendUnavailable(value.to_string())
            }
            _ => Self::Storage(value.to_string()),
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::BackendUnavailable(value.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
