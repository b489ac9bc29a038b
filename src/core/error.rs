use std::io;
use thiserror::Error;

/// Classified failure returned by every exported modset operation.
#[derive(Error, Debug)]
pub enum ModsetError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("schema reconciliation failed: {0}")]
    SchemaReconciliation(String),
}

impl ModsetError {
    /// Stable machine-readable code for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ModsetError::InvalidArgument(_) => "invalid_argument",
            ModsetError::NotFound(_) => "not_found",
            ModsetError::AlreadyExists(_) => "already_exists",
            ModsetError::Persistence(_)
            | ModsetError::IoError(_)
            | ModsetError::JsonError(_)
            | ModsetError::RusqliteError(_) => "persistence",
            ModsetError::SchemaReconciliation(_) => "schema_reconciliation",
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ModsetError::InvalidArgument(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ModsetError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classifies_wrapped_errors_as_persistence() {
        let err = ModsetError::from(io::Error::other("disk full"));
        assert_eq!(err.kind(), "persistence");

        let err = ModsetError::SchemaReconciliation("boom".to_string());
        assert_eq!(err.kind(), "schema_reconciliation");
        assert_eq!(
            err.to_string(),
            "schema reconciliation failed: boom"
        );
    }
}
