//! Error types for backupdir

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Validation Errors ===
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid file batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid transport encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Lookup Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    // === Store Errors ===
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    #[error("Server removal failed for {server_id}: {reason}")]
    Cascade { server_id: u64, reason: String },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a failure.
///
/// Remote callers only ever see `false` or an empty result for all three,
/// but the service logs and counts them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected: duplicate name or id, bad batch, bad encoding.
    Validation,
    /// Nothing matched.
    NotFound,
    /// The store (or something underneath it) failed.
    Backend,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyExists(_)
            | Error::InvalidBatch(_)
            | Error::InvalidEncoding(_)
            | Error::InvalidArgument(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Backend,
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MetadataCorrupted(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::AlreadyExists("alice".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::InvalidBatch("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::NotFound("alice".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Backend("down".into()).kind(), ErrorKind::Backend);
        assert_eq!(
            Error::Cascade {
                server_id: 2,
                reason: "write failed".into()
            }
            .kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            Error::InvalidEncoding("bad".into()).to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Backend("down".into()).to_http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
