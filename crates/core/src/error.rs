//! Unified error types for the reducer.
//!
//! Parsing helpers in [`crate::url`] never produce these; they fall back to
//! sentinel values instead. Everything else propagates an [`Error`].

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the reducer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty HTML).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No file name is registered for the requested resource kind.
    #[error("UNKNOWN_RESOURCE_KIND: {0}")]
    UnknownResourceKind(String),

    /// Stored file names are limited to 150 characters.
    #[error("FILE_NAME_TOO_LONG: {0}")]
    FileNameTooLong(String),

    /// No artifact is stored under the given url.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Local disk read or write failed.
    #[error("STORAGE_IO: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed.
    #[error("STORAGE_DB: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_DB: migration failed: {0}")]
    MigrationFailed(String),

    /// Fetching an original resource failed.
    #[error("FETCH_FAILED: {0}")]
    Fetch(String),

    /// The minifier rejected the combined resource.
    #[error("MINIFY_FAILED: {0}")]
    Minify(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::UnknownResourceKind(msg) => (-32602, format!("unknown resource kind: {msg}")),
            Error::FileNameTooLong(msg) => (-32602, format!("file name too long: {msg}")),
            Error::NotFound(msg) => (-32001, msg.clone()),
            Error::Io(e) => (-32002, e.to_string()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Fetch(msg) => (-32003, msg.clone()),
            Error::Minify(msg) => (-32004, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

/// Sink for recoverable background failures.
///
/// Purge sweeps, cache repopulation and queued reductions report here instead
/// of failing the caller.
pub trait ErrorHook: Send + Sync {
    fn report(&self, err: &Error);
}

/// Default hook: logs the failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHook;

impl ErrorHook for TracingErrorHook {
    fn report(&self, err: &Error) {
        tracing::error!(error = %err, "background operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("abc123".to_string());
        assert!(err.to_string().contains("NOT_FOUND"));
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::NotFound("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("STORAGE_IO"));
    }
}
