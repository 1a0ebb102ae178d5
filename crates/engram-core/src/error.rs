//! Error Taxonomy
//!
//! Every fallible operation in the engine returns [`EngineError`]. The kinds
//! map 1:1 onto the transport-level responses: REST status codes, JSON-RPC
//! error codes, and CLI exit codes.

use std::time::Duration;

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Caller-supplied data is invalid (empty content, unknown relationship
    /// type, missing identifier). Always surfaced verbatim.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A record the operation requires does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation from the store (duplicate unique key).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A best-effort external service is unreachable or disabled. Never
    /// propagated from write paths; those degrade silently after logging.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Admission control denied the request.
    #[error("Rate limited ({limit_type}), retry after {retry_after:?}")]
    RateLimited {
        /// Which bucket rejected: "global" or the operation class.
        limit_type: String,
        /// Suggested wait before retrying.
        retry_after: Duration,
    },

    /// The per-call cancel token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// Any unexpected condition. Logged with full context at the raise site.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => EngineError::Conflict(
                    message
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                ),
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::DiskFull
                | rusqlite::ErrorCode::SystemIoFailure => {
                    EngineError::Unavailable(format!("database: {}", err))
                }
                _ => EngineError::Internal(format!("database: {}", err)),
            },
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::NotFound("no matching row".to_string())
            }
            _ => EngineError::Internal(format!("database: {}", err)),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Unavailable(format!("io: {}", err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("json: {}", err))
    }
}

impl EngineError {
    /// True when the error came from a best-effort dependency and the
    /// operation can proceed with degraded behavior.
    pub fn is_degradable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: relationships".to_string()),
        );
        assert!(matches!(EngineError::from(err), EngineError::Conflict(_)));
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(EngineError::from(err), EngineError::NotFound(_)));
    }

    #[test]
    fn test_rate_limited_display_names_bucket() {
        let err = EngineError::RateLimited {
            limit_type: "search".to_string(),
            retry_after: Duration::from_millis(500),
        };
        assert!(err.to_string().contains("search"));
    }
}
