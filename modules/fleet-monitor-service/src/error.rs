//! Typed failures shared by every fleet operation.

use fleet_monitor_types::IssueStatus;
use std::fmt;

#[derive(Debug)]
pub enum FleetError {
    /// A referenced resource, issue or anomaly does not exist
    NotFound { entity: &'static str, id: i64 },
    /// The issue state machine does not allow this move
    InvalidTransition { from: IssueStatus, to: IssueStatus },
    /// Resolve was requested on an issue that is already resolved
    AlreadyResolved { id: i64 },
    /// Out-of-range or malformed input
    Validation(String),
    /// The store could not serialise the write; the caller may retry
    Conflict(String),
    /// Any other store failure
    Storage(rusqlite::Error),
}

pub type FleetResult<T> = Result<T, FleetError>;

impl FleetError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        FleetError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FleetError::Validation(message.into())
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::NotFound { entity, id } => write!(f, "{} #{} not found", entity, id),
            FleetError::InvalidTransition { from, to } => {
                write!(f, "Invalid issue transition: {} -> {}", from, to)
            }
            FleetError::AlreadyResolved { id } => write!(f, "Issue #{} is already resolved", id),
            FleetError::Validation(msg) => write!(f, "Validation failed: {}", msg),
            FleetError::Conflict(msg) => write!(f, "Conflicting update, retry: {}", msg),
            FleetError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for FleetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FleetError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for FleetError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                FleetError::Conflict(e.to_string())
            }
            _ => FleetError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(FleetError::from(busy), FleetError::Conflict(_)));

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(FleetError::from(other), FleetError::Storage(_)));
    }

    #[test]
    fn test_display_messages() {
        let err = FleetError::not_found("Issue", 7);
        assert_eq!(err.to_string(), "Issue #7 not found");

        let err = FleetError::InvalidTransition {
            from: IssueStatus::Resolved,
            to: IssueStatus::Acknowledged,
        };
        assert_eq!(err.to_string(), "Invalid issue transition: resolved -> acknowledged");
    }
}
