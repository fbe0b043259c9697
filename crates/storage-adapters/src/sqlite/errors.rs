//! Classification of sqlx failures into the domain taxonomy.

use domains::DomainError;
use sqlx::error::ErrorKind;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// True for any extended result code whose primary code (the low byte)
/// means "try again later", e.g. `SQLITE_BUSY_SNAPSHOT` (517).
fn is_busy_or_locked(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// Maps an engine error to a [`DomainError`]. `what` names the row being
/// touched, e.g. "board `rust`", and ends up in caller-visible messages.
pub(crate) fn classify(err: sqlx::Error, what: &str) -> DomainError {
    match &err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => DomainError::Conflict(format!("{what} already exists")),
            ErrorKind::ForeignKeyViolation => {
                DomainError::Invalid(format!("{what} references a parent that does not exist"))
            }
            ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                DomainError::Invalid(format!("{what} is missing a required value"))
            }
            _ if db.code().is_some_and(|code| is_busy_or_locked(&code)) => {
                DomainError::Unavailable(err.to_string())
            }
            _ => DomainError::Internal(err.to_string()),
        },
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::WorkerCrashed => DomainError::Unavailable(err.to_string()),
        _ => DomainError::Internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_retryable() {
        let err = classify(sqlx::Error::PoolTimedOut, "board 1");
        assert!(err.is_retryable());
    }

    #[test]
    fn decode_errors_are_internal() {
        let err = classify(sqlx::Error::ColumnNotFound("name".into()), "board 1");
        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[test]
    fn extended_busy_and_locked_codes_are_contention() {
        // BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT
        for code in ["5", "6", "261", "262", "517"] {
            assert!(is_busy_or_locked(code), "{code}");
        }
        // CONSTRAINT, CONSTRAINT_UNIQUE, and garbage
        for code in ["19", "2067", "abc", ""] {
            assert!(!is_busy_or_locked(code), "{code}");
        }
    }
}
