use rusqlite::ffi;
use thiserror::Error;

/// A row was rejected before reaching SQLite.
#[derive(Debug, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Which kind of SQLite constraint a failed statement tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Check,
    Unique,
    ForeignKey,
    NotNull,
    Other,
}

impl Constraint {
    /// Classify an error returned from the query layer. `None` when the error
    /// is not a constraint violation.
    pub fn of(err: &anyhow::Error) -> Option<Self> {
        let rusqlite::Error::SqliteFailure(e, _) = err.downcast_ref::<rusqlite::Error>()? else {
            return None;
        };
        if e.code != rusqlite::ErrorCode::ConstraintViolation {
            return None;
        }
        Some(match e.extended_code {
            ffi::SQLITE_CONSTRAINT_CHECK => Self::Check,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::Unique,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ForeignKey,
            ffi::SQLITE_CONSTRAINT_NOTNULL => Self::NotNull,
            _ => Self::Other,
        })
    }
}
