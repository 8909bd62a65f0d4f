// ⚠️ Parking Errors - typed failures returned by the controller
//
// Every controller operation returns one of these instead of a bare SQLite
// error, so the front-end can decide how to word the message.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = ParkingError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ParkingError {
    /// No free slot at check-in
    #[error("parking lot is full: no available slots")]
    LotFull,

    /// Check-in of an identifier that is already parked
    #[error("vehicle {0} is already parked")]
    DuplicateVehicle(String),

    /// Check-out or query of an identifier with no active session
    #[error("no active parked vehicle with number {0}")]
    NotParked(String),

    #[error("exit time {exit} is before entry time {entry}")]
    InvalidInterval {
        entry: NaiveDateTime,
        exit: NaiveDateTime,
    },

    /// Uniqueness / foreign-key / trigger failure raised by the store
    #[error("store integrity violation: {0}")]
    StoreIntegrityViolation(String),

    #[error("invalid rate: {0}")]
    InvalidRate(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid timestamp {0:?}: expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),

    /// Any other SQLite failure (I/O, locked database, ...)
    #[error("store error: {0}")]
    Store(rusqlite::Error),
}

impl From<rusqlite::Error> for ParkingError {
    fn from(err: rusqlite::Error) -> Self {
        if is_constraint_violation(&err) {
            ParkingError::StoreIntegrityViolation(err.to_string())
        } else {
            ParkingError::Store(err)
        }
    }
}

/// True for any SQLITE_CONSTRAINT failure (unique, foreign key, check, trigger)
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// True only for a UNIQUE constraint failure
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
