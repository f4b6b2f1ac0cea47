//! Repository implementations.

pub mod contact;
pub mod message_status;

use sqlx::Error;

/// Whether a sqlx error means the queried table has not been migrated yet
/// (PostgreSQL `undefined_table`, SQLSTATE 42P01).
pub(crate) fn is_undefined_table(err: &Error) -> bool {
    match err {
        Error::Database(db) => db.code().as_deref() == Some("42P01"),
        _ => false,
    }
}
