//! `SQLite` durable store.
//!
//! Enable the `sqlx_sqlite` feature to use these implementations. Run
//! [`migrations::run`] once at startup before handing the repositories to a
//! [`SessionManager`](crate::SessionManager).

pub mod migrations;
mod session_record;
mod user;

use sqlx::SqlitePool;

pub use session_record::SqliteSessionRecordRepository;
pub use user::SqliteUserRepository;

use crate::SessionError;

/// Creates both `SQLite` repositories from a connection pool.
pub fn create_repositories(
    pool: SqlitePool,
) -> (SqliteSessionRecordRepository, SqliteUserRepository) {
    (
        SqliteSessionRecordRepository::new(pool.clone()),
        SqliteUserRepository::new(pool),
    )
}

pub(crate) fn store_error(operation: &str, e: &sqlx::Error) -> SessionError {
    log::error!(target: "latchkey", "msg=\"database error\", operation=\"{operation}\", error=\"{e}\"");
    SessionError::StoreUnavailable(e.to_string())
}
