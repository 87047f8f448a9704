//! Embedded schema migrations for `SQLite`.
//!
//! # Example
//!
//! ```rust,ignore
//! use latchkey::sqlite::migrations;
//! use sqlx::SqlitePool;
//!
//! async fn setup_database(pool: &SqlitePool) -> Result<(), sqlx::Error> {
//!     migrations::run(pool).await?;
//!     Ok(())
//! }
//! ```

use sqlx::{Executor, SqlitePool};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20250301000001_create_users_table",
        include_str!("../../migrations_sqlite/20250301000001_create_users_table.sql"),
    ),
    (
        "20250301000002_create_login_sessions_table",
        include_str!("../../migrations_sqlite/20250301000002_create_login_sessions_table.sql"),
    ),
];

/// Applies every pending migration in order.
///
/// Applied migrations are tracked in the `_latchkey_migrations` table, so
/// calling this on every startup is safe.
pub async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    pool.execute(
        r"
        CREATE TABLE IF NOT EXISTS _latchkey_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        ",
    )
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _latchkey_migrations WHERE name = ?)")
                .bind(*name)
                .fetch_one(pool)
                .await?;

        if applied {
            continue;
        }

        // One statement per execute. Splitting on ';' breaks on semicolons
        // inside string literals; the bundled files contain none.
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                pool.execute(trimmed).await?;
            }
        }

        sqlx::query("INSERT INTO _latchkey_migrations (name) VALUES (?)")
            .bind(*name)
            .execute(pool)
            .await?;

        log::info!(target: "latchkey", "msg=\"migration applied\" name=\"{name}\"");
    }

    Ok(())
}

/// Names of the bundled migrations, in application order.
pub fn names() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|(name, _)| *name)
}
