use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use super::store_error;
use crate::repository::flags;
use crate::{SessionError, SessionRecord, SessionRecordRepository};

/// Session rows in the `login_sessions` table.
#[derive(Clone)]
pub struct SqliteSessionRecordRepository {
    pool: SqlitePool,
}

impl SqliteSessionRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct LoginSessionRow {
    key_id: String,
    user_id: i64,
    ip: i64,
    access_time: DateTime<Utc>,
    flags: i64,
}

impl From<LoginSessionRow> for SessionRecord {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from(row: LoginSessionRow) -> Self {
        SessionRecord {
            key: row.key_id,
            user_id: row.user_id,
            ip: row.ip as u32,
            access_time: row.access_time,
            flags: row.flags as u8,
        }
    }
}

#[async_trait]
impl SessionRecordRepository for SqliteSessionRecordRepository {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, err))]
    async fn find_session_record(&self, key: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row: Option<LoginSessionRow> = sqlx::query_as(
            "SELECT key_id, user_id, ip, access_time, flags FROM login_sessions WHERE key_id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find_session_record", &e))?;

        Ok(row.map(Into::into))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, key), err))]
    async fn insert_session_record(
        &self,
        key: &str,
        user_id: i64,
        ip: u32,
        flags: u8,
    ) -> Result<SessionRecord, SessionError> {
        let row: LoginSessionRow = sqlx::query_as(
            "INSERT INTO login_sessions (key_id, user_id, ip, access_time, flags) VALUES (?, ?, ?, ?, ?) RETURNING key_id, user_id, ip, access_time, flags",
        )
        .bind(key)
        .bind(user_id)
        .bind(i64::from(ip))
        .bind(Utc::now())
        .bind(i64::from(flags))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("insert_session_record", &e))?;

        Ok(row.into())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, err))]
    async fn archive_session_record(&self, key: &str) -> Result<(), SessionError> {
        sqlx::query("UPDATE login_sessions SET flags = flags | ?, access_time = ? WHERE key_id = ?")
            .bind(i64::from(flags::ARCHIVED))
            .bind(Utc::now())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("archive_session_record", &e))?;

        Ok(())
    }
}
