use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Bits of [`SessionRecord::flags`].
pub mod flags {
    /// The in-memory copy expired and the row is kept for history only.
    pub const ARCHIVED: u8 = 0x01;
}

/// A committed session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: String,
    pub user_id: i64,
    pub ip: u32,
    pub access_time: DateTime<Utc>,
    pub flags: u8,
}

impl SessionRecord {
    pub fn is_archived(&self) -> bool {
        self.flags & flags::ARCHIVED != 0
    }
}

#[async_trait]
pub trait SessionRecordRepository: Send + Sync {
    /// Finds the row for `key`, archived or not.
    async fn find_session_record(&self, key: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Persists a new row for a freshly minted session.
    async fn insert_session_record(
        &self,
        key: &str,
        user_id: i64,
        ip: u32,
        flags: u8,
    ) -> Result<SessionRecord, SessionError>;

    /// Marks the row for `key` archived and stamps its access time.
    ///
    /// Called when the in-memory copy is swept or destroyed. Missing rows
    /// are not an error.
    async fn archive_session_record(&self, key: &str) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: SessionRecordRepository + ?Sized> SessionRecordRepository for Arc<T> {
    async fn find_session_record(&self, key: &str) -> Result<Option<SessionRecord>, SessionError> {
        (**self).find_session_record(key).await
    }

    async fn insert_session_record(
        &self,
        key: &str,
        user_id: i64,
        ip: u32,
        flags: u8,
    ) -> Result<SessionRecord, SessionError> {
        (**self).insert_session_record(key, user_id, ip, flags).await
    }

    async fn archive_session_record(&self, key: &str) -> Result<(), SessionError> {
        (**self).archive_session_record(key).await
    }
}
