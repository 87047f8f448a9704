#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::SessionError;

use super::session_record::{SessionRecord, SessionRecordRepository, flags};

#[derive(Clone)]
pub struct MockSessionRecordRepository {
    pub records: Arc<Mutex<Vec<SessionRecord>>>,
    unavailable: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

impl MockSessionRecordRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(vec![])),
            unavailable: Arc::new(AtomicBool::new(false)),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn get(&self, key: &str) -> Option<SessionRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.key == key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `find_session_record` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Makes every call fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SessionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::StoreUnavailable(
                "mock session store offline".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for MockSessionRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRecordRepository for MockSessionRecordRepository {
    async fn find_session_record(&self, key: &str) -> Result<Option<SessionRecord>, SessionError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.get(key))
    }

    async fn insert_session_record(
        &self,
        key: &str,
        user_id: i64,
        ip: u32,
        flags: u8,
    ) -> Result<SessionRecord, SessionError> {
        self.check_available()?;

        let record = SessionRecord {
            key: key.to_owned(),
            user_id,
            ip,
            access_time: Utc::now(),
            flags,
        };

        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.key != key);
        records.push(record.clone());
        drop(records);

        Ok(record)
    }

    async fn archive_session_record(&self, key: &str) -> Result<(), SessionError> {
        self.check_available()?;

        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.key == key) {
            record.flags |= flags::ARCHIVED;
            record.access_time = Utc::now();
        }

        Ok(())
    }
}
