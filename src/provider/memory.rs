//! In-memory session provider.
//!
//! Suitable for single-process deployments. Sessions that age out of memory
//! (or are lost on restart) can be revived from the durable store by the
//! manager.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use super::{GcReport, Provider};
use crate::key_prefix;
use crate::repository::SessionRecordRepository;
use crate::session::{MemorySession, Session, SessionRef};

/// Stores live sessions in a `HashMap` behind an async mutex.
///
/// The map lock only covers structural changes (insert, remove, lookup).
/// Field updates go through each session's own lock, so a handler holding a
/// [`SessionRef`] never contends on the map.
///
/// # Note
///
/// [`gc`](Provider::gc) holds the map lock for the whole sweep, including
/// the durable-store archive call for each expired entry. A slow store
/// stalls lookups for the duration of the sweep.
#[derive(Clone)]
pub struct MemoryProvider {
    sessions: Arc<Mutex<HashMap<String, Arc<MemorySession>>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn init(&self) {
        self.sessions.lock().await.clear();
    }

    async fn session_init(&self, key: &str) -> SessionRef {
        let session = Arc::new(MemorySession::new(key));

        let replaced = self
            .sessions
            .lock()
            .await
            .insert(key.to_owned(), Arc::clone(&session));

        if replaced.is_some() {
            log::debug!(target: "latchkey", "msg=\"session replaced\" key_prefix=\"{}\"", key_prefix(key));
        }

        session
    }

    async fn session_read(&self, key: &str) -> Option<SessionRef> {
        self.sessions
            .lock()
            .await
            .get(key)
            .map(|session| Arc::clone(session) as SessionRef)
    }

    async fn session_destroy(&self, key: &str) {
        self.sessions.lock().await.remove(key);
    }

    async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn gc(&self, lifetime: Duration, store: &dyn SessionRecordRepository) -> GcReport {
        let mut sessions = self.sessions.lock().await;

        let now = Utc::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| now.signed_duration_since(session.access_time()) > lifetime)
            .map(|(key, _)| key.clone())
            .collect();

        let mut report = GcReport::default();

        for key in expired {
            if let Err(e) = store.archive_session_record(&key).await {
                log::error!(
                    target: "latchkey",
                    "msg=\"failed to archive expired session\" key_prefix=\"{}\" error=\"{e}\"",
                    key_prefix(&key)
                );
                report.flush_failures += 1;
            }
            sessions.remove(&key);
            report.expired.push(key);
        }

        log::info!(
            target: "latchkey",
            "msg=\"session sweep finished\" expired={} live={} flush_failures={}",
            report.expired.len(),
            sessions.len(),
            report.flush_failures
        );

        report
    }
}
