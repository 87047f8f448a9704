//! Pluggable session stores.
//!
//! A [`Provider`] owns the keyed collection of live sessions and their
//! lifecycle. [`MemoryProvider`] is the built-in implementation. Providers
//! are registered by name in a [`ProviderRegistry`] at startup, and a
//! [`SessionManager`](crate::SessionManager) picks one by name when it is
//! constructed.

mod memory;
mod registry;

use async_trait::async_trait;
use chrono::Duration;

use crate::repository::SessionRecordRepository;
use crate::session::SessionRef;

pub use memory::MemoryProvider;
pub use registry::ProviderRegistry;

/// Outcome of one [`Provider::gc`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Keys evicted from memory.
    pub expired: Vec<String>,
    /// Expired entries whose durable record could not be archived.
    pub flush_failures: usize,
}

impl GcReport {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Resets the backing storage to empty.
    ///
    /// [`ProviderRegistry::register`] calls this once before the provider
    /// is handed out.
    async fn init(&self);

    /// Creates a session for `key`, replacing any existing entry.
    async fn session_init(&self, key: &str) -> SessionRef;

    /// Returns the live session for `key`. Never creates one.
    async fn session_read(&self, key: &str) -> Option<SessionRef>;

    /// Removes the entry for `key` if present.
    async fn session_destroy(&self, key: &str);

    /// Number of live sessions.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts every session idle for longer than `lifetime`, archiving its
    /// durable record through `store` first.
    async fn gc(&self, lifetime: Duration, store: &dyn SessionRecordRepository) -> GcReport;
}
