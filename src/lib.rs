//! Server-side session management.
//!
//! `latchkey` keeps logged-in state for a web service in a pluggable
//! [`Provider`](provider::Provider) (an in-memory map by default) and falls
//! back to a durable store on cache miss. The [`SessionManager`] maps an
//! inbound request to a live session: it reads the session cookie, looks the
//! token up in the provider, revives it from the durable store when the
//! process has forgotten it, and mints new sessions on login.
//!
//! # Example
//!
//! ```rust,ignore
//! use latchkey::provider::{MemoryProvider, ProviderRegistry};
//! use latchkey::{RequestParts, SessionConfig, SessionManager};
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("memory", MemoryProvider::new()).await?;
//!
//! let manager = SessionManager::new(&registry, SessionConfig::default(), sessions, users)?;
//!
//! let mut request = RequestParts::new().with_remote_addr("10.0.0.7:51234");
//! let session = manager.session_start(&mut request, &user).await?;
//! ```

pub mod config;
pub mod crypto;
pub mod events;
mod manager;
pub mod provider;
pub mod repository;
mod request;
pub mod session;

#[cfg(feature = "actix")]
pub mod api;

#[cfg(feature = "sqlx_sqlite")]
pub mod sqlite;

use std::fmt;

pub use config::SessionConfig;
pub use manager::SessionManager;
pub use repository::{AuthUser, SessionRecord, SessionRecordRepository, UserRepository};
pub use request::{RequestContext, RequestParts, SessionCookie};
pub use session::{Permission, Session, SessionRef, SessionSnapshot, SessionValue};

#[cfg(any(test, feature = "mocks"))]
pub use repository::{MockSessionRecordRepository, MockUserRepository};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No provider is registered under the requested name.
    ProviderNotRegistered(String),
    /// A provider is already registered under this name.
    DuplicateProviderRegistration(String),
    InvalidProviderName,
    /// The durable store could not complete a call.
    StoreUnavailable(String),
    /// The user exists but is deactivated.
    InactiveUser(i64),
    InvalidConfiguration(String),
}

impl std::error::Error for SessionError {}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ProviderNotRegistered(name) => {
                write!(f, "Unknown session provider: {}", name)
            }
            SessionError::DuplicateProviderRegistration(name) => {
                write!(f, "Session provider already registered: {}", name)
            }
            SessionError::InvalidProviderName => write!(f, "Provider name must not be empty"),
            SessionError::StoreUnavailable(msg) => write!(f, "Session store unavailable: {}", msg),
            SessionError::InactiveUser(id) => write!(f, "User {} is not active", id),
            SessionError::InvalidConfiguration(msg) => {
                write!(f, "Invalid session configuration: {}", msg)
            }
        }
    }
}

/// Shortens a session key for log output.
pub(crate) fn key_prefix(key: &str) -> String {
    key.chars().take(8).collect()
}
