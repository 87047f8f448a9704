//! Session capability interface and value types.
//!
//! A [`Session`] is the per-user state held while a user is logged in. The
//! trait is implemented by [`MemorySession`]; other backends can provide
//! their own variant. Every accessor takes the session's own lock for a
//! single field, so handlers holding a [`SessionRef`] can read and mutate it
//! without going back through the provider.

mod memory;
mod value;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemorySession;
pub use value::SessionValue;

/// Shared handle to a live session.
pub type SessionRef = Arc<dyn Session>;

/// Permission level copied from the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    User,
    Admin,
}

impl Permission {
    /// Numeric code used by the durable store.
    pub const fn code(self) -> u32 {
        match self {
            Permission::User => 0,
            Permission::Admin => 3,
        }
    }

    /// Maps a stored code back to a level.
    ///
    /// Unknown codes fall back to the least privileged level.
    pub const fn from_code(code: u32) -> Self {
        match code {
            3 => Permission::Admin,
            _ => Permission::User,
        }
    }

    /// Returns true if this level satisfies `required`.
    pub fn allows(self, required: Permission) -> bool {
        self >= required
    }
}

/// Identity fields of a session read under a single lock acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: String,
    pub user_id: i64,
    pub ip: u32,
    pub perm: Permission,
    pub name: String,
    pub email: String,
    pub access_time: DateTime<Utc>,
}

pub trait Session: Send + Sync {
    /// The session key. Immutable after creation.
    fn key(&self) -> &str;

    fn get(&self, name: &str) -> Option<SessionValue>;
    fn set(&self, name: &str, value: SessionValue);
    fn delete(&self, name: &str);

    /// Removes every entry from the data mapping. Identity fields are kept.
    fn clear(&self);

    fn access_time(&self) -> DateTime<Utc>;
    fn set_access_time(&self, at: DateTime<Utc>);

    fn ip(&self) -> u32;
    fn set_ip(&self, ip: u32);

    fn user_id(&self) -> i64;
    fn set_user_id(&self, user_id: i64);

    fn perm(&self) -> Permission;
    fn set_perm(&self, perm: Permission);

    fn name(&self) -> String;
    fn set_name(&self, name: &str);

    fn email(&self) -> String;
    fn set_email(&self, email: &str);

    fn snapshot(&self) -> SessionSnapshot;

    /// Marks the session as used now. The access time never decreases.
    ///
    /// The default reads and writes separately; backends with a lock should
    /// override it to do both in one critical section.
    fn touch(&self) {
        let now = Utc::now();
        if now > self.access_time() {
            self.set_access_time(now);
        }
    }
}
