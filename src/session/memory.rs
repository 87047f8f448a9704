//! In-memory session variant.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{Permission, Session, SessionSnapshot, SessionValue};

#[derive(Debug)]
struct Fields {
    ip: u32,
    user_id: i64,
    perm: Permission,
    name: String,
    email: String,
    access_time: DateTime<Utc>,
    data: HashMap<String, SessionValue>,
}

/// Session state held by [`MemoryProvider`](crate::provider::MemoryProvider).
///
/// All mutable fields sit behind one mutex. Each accessor is a single
/// critical section; two separate calls are not atomic with respect to
/// each other. Use [`Session::snapshot`] for a consistent read of every
/// identity field.
#[derive(Debug)]
pub struct MemorySession {
    key: String,
    fields: Mutex<Fields>,
}

impl MemorySession {
    /// Creates an empty session for `key`, accessed now.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Mutex::new(Fields {
                ip: 0,
                user_id: 0,
                perm: Permission::User,
                name: String::new(),
                email: String::new(),
                access_time: Utc::now(),
                data: HashMap::new(),
            }),
        }
    }

    /// Number of entries in the data mapping.
    pub fn data_len(&self) -> usize {
        self.lock().data.len()
    }

    // A panic while holding the lock cannot leave a field half-written,
    // so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, Fields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for MemorySession {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self, name: &str) -> Option<SessionValue> {
        self.lock().data.get(name).cloned()
    }

    fn set(&self, name: &str, value: SessionValue) {
        self.lock().data.insert(name.to_owned(), value);
    }

    fn delete(&self, name: &str) {
        self.lock().data.remove(name);
    }

    fn clear(&self) {
        self.lock().data.clear();
    }

    fn access_time(&self) -> DateTime<Utc> {
        self.lock().access_time
    }

    fn set_access_time(&self, at: DateTime<Utc>) {
        self.lock().access_time = at;
    }

    /// Never moves the access time backwards, even if the clock does.
    fn touch(&self) {
        let mut fields = self.lock();
        fields.access_time = fields.access_time.max(Utc::now());
    }

    fn ip(&self) -> u32 {
        self.lock().ip
    }

    fn set_ip(&self, ip: u32) {
        self.lock().ip = ip;
    }

    fn user_id(&self) -> i64 {
        self.lock().user_id
    }

    fn set_user_id(&self, user_id: i64) {
        self.lock().user_id = user_id;
    }

    fn perm(&self) -> Permission {
        self.lock().perm
    }

    fn set_perm(&self, perm: Permission) {
        self.lock().perm = perm;
    }

    fn name(&self) -> String {
        self.lock().name.clone()
    }

    fn set_name(&self, name: &str) {
        name.clone_into(&mut self.lock().name);
    }

    fn email(&self) -> String {
        self.lock().email.clone()
    }

    fn set_email(&self, email: &str) {
        email.clone_into(&mut self.lock().email);
    }

    fn snapshot(&self) -> SessionSnapshot {
        let fields = self.lock();
        SessionSnapshot {
            key: self.key.clone(),
            user_id: fields.user_id,
            ip: fields.ip,
            perm: fields.perm,
            name: fields.name.clone(),
            email: fields.email.clone(),
            access_time: fields.access_time,
        }
    }
}
