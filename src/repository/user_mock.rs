#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::SessionError;

use super::user::{AuthUser, UserRepository};

#[derive(Clone)]
pub struct MockUserRepository {
    pub users: Arc<Mutex<Vec<AuthUser>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self {
            users: Arc::new(Mutex::new(vec![])),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_users(users: Vec<AuthUser>) -> Self {
        let repo = Self::new();
        *repo.users.lock().unwrap() = users;
        repo
    }

    pub fn insert(&self, user: AuthUser) {
        self.users.lock().unwrap().push(user);
    }

    /// Makes every call fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SessionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::StoreUnavailable(
                "mock user store offline".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for MockUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<AuthUser>, SessionError> {
        self.check_available()?;
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }
}
