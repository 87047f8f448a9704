use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Permission, SessionError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub perm: Permission,
    pub group_id: i64,
    pub active: bool,
}

#[cfg(any(test, feature = "mocks"))]
impl AuthUser {
    pub fn mock() -> Self {
        AuthUser {
            id: 1,
            name: "Test User".to_owned(),
            email: "test@example.com".to_owned(),
            perm: Permission::User,
            group_id: 0,
            active: true,
        }
    }

    pub fn mock_with_id(id: i64) -> Self {
        AuthUser {
            id,
            name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            ..Self::mock()
        }
    }

    pub fn mock_admin(id: i64) -> Self {
        AuthUser {
            perm: Permission::Admin,
            ..Self::mock_with_id(id)
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<AuthUser>, SessionError>;
}

#[async_trait]
impl<T: UserRepository + ?Sized> UserRepository for Arc<T> {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<AuthUser>, SessionError> {
        (**self).find_user_by_id(id).await
    }
}
