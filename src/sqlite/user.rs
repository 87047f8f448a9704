use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use super::store_error;
use crate::{AuthUser, Permission, SessionError, UserRepository};

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts an active user.
    ///
    /// Account management lives outside this crate; this exists for seeding
    /// and tests.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, name, email), err))]
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        perm: Permission,
        group_id: i64,
    ) -> Result<AuthUser, SessionError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (name, email, perm, group_id, active) VALUES (?, ?, ?, ?, 1) RETURNING id, name, email, perm, group_id, active",
        )
        .bind(name)
        .bind(email)
        .bind(i64::from(perm.code()))
        .bind(group_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create_user", &e))?;

        Ok(row.into())
    }

    /// Activates or deactivates a user. Deactivated users cannot start or
    /// revive sessions.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), err))]
    pub async fn set_active(&self, user_id: i64, active: bool) -> Result<(), SessionError> {
        sqlx::query("UPDATE users SET active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("set_active", &e))?;

        Ok(())
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    perm: i64,
    group_id: i64,
    active: bool,
}

impl From<UserRow> for AuthUser {
    fn from(row: UserRow) -> Self {
        AuthUser {
            id: row.id,
            name: row.name,
            email: row.email,
            perm: u32::try_from(row.perm).map_or(Permission::User, Permission::from_code),
            group_id: row.group_id,
            active: row.active,
        }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), err))]
    async fn find_user_by_id(&self, id: i64) -> Result<Option<AuthUser>, SessionError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, perm, group_id, active FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find_user_by_id", &e))?;

        Ok(row.map(Into::into))
    }
}
