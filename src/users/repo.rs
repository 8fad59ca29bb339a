use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{from_sqlx, AppResult};
use crate::users::repo_types::User;

/// Durable collection of user accounts.
///
/// Implementations must reject a duplicate username or email with
/// `AppError::Conflict`; that rejection is authoritative over any pre-check.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> AppResult<User>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn list_all(&self) -> AppResult<Vec<User>>;
    /// Returns `false` when no row carries `user.id`.
    async fn update(&self, user: &User) -> AppResult<bool>;
    /// Removes the user and every detection record it owns in one atomic
    /// step. Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn count(&self) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, real_name, created_at, updated_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: User) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, real_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.real_name)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "insert user"))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "find user by id"))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "find user by username"))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "find user by email"))
    }

    async fn list_all(&self) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list users"))
    }

    async fn update(&self, user: &User) -> AppResult<bool> {
        let done = sqlx::query(
            r#"
            UPDATE users
               SET username = $2, email = $3, password_hash = $4,
                   real_name = $5, updated_at = $6
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.real_name)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| from_sqlx(e, "update user"))?;
        Ok(done.rows_affected() > 0)
    }

    /// `detection_records.user_id` is `ON DELETE CASCADE`, so the owned
    /// records go in the same statement.
    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "delete user"))?;
        Ok(done.rows_affected() > 0)
    }

    async fn count(&self) -> AppResult<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "count users"))?;
        Ok(n.max(0) as u64)
    }
}
