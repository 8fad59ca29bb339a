use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::password::{hash_password, verify_password};
use crate::users::repo::UserStore;
use crate::users::repo_types::User;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// Account registration, lookup and credential checks.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        real_name: Option<&str>,
    ) -> AppResult<User> {
        let username = username.trim();
        let email = email.trim();

        if username.is_empty() {
            warn!("blank username");
            return Err(AppError::invalid("username must not be blank"));
        }
        if password.is_empty() {
            warn!("blank password");
            return Err(AppError::invalid("password must not be blank"));
        }
        if !is_valid_email(email) {
            warn!(%email, "invalid email");
            return Err(AppError::invalid("invalid email"));
        }

        if self.exists(username).await? {
            warn!(%username, "username already exists");
            return Err(AppError::conflict("username already exists"));
        }
        if self.exists_email(email).await? {
            warn!(%email, "email already registered");
            return Err(AppError::conflict("email already registered"));
        }

        let password_hash = hash_password(password)?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            real_name: real_name.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        // The store's unique indexes settle races the pre-checks above miss.
        let user = self.users.insert(user).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// `true` only for an existing user whose stored hash matches `password`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<bool> {
        let Some(user) = self.find_by_username(username).await? else {
            debug!("unknown username");
            return Ok(false);
        };
        match verify_password(password, &user.password_hash) {
            Ok(ok) => Ok(ok),
            Err(e) => {
                error!(user_id = %user.id, error = %e, "stored password hash is unreadable");
                Ok(false)
            }
        }
    }

    pub async fn exists(&self, username: &str) -> AppResult<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    pub async fn exists_email(&self, email: &str) -> AppResult<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        self.users.find_by_id(id).await
    }

    /// Lookups trim their input the same way `register` does.
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.users.find_by_username(username.trim()).await
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.users.find_by_email(email.trim()).await
    }

    pub async fn list_all(&self) -> AppResult<Vec<User>> {
        self.users.list_all().await
    }

    pub async fn count(&self) -> AppResult<u64> {
        self.users.count().await
    }

    /// Persists `user` with a fresh `updated_at`. Username and email are not
    /// re-checked here.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn update(&self, mut user: User) -> AppResult<User> {
        user.updated_at = OffsetDateTime::now_utc();
        if !self.users.update(&user).await? {
            return Err(AppError::not_found(format!("user {}", user.id)));
        }
        Ok(user)
    }

    /// Removes the user and every detection record it owns. Deleting an
    /// unknown id is a no-op.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if self.users.delete(id).await? {
            info!(user_id = %id, "user deleted");
        } else {
            debug!(user_id = %id, "delete of unknown user ignored");
        }
        Ok(())
    }
}
