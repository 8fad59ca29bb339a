use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::detections::memory::MemoryDetectionStore;
use crate::error::{AppError, AppResult};
use crate::users::repo::UserStore;
use crate::users::repo_types::User;

/// In-process user store. Uniqueness is enforced under a single write lock,
/// mirroring the unique indexes of the database schema. When linked to a
/// detection store, deleting a user drops their records under both locks.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
    detections: Option<Arc<MemoryDetectionStore>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Arc<MemoryDetectionStore>) -> Self {
        Self {
            users: RwLock::default(),
            detections: Some(detections),
        }
    }
}

fn check_unique(users: &[User], candidate: &User) -> AppResult<()> {
    let others = users.iter().filter(|u| u.id != candidate.id);
    for u in others {
        if u.username == candidate.username {
            return Err(AppError::conflict("username already exists"));
        }
        if u.email == candidate.email {
            return Err(AppError::conflict("email already registered"));
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: User) -> AppResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.id == user.id) {
            return Err(AppError::conflict("duplicate value"));
        }
        check_unique(&users, &user)?;
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_all(&self) -> AppResult<Vec<User>> {
        Ok(self.users.read().await.clone())
    }

    async fn update(&self, user: &User) -> AppResult<bool> {
        let mut users = self.users.write().await;
        check_unique(&users, user)?;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut users = self.users.write().await;
        let Some(pos) = users.iter().position(|u| u.id == id) else {
            return Ok(false);
        };
        if let Some(detections) = &self.detections {
            detections
                .write_records()
                .await
                .retain(|r| r.user_id != id);
        }
        users.remove(pos);
        Ok(true)
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.users.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::repo::DetectionStore;
    use crate::detections::repo_types::DetectionRecord;
    use crate::error::ErrorKind;
    use time::OffsetDateTime;

    fn user(username: &str, email: &str) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            real_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(user_id: Uuid) -> DetectionRecord {
        DetectionRecord {
            id: Uuid::new_v4(),
            user_id,
            image_path: "uploads/leaf.jpg".into(),
            detected_disease: "rust".into(),
            crop_type: None,
            confidence: 0.7,
            treatment_method: None,
            severity_level: None,
            recommendations: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_taken_username_or_email() {
        let store = MemoryUserStore::new();
        store.insert(user("ann", "ann@example.com")).await.expect("insert");

        let err = store
            .insert(user("ann", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = store
            .insert(user("other", "ann@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn update_into_a_taken_name_is_conflict_and_keeps_the_row() {
        let store = MemoryUserStore::new();
        store.insert(user("ann", "ann@example.com")).await.expect("insert");
        let ben = store
            .insert(user("ben", "ben@example.com"))
            .await
            .expect("insert");

        let mut renamed = ben.clone();
        renamed.username = "ann".into();
        assert_eq!(
            store.update(&renamed).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        let mut rehomed = ben.clone();
        rehomed.email = "ann@example.com".into();
        assert_eq!(
            store.update(&rehomed).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let stored = store.find_by_id(ben.id).await.expect("find").expect("present");
        assert_eq!(stored, ben);

        let mut same = ben.clone();
        same.real_name = Some("Ben".into());
        assert!(store.update(&same).await.expect("update own row"));
    }

    #[tokio::test]
    async fn delete_drops_the_user_and_only_their_records() {
        let records = Arc::new(MemoryDetectionStore::new());
        let store = MemoryUserStore::with_detections(records.clone());
        let ann = store.insert(user("ann", "ann@example.com")).await.expect("insert");
        let ben = store.insert(user("ben", "ben@example.com")).await.expect("insert");
        records.insert(record(ann.id)).await.expect("insert");
        records.insert(record(ann.id)).await.expect("insert");
        let kept = records.insert(record(ben.id)).await.expect("insert");

        assert!(store.delete(ann.id).await.expect("delete"));
        assert!(store.find_by_id(ann.id).await.expect("find").is_none());
        assert_eq!(records.list_all().await.expect("all"), vec![kept]);

        assert!(!store.delete(ann.id).await.expect("second delete"));
    }
}
