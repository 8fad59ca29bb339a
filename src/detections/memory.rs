use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{RwLock, RwLockWriteGuard};
use uuid::Uuid;

use crate::detections::dto::DiseaseStatistics;
use crate::detections::repo::DetectionStore;
use crate::detections::repo_types::DetectionRecord;
use crate::error::{AppError, AppResult};

/// In-process detection store; the backing `Vec` keeps insertion order.
#[derive(Default)]
pub struct MemoryDetectionStore {
    records: RwLock<Vec<DetectionRecord>>,
}

/// Newest first. `sort_by` is stable, so equal timestamps keep store order.
fn newest_first(records: &mut [DetectionRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for operations that span stores, such as removing a
    /// user together with their records.
    pub(crate) async fn write_records(&self) -> RwLockWriteGuard<'_, Vec<DetectionRecord>> {
        self.records.write().await
    }

    async fn filtered<F>(&self, keep: F) -> Vec<DetectionRecord>
    where
        F: Fn(&DetectionRecord) -> bool,
    {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    async fn ranked<F>(&self, keep: F, limit: usize) -> Vec<DetectionRecord>
    where
        F: Fn(&DetectionRecord) -> bool,
    {
        let mut records = self.filtered(keep).await;
        newest_first(&mut records);
        records.truncate(limit);
        records
    }
}

#[async_trait]
impl DetectionStore for MemoryDetectionStore {
    async fn insert(&self, record: DetectionRecord) -> AppResult<DetectionRecord> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(AppError::conflict("duplicate value"));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DetectionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_all(&self) -> AppResult<Vec<DetectionRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<DetectionRecord>> {
        Ok(self.filtered(|r| r.user_id == user_id).await)
    }

    async fn list_by_disease(&self, disease: &str) -> AppResult<Vec<DetectionRecord>> {
        Ok(self.filtered(|r| r.detected_disease == disease).await)
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<DetectionRecord>> {
        Ok(self.ranked(|_| true, limit).await)
    }

    async fn list_user_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<DetectionRecord>> {
        Ok(self.ranked(|r| r.user_id == user_id, limit).await)
    }

    async fn list_by_confidence_range(
        &self,
        min: f64,
        max: f64,
    ) -> AppResult<Vec<DetectionRecord>> {
        Ok(self
            .filtered(|r| min <= r.confidence && r.confidence <= max)
            .await)
    }

    async fn list_by_time_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<Vec<DetectionRecord>> {
        Ok(self
            .filtered(|r| start <= r.created_at && r.created_at <= end)
            .await)
    }

    async fn count_by_user(&self, user_id: Uuid) -> AppResult<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| r.user_id == user_id).count() as u64)
    }

    async fn count_by_disease(&self) -> AppResult<DiseaseStatistics> {
        let mut stats = DiseaseStatistics::new();
        for record in self.records.read().await.iter() {
            *stats.entry(record.detected_disease.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}
