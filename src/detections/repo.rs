use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::detections::dto::DiseaseStatistics;
use crate::detections::repo_types::DetectionRecord;
use crate::error::{from_sqlx, AppResult};

/// Durable collection of detection records.
///
/// Unranked listings return records in insertion order. Ranked listings are
/// newest first, with equal timestamps kept in insertion order. Filtering,
/// ranking and counting happen inside the store.
#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn insert(&self, record: DetectionRecord) -> AppResult<DetectionRecord>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DetectionRecord>>;
    async fn list_all(&self) -> AppResult<Vec<DetectionRecord>>;
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<DetectionRecord>>;
    async fn list_by_disease(&self, disease: &str) -> AppResult<Vec<DetectionRecord>>;
    /// At most `limit` records across all users, newest first.
    async fn list_recent(&self, limit: usize) -> AppResult<Vec<DetectionRecord>>;
    /// At most `limit` of one user's records, newest first.
    async fn list_user_recent(&self, user_id: Uuid, limit: usize)
        -> AppResult<Vec<DetectionRecord>>;
    /// `min <= confidence <= max`, inclusive.
    async fn list_by_confidence_range(&self, min: f64, max: f64)
        -> AppResult<Vec<DetectionRecord>>;
    /// `start <= created_at <= end`, inclusive.
    async fn list_by_time_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<Vec<DetectionRecord>>;
    async fn count_by_user(&self, user_id: Uuid) -> AppResult<u64>;
    async fn count_by_disease(&self) -> AppResult<DiseaseStatistics>;
    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

#[derive(Clone)]
pub struct PgDetectionStore {
    db: PgPool,
}

impl PgDetectionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const RECORD_COLUMNS: &str = "id, user_id, image_path, detected_disease, crop_type, confidence, \
     treatment_method, severity_level, recommendations, created_at";

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl DetectionStore for PgDetectionStore {
    async fn insert(&self, record: DetectionRecord) -> AppResult<DetectionRecord> {
        let sql = format!(
            r#"
            INSERT INTO detection_records
                (id, user_id, image_path, detected_disease, crop_type, confidence,
                 treatment_method, severity_level, recommendations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {RECORD_COLUMNS}
            "#
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.image_path)
            .bind(&record.detected_disease)
            .bind(&record.crop_type)
            .bind(record.confidence)
            .bind(&record.treatment_method)
            .bind(&record.severity_level)
            .bind(&record.recommendations)
            .bind(record.created_at)
            .fetch_one(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "insert detection record"))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<DetectionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM detection_records WHERE id = $1");
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "find detection record"))
    }

    async fn list_all(&self) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM detection_records ORDER BY seq ASC");
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list detection records"))
    }

    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records WHERE user_id = $1 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list detection records by user"))
    }

    async fn list_by_disease(&self, disease: &str) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records \
             WHERE detected_disease = $1 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(disease)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list detection records by disease"))
    }

    async fn list_recent(&self, limit: usize) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records \
             ORDER BY created_at DESC, seq ASC LIMIT $1"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(sql_limit(limit))
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list recent detection records"))
    }

    async fn list_user_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records WHERE user_id = $1 \
             ORDER BY created_at DESC, seq ASC LIMIT $2"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(user_id)
            .bind(sql_limit(limit))
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list recent detection records by user"))
    }

    async fn list_by_confidence_range(
        &self,
        min: f64,
        max: f64,
    ) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records \
             WHERE confidence BETWEEN $1 AND $2 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(min)
            .bind(max)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list detection records by confidence"))
    }

    async fn list_by_time_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<Vec<DetectionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM detection_records \
             WHERE created_at BETWEEN $1 AND $2 ORDER BY seq ASC"
        );
        sqlx::query_as::<_, DetectionRecord>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "list detection records by time"))
    }

    async fn count_by_user(&self, user_id: Uuid) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM detection_records WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await
                .map_err(|e| from_sqlx(e, "count detection records by user"))?;
        Ok(count.max(0) as u64)
    }

    async fn count_by_disease(&self) -> AppResult<DiseaseStatistics> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT detected_disease, COUNT(*) FROM detection_records GROUP BY detected_disease",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| from_sqlx(e, "count detection records by disease"))?;
        Ok(rows
            .into_iter()
            .map(|(disease, n)| (disease, n.max(0) as u64))
            .collect())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let done = sqlx::query("DELETE FROM detection_records WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| from_sqlx(e, "delete detection record"))?;
        Ok(done.rows_affected() > 0)
    }
}
