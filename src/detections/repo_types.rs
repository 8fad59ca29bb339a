use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One disease detection submitted by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_path: String,
    pub detected_disease: String,
    pub crop_type: Option<String>,
    pub confidence: f64, // 0.0..=1.0
    pub treatment_method: Option<String>,
    pub severity_level: Option<String>,
    pub recommendations: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime, // stamped on insert, never changed
}
