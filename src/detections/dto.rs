use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Input for a new detection record. The creation time is never taken from
/// the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDetection {
    pub user_id: Uuid,
    pub image_path: String,
    pub detected_disease: String,
    pub confidence: f64,
    pub recommendations: Option<String>,
    #[serde(default)]
    pub crop_type: Option<String>,
    #[serde(default)]
    pub treatment_method: Option<String>,
    #[serde(default)]
    pub severity_level: Option<String>,
}

/// Record count per detected disease label.
pub type DiseaseStatistics = BTreeMap<String, u64>;

#[derive(Debug, Clone, Serialize)]
pub struct UserDetectionStats {
    pub user_id: Uuid,
    pub total_detections: u64,
}

pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const DEFAULT_HIGH_CONFIDENCE: f64 = 0.8;
