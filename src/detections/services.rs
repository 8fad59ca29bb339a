use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::detections::dto::{
    DiseaseStatistics, NewDetection, UserDetectionStats, DEFAULT_HIGH_CONFIDENCE,
    DEFAULT_RECENT_LIMIT,
};
use crate::detections::repo::DetectionStore;
use crate::detections::repo_types::DetectionRecord;
use crate::error::{AppError, AppResult};
use crate::users::UserDirectory;

/// Parses a confidence score given as text. Accepts only finite values in
/// `[0, 1]`.
pub fn parse_confidence(raw: &str) -> AppResult<f64> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::invalid(format!("confidence is not a number: {raw:?}")))?;
    check_confidence(value)?;
    Ok(value)
}

fn check_confidence(value: f64) -> AppResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(AppError::invalid(format!(
            "confidence must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Filtered retrieval, ranking and aggregation over detection records.
#[derive(Clone)]
pub struct DetectionService {
    records: Arc<dyn DetectionStore>,
    users: UserDirectory,
}

impl DetectionService {
    pub fn new(records: Arc<dyn DetectionStore>, users: UserDirectory) -> Self {
        Self { records, users }
    }

    pub async fn list_all(&self) -> AppResult<Vec<DetectionRecord>> {
        self.records.list_all().await
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<DetectionRecord> {
        self.records
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("detection record {id}")))
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<DetectionRecord>> {
        self.records.list_by_user(user_id).await
    }

    /// Most recent records across all users; `None` means one default page.
    pub async fn list_recent(&self, limit: Option<usize>) -> AppResult<Vec<DetectionRecord>> {
        self.records
            .list_recent(limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await
    }

    pub async fn list_user_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<DetectionRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.records.list_user_recent(user_id, limit).await
    }

    pub async fn list_by_disease(&self, disease: &str) -> AppResult<Vec<DetectionRecord>> {
        self.records.list_by_disease(disease).await
    }

    /// Records with `min <= confidence <= max`. An inverted range or a NaN
    /// bound is empty; the bounds are never swapped.
    pub async fn list_by_confidence_range(
        &self,
        min: f64,
        max: f64,
    ) -> AppResult<Vec<DetectionRecord>> {
        if min.is_nan() || max.is_nan() || min > max {
            return Ok(Vec::new());
        }
        self.records.list_by_confidence_range(min, max).await
    }

    pub async fn list_high_confidence(
        &self,
        threshold: Option<f64>,
    ) -> AppResult<Vec<DetectionRecord>> {
        self.list_by_confidence_range(threshold.unwrap_or(DEFAULT_HIGH_CONFIDENCE), 1.0)
            .await
    }

    /// Records created within `[start, end]`; empty when `start > end`.
    pub async fn list_by_time_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> AppResult<Vec<DetectionRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        self.records.list_by_time_range(start, end).await
    }

    pub async fn count_by_user(&self, user_id: Uuid) -> AppResult<u64> {
        self.records.count_by_user(user_id).await
    }

    pub async fn user_statistics(&self, user_id: Uuid) -> AppResult<UserDetectionStats> {
        Ok(UserDetectionStats {
            user_id,
            total_detections: self.count_by_user(user_id).await?,
        })
    }

    pub async fn disease_statistics(&self) -> AppResult<DiseaseStatistics> {
        self.records.count_by_disease().await
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create(&self, input: NewDetection) -> AppResult<DetectionRecord> {
        check_confidence(input.confidence)?;
        if input.detected_disease.trim().is_empty() {
            return Err(AppError::invalid("detected disease must not be blank"));
        }
        if input.image_path.trim().is_empty() {
            return Err(AppError::invalid("image path must not be blank"));
        }
        if self.users.find_by_id(input.user_id).await?.is_none() {
            warn!("detection submitted for unknown user");
            return Err(AppError::not_found(format!("user {}", input.user_id)));
        }

        let record = DetectionRecord {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            image_path: input.image_path,
            detected_disease: input.detected_disease,
            crop_type: input.crop_type,
            confidence: input.confidence,
            treatment_method: input.treatment_method,
            severity_level: input.severity_level,
            recommendations: input.recommendations,
            created_at: OffsetDateTime::now_utc(),
        };
        let record = self.records.insert(record).await?;
        info!(record_id = %record.id, disease = %record.detected_disease, "detection recorded");
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        if !self.records.delete(id).await? {
            return Err(AppError::not_found(format!("detection record {id}")));
        }
        info!(record_id = %id, "detection deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::state::AppState;
    use time::Duration;

    struct Fixture {
        state: AppState,
        user: Uuid,
        base: OffsetDateTime,
    }

    impl Fixture {
        async fn new() -> Self {
            let state = AppState::fake();
            let user = state
                .users
                .register("grower", "pw", "grower@example.com", None)
                .await
                .expect("register")
                .id;
            Self {
                state,
                user,
                base: OffsetDateTime::now_utc(),
            }
        }

        /// Seeds the store directly so timestamps can be controlled.
        async fn seed(
            &self,
            user_id: Uuid,
            disease: &str,
            confidence: f64,
            minutes: i64,
        ) -> DetectionRecord {
            let record = DetectionRecord {
                id: Uuid::new_v4(),
                user_id,
                image_path: format!("uploads/{disease}.jpg"),
                detected_disease: disease.to_string(),
                crop_type: Some("tomato".into()),
                confidence,
                treatment_method: None,
                severity_level: None,
                recommendations: None,
                created_at: self.base + Duration::minutes(minutes),
            };
            self.state
                .detection_store
                .insert(record)
                .await
                .expect("seed insert")
        }

        fn svc(&self) -> &DetectionService {
            &self.state.detections
        }
    }

    fn new_detection(user_id: Uuid, confidence: f64) -> NewDetection {
        NewDetection {
            user_id,
            image_path: "uploads/leaf.jpg".into(),
            detected_disease: "late_blight".into(),
            confidence,
            recommendations: Some("remove infected leaves".into()),
            ..Default::default()
        }
    }

    #[test]
    fn parse_confidence_rejects_garbage() {
        assert_eq!(parse_confidence(" 0.5 ").expect("valid"), 0.5);
        for raw in ["abc", "", "1.01", "-0.1", "NaN", "inf"] {
            let err = parse_confidence(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{raw}");
        }
    }

    #[tokio::test]
    async fn high_confidence_example() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "rust", 0.65, 0).await;
        let b = fx.seed(fx.user, "rust", 0.82, 1).await;
        let c = fx.seed(fx.user, "blight", 0.91, 2).await;

        let ids: Vec<_> = fx
            .svc()
            .list_high_confidence(None)
            .await
            .expect("query")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b.id, c.id]);
    }

    #[tokio::test]
    async fn confidence_range_is_closed() {
        let fx = Fixture::new().await;
        for (i, c) in [0.1, 0.3, 0.5, 0.7, 0.9].into_iter().enumerate() {
            fx.seed(fx.user, "mildew", c, i as i64).await;
        }
        let hits = fx
            .svc()
            .list_by_confidence_range(0.3, 0.7)
            .await
            .expect("query");
        let confidences: Vec<f64> = hits.iter().map(|r| r.confidence).collect();
        assert_eq!(confidences, vec![0.3, 0.5, 0.7]);
    }

    #[tokio::test]
    async fn inverted_confidence_range_is_empty() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "mildew", 0.5, 0).await;
        let hits = fx
            .svc()
            .list_by_confidence_range(0.9, 0.1)
            .await
            .expect("query");
        assert!(hits.is_empty());
        for (min, max) in [(f64::NAN, 1.0), (0.0, f64::NAN)] {
            let hits = fx
                .svc()
                .list_by_confidence_range(min, max)
                .await
                .expect("query");
            assert!(hits.is_empty());
        }
    }

    #[tokio::test]
    async fn user_recent_orders_newest_first_and_truncates() {
        let fx = Fixture::new().await;
        let other = fx
            .state
            .users
            .register("neighbour", "pw", "n@example.com", None)
            .await
            .expect("register")
            .id;
        let oldest = fx.seed(fx.user, "rust", 0.5, 0).await;
        let newest = fx.seed(fx.user, "rust", 0.5, 10).await;
        let middle = fx.seed(fx.user, "rust", 0.5, 5).await;
        fx.seed(other, "rust", 0.5, 20).await;

        let two = fx.svc().list_user_recent(fx.user, 2).await.expect("query");
        assert_eq!(
            two.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![newest.id, middle.id]
        );

        let all = fx.svc().list_user_recent(fx.user, 10).await.expect("query");
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, oldest.id);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let owned = fx.svc().list_by_user(fx.user).await.expect("query");
        assert!(all.iter().all(|r| owned.contains(r)));

        assert!(fx
            .svc()
            .list_user_recent(fx.user, 0)
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn recent_ties_keep_insertion_order() {
        let fx = Fixture::new().await;
        let first = fx.seed(fx.user, "a", 0.5, 3).await;
        let second = fx.seed(fx.user, "b", 0.5, 3).await;
        let older = fx.seed(fx.user, "c", 0.5, 1).await;

        for _ in 0..3 {
            let ids: Vec<_> = fx
                .svc()
                .list_recent(None)
                .await
                .expect("query")
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, vec![first.id, second.id, older.id]);
        }
    }

    #[tokio::test]
    async fn recent_without_limit_is_one_page() {
        let fx = Fixture::new().await;
        for i in 0..(DEFAULT_RECENT_LIMIT as i64 + 5) {
            fx.seed(fx.user, "spot", 0.4, i).await;
        }
        let page = fx.svc().list_recent(None).await.expect("query");
        assert_eq!(page.len(), DEFAULT_RECENT_LIMIT);
        assert_eq!(fx.svc().list_recent(Some(3)).await.expect("query").len(), 3);
    }

    #[tokio::test]
    async fn disease_statistics_sum_to_total() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "rust", 0.5, 0).await;
        fx.seed(fx.user, "rust", 0.6, 1).await;
        fx.seed(fx.user, "blight", 0.7, 2).await;

        let stats = fx.svc().disease_statistics().await.expect("stats");
        assert_eq!(stats.get("rust"), Some(&2));
        assert_eq!(stats.get("blight"), Some(&1));
        let total = fx.svc().list_all().await.expect("all").len() as u64;
        assert_eq!(stats.values().sum::<u64>(), total);
    }

    #[tokio::test]
    async fn disease_filter_is_exact() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "Late Blight", 0.5, 0).await;
        fx.seed(fx.user, "late blight", 0.5, 1).await;
        let hits = fx.svc().list_by_disease("Late Blight").await.expect("query");
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn time_range_filter() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "a", 0.5, 0).await;
        let inside = fx.seed(fx.user, "b", 0.5, 10).await;
        fx.seed(fx.user, "c", 0.5, 20).await;

        let from = fx.base + Duration::minutes(5);
        let to = fx.base + Duration::minutes(10);
        let hits = fx.svc().list_by_time_range(from, to).await.expect("query");
        assert_eq!(hits, vec![inside]);
        assert!(fx
            .svc()
            .list_by_time_range(to, from)
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn count_by_user_is_zero_for_unknown_user() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "a", 0.5, 0).await;
        assert_eq!(fx.svc().count_by_user(fx.user).await.expect("count"), 1);
        assert_eq!(
            fx.svc().count_by_user(Uuid::new_v4()).await.expect("count"),
            0
        );
        let stats = fx.svc().user_statistics(fx.user).await.expect("stats");
        assert_eq!(stats.total_detections, 1);
    }

    #[tokio::test]
    async fn create_stamps_time_and_persists() {
        let fx = Fixture::new().await;
        let before = OffsetDateTime::now_utc();
        let record = fx
            .svc()
            .create(new_detection(fx.user, 0.93))
            .await
            .expect("create");
        assert!(record.created_at >= before);
        assert_eq!(record.detected_disease, "late_blight");
        let stored = fx.svc().find_by_id(record.id).await.expect("find");
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn create_for_unknown_user_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx
            .svc()
            .create(new_detection(Uuid::new_v4(), 0.5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(fx.svc().list_all().await.expect("all").is_empty());
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_confidence() {
        let fx = Fixture::new().await;
        for c in [1.2, -0.01, f64::NAN] {
            let err = fx
                .svc()
                .create(new_detection(fx.user, c))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert!(fx.svc().list_all().await.expect("all").is_empty());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found_every_time() {
        let fx = Fixture::new().await;
        let id = Uuid::new_v4();
        for _ in 0..2 {
            let err = fx.svc().delete(id).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }

    #[tokio::test]
    async fn delete_removes_exactly_one_record() {
        let fx = Fixture::new().await;
        let a = fx.seed(fx.user, "a", 0.5, 0).await;
        let b = fx.seed(fx.user, "b", 0.5, 1).await;
        fx.svc().delete(a.id).await.expect("delete");
        assert_eq!(fx.svc().list_all().await.expect("all"), vec![b]);
        assert_eq!(
            fx.svc().find_by_id(a.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_their_records() {
        let fx = Fixture::new().await;
        fx.seed(fx.user, "a", 0.5, 0).await;
        fx.seed(fx.user, "b", 0.5, 1).await;
        fx.state.users.delete(fx.user).await.expect("delete user");
        assert!(fx.svc().list_by_user(fx.user).await.expect("query").is_empty());
    }
}
