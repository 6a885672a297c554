use std::sync::Arc;

use crate::DomainResult;
use crate::activity::{Activity, ActivityChanges, ActivityStatus};
use crate::jobs::{ExpirationSweepMode, SweepReport};
use crate::ports::store::{
    Document, DocumentQuery, DocumentStore, FieldFilter, TransactionFn, merge_into,
};

pub const ACTIVITIES: &str = "activities";

const SWEEP_PAGE_SIZE: usize = 500;

/// Result of a transactional update.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionOutcome {
    /// The snapshot read inside the transaction with exactly the written
    /// fields merged in. Storage is not read again after the write.
    pub activity: Activity,
    pub applied: bool,
}

/// Maps activity operations onto the document store.
#[derive(Clone)]
pub struct ActivityRepository {
    store: Arc<dyn DocumentStore>,
}

impl ActivityRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, activity: &Activity) -> DomainResult<()> {
        self.store
            .set(ACTIVITIES, &activity.id, activity.to_document()?)
            .await
    }

    pub async fn get(&self, id: &str) -> DomainResult<Option<Activity>> {
        self.store
            .get(ACTIVITIES, id)
            .await?
            .map(|document| Activity::from_document(id, &document))
            .transpose()
    }

    pub async fn delete(&self, id: &str) -> DomainResult<()> {
        self.store.delete(ACTIVITIES, id).await
    }

    /// Runs `transition` against the latest stored snapshot inside a
    /// single-document transaction and writes back only the changed fields.
    pub async fn update_transactional<F>(
        &self,
        id: &str,
        transition: F,
    ) -> DomainResult<TransactionOutcome>
    where
        F: Fn(&Activity) -> Option<ActivityChanges> + Send + Sync + 'static,
    {
        let document_id = id.to_string();
        let apply: TransactionFn = Arc::new(move |snapshot: &Document| {
            let activity = Activity::from_document(&document_id, snapshot).ok()?;
            transition(&activity)
                .filter(|changes| !changes.is_empty())
                .map(ActivityChanges::into_document)
        });
        let commit = self.store.transact(ACTIVITIES, id, apply).await?;

        let mut merged = commit.snapshot;
        let applied = match commit.written.as_ref() {
            Some(written) => {
                merge_into(&mut merged, written);
                true
            }
            None => false,
        };
        Ok(TransactionOutcome {
            activity: Activity::from_document(id, &merged)?,
            applied,
        })
    }

    /// One store page in id order. Callers own the post-filtering.
    pub async fn query(&self, query: &DocumentQuery) -> DomainResult<Vec<Activity>> {
        let rows = self.store.query(ACTIVITIES, query).await?;
        rows.iter()
            .map(|row| Activity::from_document(&row.id, &row.data))
            .collect()
    }

    pub async fn list_by_creator(
        &self,
        creator_id: &str,
        limit: Option<usize>,
        start_after: Option<String>,
    ) -> DomainResult<Vec<Activity>> {
        let mut query = DocumentQuery::new()
            .filter(FieldFilter::eq("creatorId", creator_id))
            .start_after(start_after);
        query.limit = limit;
        self.query(&query).await
    }

    pub async fn list_by_participant(&self, user_id: &str) -> DomainResult<Vec<Activity>> {
        let query =
            DocumentQuery::new().filter(FieldFilter::array_contains("participants", user_id));
        self.query(&query).await
    }

    pub async fn list_by_pending_request(&self, user_id: &str) -> DomainResult<Vec<Activity>> {
        let query =
            DocumentQuery::new().filter(FieldFilter::array_contains("joinRequests", user_id));
        self.query(&query).await
    }

    /// Activities owned by `creator_id` with at least one pending request.
    pub async fn list_pending_approvals(&self, creator_id: &str) -> DomainResult<Vec<Activity>> {
        let query = DocumentQuery::new()
            .filter(FieldFilter::eq("creatorId", creator_id))
            .filter(FieldFilter::not_empty("joinRequests"));
        self.query(&query).await
    }

    /// Marks every AVAILABLE activity dated strictly before `now_ms` as
    /// EXPIRED. `scanned` counts all AVAILABLE activities examined.
    pub async fn expire_activities(
        &self,
        now_ms: i64,
        mode: ExpirationSweepMode,
    ) -> DomainResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor: Option<String> = None;
        let mut candidates = Vec::new();

        loop {
            let query = DocumentQuery::new()
                .filter(FieldFilter::eq("status", ActivityStatus::Available.as_str()))
                .start_after(cursor.take())
                .limit(SWEEP_PAGE_SIZE);
            let page = self.query(&query).await?;
            report.scanned += page.len();
            let full_page = page.len() == SWEEP_PAGE_SIZE;
            cursor = page.last().map(|activity| activity.id.clone());
            candidates.extend(
                page.into_iter()
                    .filter(|activity| activity.expire(now_ms).is_some())
                    .map(|activity| activity.id),
            );
            if !full_page {
                break;
            }
        }

        match mode {
            ExpirationSweepMode::Batch => {
                let changes = ActivityChanges::new()
                    .status(ActivityStatus::Expired)
                    .into_document();
                report.expired = candidates.len();
                let updates = candidates
                    .into_iter()
                    .map(|id| (id, changes.clone()))
                    .collect::<Vec<_>>();
                if !updates.is_empty() {
                    self.store.batch_update(ACTIVITIES, updates).await?;
                }
            }
            ExpirationSweepMode::Transactional => {
                for id in candidates {
                    let outcome = match self
                        .update_transactional(&id, move |activity| activity.expire(now_ms))
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(crate::error::DomainError::NotFound) => continue,
                        Err(err) => return Err(err),
                    };
                    if outcome.applied {
                        report.expired += 1;
                    }
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            expired = report.expired,
            mode = mode.as_str(),
            cutoff = %crate::util::format_ms_rfc3339(now_ms),
            "expiration sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityType, GeoPoint, SkillLevel};
    use crate::store::InMemoryDocumentStore;

    fn activity(id: &str, date_time_ms: i64, status: ActivityStatus) -> Activity {
        Activity {
            id: id.into(),
            activity_name: format!("activity {id}"),
            sport: "tennis".into(),
            description: "doubles".into(),
            place_name: "Kallang".into(),
            banner_image_url: String::new(),
            activity_type: ActivityType::Event,
            skill_level: SkillLevel::Intermediate,
            price: 10,
            location: GeoPoint::new(1.30, 103.87),
            date_time_ms,
            max_participants: 4,
            creator_id: "creator".into(),
            participants: Vec::new(),
            join_requests: Vec::new(),
            status,
        }
    }

    async fn repository_with(activities: &[Activity]) -> ActivityRepository {
        let repository = ActivityRepository::new(Arc::new(InMemoryDocumentStore::new()));
        for activity in activities {
            repository.create(activity).await.unwrap();
        }
        repository
    }

    #[tokio::test]
    async fn transactional_update_returns_snapshot_with_written_fields() {
        let repository =
            repository_with(&[activity("a1", 5_000, ActivityStatus::Available)]).await;
        let outcome = repository
            .update_transactional("a1", |activity| activity.join("u1").ok())
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.activity.join_requests, vec!["u1"]);
        let stored = repository.get("a1").await.unwrap().unwrap();
        assert_eq!(stored, outcome.activity);
    }

    #[tokio::test]
    async fn transactional_noop_reports_fresh_snapshot() {
        let repository = repository_with(&[activity("a1", 5_000, ActivityStatus::Cancelled)]).await;
        let outcome = repository
            .update_transactional("a1", |activity| activity.join("u1").ok())
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.activity.status, ActivityStatus::Cancelled);
    }

    #[tokio::test]
    async fn transactional_update_on_missing_activity_is_not_found() {
        let repository = repository_with(&[]).await;
        let result = repository
            .update_transactional("missing", |activity| activity.join("u1").ok())
            .await;
        assert_eq!(result, Err(crate::error::DomainError::NotFound));
    }

    #[tokio::test]
    async fn sweep_counts_available_and_expires_past_only() {
        for mode in [ExpirationSweepMode::Batch, ExpirationSweepMode::Transactional] {
            let repository = repository_with(&[
                activity("past", 1_000, ActivityStatus::Available),
                activity("future", 9_000, ActivityStatus::Available),
                activity("cancelled", 1_000, ActivityStatus::Cancelled),
            ])
            .await;
            let report = repository.expire_activities(5_000, mode).await.unwrap();
            assert_eq!(report, SweepReport { scanned: 2, expired: 1 });

            let status = |id: &'static str| {
                let repository = repository.clone();
                async move { repository.get(id).await.unwrap().unwrap().status }
            };
            assert_eq!(status("past").await, ActivityStatus::Expired);
            assert_eq!(status("future").await, ActivityStatus::Available);
            assert_eq!(status("cancelled").await, ActivityStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn list_queries_filter_by_membership() {
        let mut joined = activity("a1", 5_000, ActivityStatus::Available);
        joined.participants = vec!["u1".into()];
        let mut requested = activity("a2", 5_000, ActivityStatus::Available);
        requested.join_requests = vec!["u1".into()];
        let mut other = activity("a3", 5_000, ActivityStatus::Available);
        other.creator_id = "someone-else".into();
        let repository = repository_with(&[joined, requested, other]).await;

        let ids = |activities: Vec<Activity>| {
            activities
                .into_iter()
                .map(|activity| activity.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(repository.list_by_participant("u1").await.unwrap()), vec!["a1"]);
        assert_eq!(
            ids(repository.list_by_pending_request("u1").await.unwrap()),
            vec!["a2"]
        );
        assert_eq!(
            ids(repository.list_pending_approvals("creator").await.unwrap()),
            vec!["a2"]
        );
        assert_eq!(
            ids(repository
                .list_by_creator("creator", Some(1), Some("a1".into()))
                .await
                .unwrap()),
            vec!["a2"]
        );
    }
}
