use std::sync::Arc;

use crate::DomainResult;
use crate::activity::{Activity, ActivityChanges, ActivityPatch, NewActivity, new_activity_id};
use crate::activity_repository::ActivityRepository;
use crate::alerts::{ActivityRef, AlertEvent};
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::jobs::{ExpirationSweepMode, SweepReport, now_ms};
use crate::ports::alerts::AlertDispatcher;
use crate::search::{DEFAULT_SEARCH_LIMIT, SearchFilter, SearchPage};

#[derive(Clone, Debug)]
pub struct ActivityServiceConfig {
    pub search_default_limit: usize,
    pub sweep_mode: ExpirationSweepMode,
}

impl Default for ActivityServiceConfig {
    fn default() -> Self {
        Self {
            search_default_limit: DEFAULT_SEARCH_LIMIT,
            sweep_mode: ExpirationSweepMode::Batch,
        }
    }
}

#[derive(Clone)]
pub struct ActivityService {
    repository: ActivityRepository,
    alerts: Arc<dyn AlertDispatcher>,
    config: ActivityServiceConfig,
}

impl ActivityService {
    pub fn new(
        repository: ActivityRepository,
        alerts: Arc<dyn AlertDispatcher>,
        config: ActivityServiceConfig,
    ) -> Self {
        Self {
            repository,
            alerts,
            config,
        }
    }

    pub fn repository(&self) -> &ActivityRepository {
        &self.repository
    }

    pub async fn create_activity(
        &self,
        actor: &ActorIdentity,
        input: NewActivity,
    ) -> DomainResult<Activity> {
        let input = input.validate()?;
        let id = new_activity_id(&actor.user_id, now_ms());
        let activity = input.into_activity(id, actor.user_id.clone());
        self.repository.create(&activity).await?;
        tracing::info!(
            activity_id = %activity.id,
            creator_id = %activity.creator_id,
            "activity created"
        );
        Ok(activity)
    }

    pub async fn get_activity(&self, id: &str) -> DomainResult<Activity> {
        self.repository.get(id).await?.ok_or(DomainError::NotFound)
    }

    pub async fn update_activity(
        &self,
        id: &str,
        patch: ActivityPatch,
        actor: &ActorIdentity,
    ) -> DomainResult<Activity> {
        let patch = patch.validate()?;
        let fields: Vec<String> = patch
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let actor_id = actor.user_id.clone();
        let updated = self
            .transition(id, "update", move |activity| {
                activity.apply_patch(&patch, &actor_id)
            })
            .await?;
        self.notify(AlertEvent::ActivityUpdated {
            activity: ActivityRef::from(&updated),
            recipients: updated.participants.clone(),
            fields,
        })
        .await;
        Ok(updated)
    }

    pub async fn delete_activity(&self, id: &str, actor: &ActorIdentity) -> DomainResult<()> {
        let activity = self.get_activity(id).await?;
        activity.ensure_creator(&actor.user_id, "Not authorized to delete this activity")?;
        self.repository.delete(id).await?;
        tracing::info!(activity_id = %id, "activity deleted");
        Ok(())
    }

    pub async fn join(&self, id: &str, actor: &ActorIdentity) -> DomainResult<Activity> {
        let user_id = actor.user_id.clone();
        let activity = self
            .transition(id, "join", move |activity| activity.join(&user_id))
            .await?;
        self.notify(AlertEvent::JoinRequested {
            activity: ActivityRef::from(&activity),
            requester_id: actor.user_id.clone(),
        })
        .await;
        Ok(activity)
    }

    pub async fn cancel_join_request(
        &self,
        id: &str,
        actor: &ActorIdentity,
    ) -> DomainResult<Activity> {
        let user_id = actor.user_id.clone();
        let activity = self
            .transition(id, "cancel_join_request", move |activity| {
                activity.cancel_join_request(&user_id)
            })
            .await?;
        self.notify(AlertEvent::JoinRequestWithdrawn {
            activity: ActivityRef::from(&activity),
            requester_id: actor.user_id.clone(),
        })
        .await;
        Ok(activity)
    }

    pub async fn approve(
        &self,
        id: &str,
        user_id: &str,
        actor: &ActorIdentity,
    ) -> DomainResult<Activity> {
        let (target, actor_id) = (user_id.to_string(), actor.user_id.clone());
        let activity = self
            .transition(id, "approve", move |activity| {
                activity.approve(&target, &actor_id)
            })
            .await?;
        self.notify(AlertEvent::RequestApproved {
            activity: ActivityRef::from(&activity),
            user_id: user_id.to_string(),
        })
        .await;
        Ok(activity)
    }

    pub async fn reject(
        &self,
        id: &str,
        user_id: &str,
        actor: &ActorIdentity,
    ) -> DomainResult<Activity> {
        let (target, actor_id) = (user_id.to_string(), actor.user_id.clone());
        let activity = self
            .transition(id, "reject", move |activity| {
                activity.reject(&target, &actor_id)
            })
            .await?;
        self.notify(AlertEvent::RequestRejected {
            activity: ActivityRef::from(&activity),
            user_id: user_id.to_string(),
        })
        .await;
        Ok(activity)
    }

    pub async fn remove_participant(
        &self,
        id: &str,
        user_id: &str,
        actor: &ActorIdentity,
    ) -> DomainResult<Activity> {
        let (target, actor_id) = (user_id.to_string(), actor.user_id.clone());
        let activity = self
            .transition(id, "remove_participant", move |activity| {
                activity.remove_participant(&target, &actor_id)
            })
            .await?;
        self.notify(AlertEvent::ParticipantRemoved {
            activity: ActivityRef::from(&activity),
            user_id: user_id.to_string(),
        })
        .await;
        Ok(activity)
    }

    pub async fn leave(&self, id: &str, actor: &ActorIdentity) -> DomainResult<Activity> {
        let user_id = actor.user_id.clone();
        let activity = self
            .transition(id, "leave", move |activity| activity.leave(&user_id))
            .await?;
        self.notify(AlertEvent::ParticipantLeft {
            activity: ActivityRef::from(&activity),
            user_id: actor.user_id.clone(),
        })
        .await;
        Ok(activity)
    }

    pub async fn cancel(&self, id: &str, actor: &ActorIdentity) -> DomainResult<Activity> {
        let actor_id = actor.user_id.clone();
        let activity = self
            .transition(id, "cancel", move |activity| activity.cancel(&actor_id))
            .await?;
        self.notify(AlertEvent::ActivityCancelled {
            activity: ActivityRef::from(&activity),
            recipients: activity.participants.clone(),
        })
        .await;
        Ok(activity)
    }

    /// One page of search results. The cursor advances over every scanned
    /// document, including the ones the post-filters dropped.
    pub async fn search(&self, filter: SearchFilter) -> DomainResult<SearchPage> {
        let query = filter.store_query(self.config.search_default_limit);
        let limit = query.limit.unwrap_or(self.config.search_default_limit);
        let scanned = self.repository.query(&query).await?;
        let next_cursor = if scanned.len() == limit {
            scanned.last().map(|activity| activity.id.clone())
        } else {
            None
        };
        let items = scanned
            .into_iter()
            .filter(|activity| filter.accepts(activity))
            .collect();
        Ok(SearchPage { items, next_cursor })
    }

    /// Upcoming activities first (latest first), then past ones (oldest first).
    pub async fn list_by_creator(
        &self,
        actor: &ActorIdentity,
        limit: Option<usize>,
        start_after: Option<String>,
    ) -> DomainResult<Vec<Activity>> {
        let mut activities = self
            .repository
            .list_by_creator(&actor.user_id, limit, start_after)
            .await?;
        order_upcoming_first(&mut activities, now_ms());
        Ok(activities)
    }

    pub async fn list_by_participant(&self, actor: &ActorIdentity) -> DomainResult<Vec<Activity>> {
        self.repository.list_by_participant(&actor.user_id).await
    }

    pub async fn list_by_pending_request(
        &self,
        actor: &ActorIdentity,
    ) -> DomainResult<Vec<Activity>> {
        self.repository.list_by_pending_request(&actor.user_id).await
    }

    pub async fn list_pending_approvals(
        &self,
        actor: &ActorIdentity,
    ) -> DomainResult<Vec<Activity>> {
        self.repository.list_pending_approvals(&actor.user_id).await
    }

    pub async fn run_expiration_sweep(&self) -> DomainResult<SweepReport> {
        self.repository
            .expire_activities(now_ms(), self.config.sweep_mode)
            .await
    }

    /// Pre-checks against a freshly loaded snapshot, then re-runs the same
    /// check inside the transaction. A no-op transaction means the snapshot
    /// moved underneath us; the fresh snapshot then explains why.
    async fn transition<F>(
        &self,
        id: &str,
        operation: &'static str,
        check: F,
    ) -> DomainResult<Activity>
    where
        F: Fn(&Activity) -> DomainResult<ActivityChanges> + Clone + Send + Sync + 'static,
    {
        let current = self.get_activity(id).await?;
        check(&current)?;

        let in_transaction = check.clone();
        let outcome = self
            .repository
            .update_transactional(id, move |snapshot| in_transaction(snapshot).ok())
            .await?;
        if !outcome.applied {
            check(&outcome.activity)?;
            return Err(DomainError::Conflict);
        }

        tracing::info!(activity_id = %id, operation, "activity transition applied");
        Ok(outcome.activity)
    }

    async fn notify(&self, event: AlertEvent) {
        let kind = event.kind();
        let activity_id = event.activity().id.clone();
        if let Err(err) = self.alerts.dispatch(event).await {
            tracing::warn!(
                activity_id = %activity_id,
                event = kind,
                error = %err,
                "alert dispatch failed"
            );
        }
    }
}

fn order_upcoming_first(activities: &mut [Activity], now_ms: i64) {
    activities.sort_by_key(|activity| {
        let past = activity.date_time_ms < now_ms;
        let key = if past {
            activity.date_time_ms
        } else {
            -activity.date_time_ms
        };
        (past, key)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityStatus, ActivityType, GeoPoint, SkillLevel};
    use crate::ports::BoxFuture;
    use crate::store::InMemoryDocumentStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        events: Mutex<Vec<AlertEvent>>,
    }

    impl AlertDispatcher for RecordingDispatcher {
        fn dispatch(&self, event: AlertEvent) -> BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move {
                self.events.lock().await.push(event);
                Ok(())
            })
        }
    }

    struct FailingDispatcher;

    impl AlertDispatcher for FailingDispatcher {
        fn dispatch(&self, _event: AlertEvent) -> BoxFuture<'_, DomainResult<()>> {
            Box::pin(async { Err(DomainError::Store("alerts offline".into())) })
        }
    }

    fn new_activity(max_participants: u32) -> NewActivity {
        NewActivity {
            activity_name: "Morning run".into(),
            sport: "running".into(),
            description: "easy 5k".into(),
            place_name: "MacRitchie".into(),
            banner_image_url: String::new(),
            activity_type: ActivityType::Event,
            skill_level: SkillLevel::Beginner,
            price: 0,
            location: GeoPoint::new(1.34, 103.83),
            date_time_ms: now_ms() + 86_400_000,
            max_participants,
        }
    }

    fn service(alerts: Arc<dyn AlertDispatcher>) -> ActivityService {
        let repository = ActivityRepository::new(Arc::new(InMemoryDocumentStore::new()));
        ActivityService::new(repository, alerts, ActivityServiceConfig::default())
    }

    #[tokio::test]
    async fn create_starts_available_with_empty_collections() {
        let service = service(Arc::new(RecordingDispatcher::default()));
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(3))
            .await
            .unwrap();
        assert!(activity.id.starts_with("creator_"));
        assert_eq!(activity.status, ActivityStatus::Available);
        assert!(activity.participants.is_empty());
        assert!(activity.join_requests.is_empty());
        assert_eq!(service.get_activity(&activity.id).await.unwrap(), activity);
    }

    #[tokio::test]
    async fn create_rejects_invalid_input() {
        let service = service(Arc::new(RecordingDispatcher::default()));
        let mut input = new_activity(0);
        assert!(matches!(
            service
                .create_activity(&ActorIdentity::user("creator"), input.clone())
                .await,
            Err(DomainError::Validation(_))
        ));
        input.max_participants = 2;
        input.sport = "  ".into();
        assert!(matches!(
            service
                .create_activity(&ActorIdentity::user("creator"), input)
                .await,
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn join_and_approve_dispatch_alerts() {
        let recorder = Arc::new(RecordingDispatcher::default());
        let service = service(recorder.clone());
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(2))
            .await
            .unwrap();

        service
            .join(&activity.id, &ActorIdentity::user("u1"))
            .await
            .unwrap();
        let approved = service.approve(&activity.id, "u1", &creator).await.unwrap();
        assert_eq!(approved.participants, vec!["u1"]);

        let events = recorder.events.lock().await;
        let kinds: Vec<_> = events.iter().map(AlertEvent::kind).collect();
        assert_eq!(kinds, vec!["join_requested", "request_approved"]);
    }

    #[tokio::test]
    async fn dispatch_failure_does_not_fail_the_operation() {
        let service = service(Arc::new(FailingDispatcher));
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(2))
            .await
            .unwrap();
        let joined = service
            .join(&activity.id, &ActorIdentity::user("u1"))
            .await
            .unwrap();
        assert_eq!(joined.join_requests, vec!["u1"]);
    }

    #[tokio::test]
    async fn failed_precheck_leaves_storage_untouched() {
        let recorder = Arc::new(RecordingDispatcher::default());
        let service = service(recorder.clone());
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(2))
            .await
            .unwrap();

        let err = service
            .approve(&activity.id, "nobody", &ActorIdentity::user("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(service.get_activity(&activity.id).await.unwrap(), activity);
        assert!(recorder.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn update_merges_fields_and_notifies_participants() {
        let recorder = Arc::new(RecordingDispatcher::default());
        let service = service(recorder.clone());
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(2))
            .await
            .unwrap();
        let patch = ActivityPatch {
            description: Some("tempo 8k".into()),
            ..ActivityPatch::default()
        };

        let err = service
            .update_activity(&activity.id, patch.clone(), &ActorIdentity::user("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let updated = service
            .update_activity(&activity.id, patch, &creator)
            .await
            .unwrap();
        assert_eq!(updated.description, "tempo 8k");
        assert_eq!(updated.activity_name, activity.activity_name);
        let events = recorder.events.lock().await;
        assert!(matches!(
            events.as_slice(),
            [AlertEvent::ActivityUpdated { fields, .. }] if fields == &vec!["description".to_string()]
        ));
    }

    #[tokio::test]
    async fn delete_requires_creator() {
        let service = service(Arc::new(RecordingDispatcher::default()));
        let creator = ActorIdentity::user("creator");
        let activity = service
            .create_activity(&creator, new_activity(2))
            .await
            .unwrap();
        assert!(matches!(
            service
                .delete_activity(&activity.id, &ActorIdentity::user("u1"))
                .await,
            Err(DomainError::Forbidden(_))
        ));
        service.delete_activity(&activity.id, &creator).await.unwrap();
        assert_eq!(
            service.get_activity(&activity.id).await,
            Err(DomainError::NotFound)
        );
    }

    #[tokio::test]
    async fn creator_listing_puts_upcoming_before_past() {
        let service = service(Arc::new(RecordingDispatcher::default()));
        let creator = ActorIdentity::user("creator");
        let now = now_ms();
        let offsets = [
            ("past-old", -3 * 86_400_000),
            ("soon", 3_600_000),
            ("past-recent", -3_600_000),
            ("later", 7 * 86_400_000),
        ];
        for (name, offset) in offsets {
            let mut activity = new_activity(4)
                .validate()
                .unwrap()
                .into_activity(name.to_string(), creator.user_id.clone());
            activity.date_time_ms = now + offset;
            service.repository().create(&activity).await.unwrap();
        }

        let listed: Vec<String> = service
            .list_by_creator(&creator, None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|activity| activity.id)
            .collect();
        assert_eq!(listed, ["later", "soon", "past-old", "past-recent"]);
    }

    #[tokio::test]
    async fn sport_search_hides_cancelled_activities() {
        let service = service(Arc::new(RecordingDispatcher::default()));
        let creator = ActorIdentity::user("creator");
        let mut input = new_activity(4);
        input.sport = "tennis".into();
        let activity = service.create_activity(&creator, input).await.unwrap();
        service.cancel(&activity.id, &creator).await.unwrap();

        let sport_only = SearchFilter {
            sport: Some("tennis".into()),
            ..SearchFilter::default()
        };
        assert!(service.search(sport_only).await.unwrap().items.is_empty());

        let cancelled = SearchFilter {
            sport: Some("tennis".into()),
            status: Some(ActivityStatus::Cancelled),
            ..SearchFilter::default()
        };
        let page = service.search(cancelled).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, activity.id);
    }
}
