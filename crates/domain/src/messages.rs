use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::activity::Activity;
use crate::activity_repository::ActivityRepository;
use crate::alerts::{ActivityRef, AlertEvent};
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::jobs::now_ms;
use crate::ports::alerts::AlertDispatcher;
use crate::ports::store::{DocumentQuery, DocumentStore, FieldFilter};
use crate::ports::users::UserDirectory;
use crate::users::resolve_profile;

pub const MESSAGES: &str = "messages";

const MAX_CONTENT_LENGTH: usize = 2_000;
const DEFAULT_MESSAGES_PER_REQUEST: usize = 50;
const MAX_MESSAGES_PER_REQUEST: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub activity_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_profile_pic: Option<String>,
    pub content: String,
    pub created_at: i64,
}

/// Append-only message thread attached to each activity.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn DocumentStore>,
    activities: ActivityRepository,
    users: Arc<dyn UserDirectory>,
    alerts: Arc<dyn AlertDispatcher>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        users: Arc<dyn UserDirectory>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self {
            activities: ActivityRepository::new(store.clone()),
            store,
            users,
            alerts,
        }
    }

    pub async fn post_message(
        &self,
        actor: &ActorIdentity,
        activity_id: &str,
        content: &str,
    ) -> DomainResult<Message> {
        let activity = self.member_activity(actor, activity_id).await?;
        let content = validate_content(content)?;
        let sender = resolve_profile(self.users.as_ref(), &actor.user_id).await;

        let message = Message {
            id: crate::util::uuid_v7_without_dashes(),
            activity_id: activity.id.clone(),
            sender_id: actor.user_id.clone(),
            sender_name: sender.display_name,
            sender_profile_pic: sender.profile_picture,
            content,
            created_at: now_ms(),
        };
        let mut document = match serde_json::to_value(&message) {
            Ok(Value::Object(document)) => document,
            _ => return Err(DomainError::Store("failed to encode message".into())),
        };
        document.remove("id");
        self.store.set(MESSAGES, &message.id, document).await?;

        let recipients = activity
            .members()
            .into_iter()
            .filter(|member| member != &actor.user_id)
            .collect();
        let event = AlertEvent::MessagePosted {
            activity: ActivityRef::from(&activity),
            sender_id: actor.user_id.clone(),
            recipients,
        };
        if let Err(err) = self.alerts.dispatch(event).await {
            tracing::warn!(activity_id, error = %err, "message alert dispatch failed");
        }
        Ok(message)
    }

    /// Oldest first, ordered by creation time.
    pub async fn list_messages(
        &self,
        actor: &ActorIdentity,
        activity_id: &str,
        limit: Option<usize>,
    ) -> DomainResult<Vec<Message>> {
        self.member_activity(actor, activity_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_MESSAGES_PER_REQUEST)
            .clamp(1, MAX_MESSAGES_PER_REQUEST);
        let query = DocumentQuery::new()
            .filter(FieldFilter::eq("activityId", activity_id))
            .limit(limit);
        let rows = self.store.query(MESSAGES, &query).await?;
        let mut messages = rows
            .into_iter()
            .map(|row| {
                let mut document = row.data;
                document.insert("id".into(), Value::String(row.id.clone()));
                serde_json::from_value::<Message>(Value::Object(document))
                    .map_err(|err| DomainError::Store(format!("malformed message {}: {err}", row.id)))
            })
            .collect::<DomainResult<Vec<_>>>()?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn member_activity(
        &self,
        actor: &ActorIdentity,
        activity_id: &str,
    ) -> DomainResult<Activity> {
        let activity = self
            .activities
            .get(activity_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        if activity.is_creator(&actor.user_id) || activity.is_participant(&actor.user_id) {
            Ok(activity)
        } else {
            Err(DomainError::Forbidden(
                "Only the creator and participants can use this thread".into(),
            ))
        }
    }
}

fn validate_content(content: &str) -> DomainResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(DomainError::Validation("content is required".into()));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(DomainError::Validation(format!(
            "content exceeds max length of {MAX_CONTENT_LENGTH}"
        )));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityStatus, ActivityType, GeoPoint, SkillLevel};
    use crate::alerts::{AlertInbox, StoreAlertDispatcher};
    use crate::store::InMemoryDocumentStore;
    use crate::users::{InMemoryUserDirectory, UserProfile};

    async fn setup() -> (MessageService, AlertInbox) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        users
            .insert(UserProfile {
                user_id: "p1".into(),
                display_name: "Priya".into(),
                profile_picture: None,
            })
            .await;
        let alerts = StoreAlertDispatcher::new(store.clone(), users.clone());
        ActivityRepository::new(store.clone())
            .create(&Activity {
                id: "act-1".into(),
                activity_name: "Padel".into(),
                sport: "padel".into(),
                description: "friendly".into(),
                place_name: "Kallang".into(),
                banner_image_url: String::new(),
                activity_type: ActivityType::Event,
                skill_level: SkillLevel::Advanced,
                price: 15,
                location: GeoPoint::new(1.30, 103.87),
                date_time_ms: now_ms() + 60_000,
                max_participants: 3,
                creator_id: "creator".into(),
                participants: vec!["p1".into()],
                join_requests: Vec::new(),
                status: ActivityStatus::Available,
            })
            .await
            .unwrap();
        let inbox = AlertInbox::new(store.clone());
        let service = MessageService::new(store, users, Arc::new(alerts));
        (service, inbox)
    }

    #[tokio::test]
    async fn members_post_and_read_in_creation_order() {
        let (service, alerts) = setup().await;
        let p1 = ActorIdentity::user("p1");
        let first = service.post_message(&p1, "act-1", "  hi all ").await.unwrap();
        assert_eq!(first.content, "hi all");
        assert_eq!(first.sender_name, "Priya");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = service
            .post_message(&ActorIdentity::user("creator"), "act-1", "see you there")
            .await
            .unwrap();

        let thread = service.list_messages(&p1, "act-1", None).await.unwrap();
        assert_eq!(thread, vec![first, second]);

        let creator_alerts = alerts.list("creator", None, false).await.unwrap();
        assert_eq!(creator_alerts.len(), 1);
        assert_eq!(creator_alerts[0].message, "Priya sent a message in Padel");
    }

    #[tokio::test]
    async fn outsiders_cannot_use_the_thread() {
        let (service, _) = setup().await;
        let outsider = ActorIdentity::user("outsider");
        assert!(matches!(
            service.post_message(&outsider, "act-1", "hello").await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            service.list_messages(&outsider, "act-1", None).await,
            Err(DomainError::Forbidden(_))
        ));
        assert_eq!(
            service
                .list_messages(&outsider, "missing", None)
                .await
                .unwrap_err(),
            DomainError::NotFound
        );
    }

    #[tokio::test]
    async fn blank_or_oversized_content_is_rejected() {
        let (service, _) = setup().await;
        let p1 = ActorIdentity::user("p1");
        assert!(matches!(
            service.post_message(&p1, "act-1", "   ").await,
            Err(DomainError::Validation(_))
        ));
        let long = "x".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(matches!(
            service.post_message(&p1, "act-1", &long).await,
            Err(DomainError::Validation(_))
        ));
    }
}
