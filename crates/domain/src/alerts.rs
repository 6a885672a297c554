use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::activity::Activity;
use crate::error::DomainError;
use crate::jobs::now_ms;
use crate::ports::BoxFuture;
use crate::ports::alerts::AlertDispatcher;
use crate::ports::store::{Document, DocumentQuery, DocumentStore, FieldFilter};
use crate::ports::users::UserDirectory;
use crate::users::resolve_profile;

pub const ALERTS: &str = "alerts";
const DEFAULT_ALERTS_PER_REQUEST: usize = 50;
const MAX_ALERTS_PER_REQUEST: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    JoinRequest,
    RequestApproved,
    RequestRejected,
    UserLeft,
    UserRemoved,
    ActivityCancelled,
    ActivityUpdated,
    NewMessage,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::JoinRequest => "join_request",
            AlertType::RequestApproved => "request_approved",
            AlertType::RequestRejected => "request_rejected",
            AlertType::UserLeft => "user_left",
            AlertType::UserRemoved => "user_removed",
            AlertType::ActivityCancelled => "activity_cancelled",
            AlertType::ActivityUpdated => "activity_updated",
            AlertType::NewMessage => "new_message",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub activity_id: String,
    pub activity_name: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_profile_pic: Option<String>,
    pub created_at: i64,
    pub read: bool,
    pub response_status: Option<ResponseStatus>,
}

/// What an alert is about, captured from the activity at dispatch time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityRef {
    pub id: String,
    pub name: String,
    pub creator_id: String,
}

impl From<&Activity> for ActivityRef {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id.clone(),
            name: activity.activity_name.clone(),
            creator_id: activity.creator_id.clone(),
        }
    }
}

/// Events raised after a successful state change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertEvent {
    JoinRequested {
        activity: ActivityRef,
        requester_id: String,
    },
    JoinRequestWithdrawn {
        activity: ActivityRef,
        requester_id: String,
    },
    RequestApproved {
        activity: ActivityRef,
        user_id: String,
    },
    RequestRejected {
        activity: ActivityRef,
        user_id: String,
    },
    ParticipantLeft {
        activity: ActivityRef,
        user_id: String,
    },
    ParticipantRemoved {
        activity: ActivityRef,
        user_id: String,
    },
    ActivityCancelled {
        activity: ActivityRef,
        recipients: Vec<String>,
    },
    ActivityUpdated {
        activity: ActivityRef,
        recipients: Vec<String>,
        fields: Vec<String>,
    },
    MessagePosted {
        activity: ActivityRef,
        sender_id: String,
        recipients: Vec<String>,
    },
}

impl AlertEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::JoinRequested { .. } => "join_requested",
            AlertEvent::JoinRequestWithdrawn { .. } => "join_request_withdrawn",
            AlertEvent::RequestApproved { .. } => "request_approved",
            AlertEvent::RequestRejected { .. } => "request_rejected",
            AlertEvent::ParticipantLeft { .. } => "participant_left",
            AlertEvent::ParticipantRemoved { .. } => "participant_removed",
            AlertEvent::ActivityCancelled { .. } => "activity_cancelled",
            AlertEvent::ActivityUpdated { .. } => "activity_updated",
            AlertEvent::MessagePosted { .. } => "message_posted",
        }
    }

    pub fn activity(&self) -> &ActivityRef {
        match self {
            AlertEvent::JoinRequested { activity, .. }
            | AlertEvent::JoinRequestWithdrawn { activity, .. }
            | AlertEvent::RequestApproved { activity, .. }
            | AlertEvent::RequestRejected { activity, .. }
            | AlertEvent::ParticipantLeft { activity, .. }
            | AlertEvent::ParticipantRemoved { activity, .. }
            | AlertEvent::ActivityCancelled { activity, .. }
            | AlertEvent::ActivityUpdated { activity, .. }
            | AlertEvent::MessagePosted { activity, .. } => activity,
        }
    }
}

/// Writes alert records into the `alerts` collection.
#[derive(Clone)]
pub struct StoreAlertDispatcher {
    store: Arc<dyn DocumentStore>,
    users: Arc<dyn UserDirectory>,
}

struct Draft {
    recipients: Vec<String>,
    alert_type: AlertType,
    sender_id: String,
    message: String,
    response_status: Option<ResponseStatus>,
}

impl StoreAlertDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { store, users }
    }

    async fn write(&self, activity: &ActivityRef, draft: Draft) -> DomainResult<()> {
        let sender = resolve_profile(self.users.as_ref(), &draft.sender_id).await;
        let message = draft.message.replace("{sender}", &sender.display_name);
        let created_at = now_ms();
        for recipient in draft.recipients {
            if recipient == draft.sender_id {
                continue;
            }
            let alert = Alert {
                id: crate::util::uuid_v7_without_dashes(),
                user_id: recipient,
                alert_type: draft.alert_type,
                message: message.clone(),
                activity_id: activity.id.clone(),
                activity_name: activity.name.clone(),
                sender_id: sender.user_id.clone(),
                sender_name: sender.display_name.clone(),
                sender_profile_pic: sender.profile_picture.clone(),
                created_at,
                read: false,
                response_status: draft.response_status,
            };
            let id = alert.id.clone();
            self.store.set(ALERTS, &id, encode_alert(&alert)?).await?;
        }
        Ok(())
    }

    /// Join-request alerts the creator received from `requester_id`.
    async fn join_request_alerts(
        &self,
        activity: &ActivityRef,
        requester_id: &str,
    ) -> DomainResult<Vec<String>> {
        let query = DocumentQuery::new()
            .filter(FieldFilter::eq("userId", activity.creator_id.as_str()))
            .filter(FieldFilter::eq("activityId", activity.id.as_str()))
            .filter(FieldFilter::eq("senderId", requester_id))
            .filter(FieldFilter::eq("type", AlertType::JoinRequest.as_str()));
        let rows = self.store.query(ALERTS, &query).await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    async fn resolve_join_request(
        &self,
        activity: &ActivityRef,
        requester_id: &str,
        status: ResponseStatus,
    ) -> DomainResult<()> {
        let ids = self.join_request_alerts(activity, requester_id).await?;
        let mut changes = Document::new();
        changes.insert(
            "responseStatus".into(),
            serde_json::to_value(status).unwrap_or(Value::Null),
        );
        let updates = ids.into_iter().map(|id| (id, changes.clone())).collect();
        self.store.batch_update(ALERTS, updates).await
    }

    async fn handle(&self, event: AlertEvent) -> DomainResult<()> {
        match event {
            AlertEvent::JoinRequested {
                activity,
                requester_id,
            } => {
                let draft = Draft {
                    recipients: vec![activity.creator_id.clone()],
                    alert_type: AlertType::JoinRequest,
                    message: format!("{{sender}} wants to join your activity: {}", activity.name),
                    sender_id: requester_id,
                    response_status: Some(ResponseStatus::Pending),
                };
                self.write(&activity, draft).await
            }
            AlertEvent::JoinRequestWithdrawn {
                activity,
                requester_id,
            } => {
                for id in self.join_request_alerts(&activity, &requester_id).await? {
                    self.store.delete(ALERTS, &id).await?;
                }
                Ok(())
            }
            AlertEvent::RequestApproved { activity, user_id } => {
                self.resolve_join_request(&activity, &user_id, ResponseStatus::Accepted)
                    .await?;
                let draft = Draft {
                    recipients: vec![user_id],
                    alert_type: AlertType::RequestApproved,
                    message: format!("Your request to join {} was approved", activity.name),
                    sender_id: activity.creator_id.clone(),
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::RequestRejected { activity, user_id } => {
                self.resolve_join_request(&activity, &user_id, ResponseStatus::Rejected)
                    .await?;
                let draft = Draft {
                    recipients: vec![user_id],
                    alert_type: AlertType::RequestRejected,
                    message: format!("Your request to join {} was rejected", activity.name),
                    sender_id: activity.creator_id.clone(),
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::ParticipantLeft { activity, user_id } => {
                let draft = Draft {
                    recipients: vec![activity.creator_id.clone()],
                    alert_type: AlertType::UserLeft,
                    message: format!("{{sender}} has left your activity: {}", activity.name),
                    sender_id: user_id,
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::ParticipantRemoved { activity, user_id } => {
                let draft = Draft {
                    recipients: vec![user_id],
                    alert_type: AlertType::UserRemoved,
                    message: format!("You have been removed from {}", activity.name),
                    sender_id: activity.creator_id.clone(),
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::ActivityCancelled {
                activity,
                recipients,
            } => {
                let draft = Draft {
                    recipients,
                    alert_type: AlertType::ActivityCancelled,
                    message: format!(
                        "Activity '{}' has been cancelled by the organizer",
                        activity.name
                    ),
                    sender_id: activity.creator_id.clone(),
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::ActivityUpdated {
                activity,
                recipients,
                fields,
            } => {
                let draft = Draft {
                    recipients,
                    alert_type: AlertType::ActivityUpdated,
                    message: format!(
                        "Activity '{}' has been updated: {}",
                        activity.name,
                        fields.join(", ")
                    ),
                    sender_id: activity.creator_id.clone(),
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
            AlertEvent::MessagePosted {
                activity,
                sender_id,
                recipients,
            } => {
                let draft = Draft {
                    recipients,
                    alert_type: AlertType::NewMessage,
                    message: format!("{{sender}} sent a message in {}", activity.name),
                    sender_id,
                    response_status: None,
                };
                self.write(&activity, draft).await
            }
        }
    }
}

impl AlertDispatcher for StoreAlertDispatcher {
    fn dispatch(&self, event: AlertEvent) -> BoxFuture<'_, DomainResult<()>> {
        Box::pin(self.handle(event))
    }
}

/// A user's view of the alerts addressed to them.
#[derive(Clone)]
pub struct AlertInbox {
    store: Arc<dyn DocumentStore>,
}

impl AlertInbox {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Newest first.
    pub async fn list(
        &self,
        user_id: &str,
        limit: Option<usize>,
        unread_only: bool,
    ) -> DomainResult<Vec<Alert>> {
        let limit = limit
            .unwrap_or(DEFAULT_ALERTS_PER_REQUEST)
            .clamp(1, MAX_ALERTS_PER_REQUEST);
        let mut alerts = self.query_user(user_id, unread_only).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        alerts.truncate(limit);
        Ok(alerts)
    }

    pub async fn unread_count(&self, user_id: &str) -> DomainResult<usize> {
        Ok(self.query_user(user_id, true).await?.len())
    }

    pub async fn mark_as_read(&self, user_id: &str, alert_id: &str) -> DomainResult<Alert> {
        let mut alert = self.owned(user_id, alert_id).await?;
        if !alert.read {
            self.store.update(ALERTS, alert_id, read_flag()).await?;
            alert.read = true;
        }
        Ok(alert)
    }

    /// Returns how many alerts changed.
    pub async fn mark_all_as_read(&self, user_id: &str) -> DomainResult<usize> {
        let unread = self.query_user(user_id, true).await?;
        let count = unread.len();
        if count > 0 {
            let updates = unread
                .into_iter()
                .map(|alert| (alert.id, read_flag()))
                .collect();
            self.store.batch_update(ALERTS, updates).await?;
        }
        tracing::debug!(user_id, count, "alerts marked as read");
        Ok(count)
    }

    pub async fn delete(&self, user_id: &str, alert_id: &str) -> DomainResult<()> {
        self.owned(user_id, alert_id).await?;
        self.store.delete(ALERTS, alert_id).await
    }

    async fn owned(&self, user_id: &str, alert_id: &str) -> DomainResult<Alert> {
        let document = self
            .store
            .get(ALERTS, alert_id)
            .await?
            .ok_or(DomainError::NotFound)?;
        let alert = decode_alert(alert_id, document)?;
        if alert.user_id != user_id {
            return Err(DomainError::Forbidden(
                "Not authorized to access this alert".into(),
            ));
        }
        Ok(alert)
    }

    async fn query_user(&self, user_id: &str, unread_only: bool) -> DomainResult<Vec<Alert>> {
        let mut query = DocumentQuery::new().filter(FieldFilter::eq("userId", user_id));
        if unread_only {
            query = query.filter(FieldFilter::eq("read", false));
        }
        let rows = self.store.query(ALERTS, &query).await?;
        rows.into_iter()
            .map(|row| decode_alert(&row.id, row.data))
            .collect()
    }
}

fn read_flag() -> Document {
    let mut changes = Document::new();
    changes.insert("read".into(), Value::Bool(true));
    changes
}

fn encode_alert(alert: &Alert) -> DomainResult<Document> {
    match serde_json::to_value(alert) {
        Ok(Value::Object(mut document)) => {
            document.remove("id");
            Ok(document)
        }
        Ok(_) => Err(DomainError::Store("alert did not encode to an object".into())),
        Err(err) => Err(DomainError::Store(format!("failed to encode alert: {err}"))),
    }
}

fn decode_alert(id: &str, mut document: Document) -> DomainResult<Alert> {
    document.insert("id".into(), Value::String(id.to_string()));
    serde_json::from_value(Value::Object(document))
        .map_err(|err| DomainError::Store(format!("malformed alert {id}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use crate::users::{InMemoryUserDirectory, UserProfile};

    fn activity_ref() -> ActivityRef {
        ActivityRef {
            id: "act-1".into(),
            name: "Sunday volleyball".into(),
            creator_id: "creator".into(),
        }
    }

    async fn dispatcher() -> (StoreAlertDispatcher, AlertInbox, InMemoryDocumentStore) {
        let store = InMemoryDocumentStore::new();
        let users = InMemoryUserDirectory::new();
        users
            .insert(UserProfile {
                user_id: "u1".into(),
                display_name: "Ada Tan".into(),
                profile_picture: Some("https://cdn/ada.png".into()),
            })
            .await;
        let dispatcher = StoreAlertDispatcher::new(Arc::new(store.clone()), Arc::new(users));
        let inbox = AlertInbox::new(Arc::new(store.clone()));
        (dispatcher, inbox, store)
    }

    #[tokio::test]
    async fn join_request_alert_goes_to_creator_with_sender_profile() {
        let (dispatcher, inbox, _) = dispatcher().await;
        dispatcher
            .dispatch(AlertEvent::JoinRequested {
                activity: activity_ref(),
                requester_id: "u1".into(),
            })
            .await
            .unwrap();

        let alerts = inbox.list("creator", None, false).await.unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::JoinRequest);
        assert_eq!(alert.message, "Ada Tan wants to join your activity: Sunday volleyball");
        assert_eq!(alert.sender_profile_pic.as_deref(), Some("https://cdn/ada.png"));
        assert_eq!(alert.response_status, Some(ResponseStatus::Pending));
        assert!(!alert.read);
    }

    #[tokio::test]
    async fn approval_marks_join_request_accepted_and_notifies_requester() {
        let (dispatcher, inbox, _) = dispatcher().await;
        dispatcher
            .dispatch(AlertEvent::JoinRequested {
                activity: activity_ref(),
                requester_id: "u1".into(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(AlertEvent::RequestApproved {
                activity: activity_ref(),
                user_id: "u1".into(),
            })
            .await
            .unwrap();

        let creator_alerts = inbox.list("creator", None, false).await.unwrap();
        assert_eq!(creator_alerts[0].response_status, Some(ResponseStatus::Accepted));
        let user_alerts = inbox.list("u1", None, false).await.unwrap();
        assert_eq!(user_alerts.len(), 1);
        assert_eq!(user_alerts[0].alert_type, AlertType::RequestApproved);
        assert_eq!(user_alerts[0].sender_name, "creator");
    }

    #[tokio::test]
    async fn withdrawn_request_deletes_the_creator_alert() {
        let (dispatcher, _, store) = dispatcher().await;
        dispatcher
            .dispatch(AlertEvent::JoinRequested {
                activity: activity_ref(),
                requester_id: "u1".into(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(AlertEvent::JoinRequestWithdrawn {
                activity: activity_ref(),
                requester_id: "u1".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.count(ALERTS).await, 0);
    }

    #[tokio::test]
    async fn broadcast_skips_the_sender() {
        let (dispatcher, inbox, store) = dispatcher().await;
        dispatcher
            .dispatch(AlertEvent::MessagePosted {
                activity: activity_ref(),
                sender_id: "u1".into(),
                recipients: vec!["creator".into(), "u1".into(), "u2".into()],
            })
            .await
            .unwrap();
        assert_eq!(store.count(ALERTS).await, 2);
        assert!(inbox.list("u1", None, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inbox_lists_newest_first_and_tracks_unread() {
        let (dispatcher, inbox, _) = dispatcher().await;
        for name in ["first", "second", "third"] {
            dispatcher
                .dispatch(AlertEvent::ActivityUpdated {
                    activity: activity_ref(),
                    recipients: vec!["u1".into()],
                    fields: vec![name.into()],
                })
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let alerts = inbox.list("u1", None, false).await.unwrap();
        let messages: Vec<&str> = alerts.iter().map(|alert| alert.message.as_str()).collect();
        assert_eq!(
            messages,
            [
                "Activity 'Sunday volleyball' has been updated: third",
                "Activity 'Sunday volleyball' has been updated: second",
                "Activity 'Sunday volleyball' has been updated: first",
            ]
        );
        assert_eq!(inbox.list("u1", Some(1), false).await.unwrap().len(), 1);
        assert_eq!(inbox.unread_count("u1").await.unwrap(), 3);

        let read = inbox.mark_as_read("u1", &alerts[0].id).await.unwrap();
        assert!(read.read);
        assert_eq!(inbox.unread_count("u1").await.unwrap(), 2);
        assert_eq!(inbox.list("u1", None, true).await.unwrap().len(), 2);

        assert_eq!(inbox.mark_all_as_read("u1").await.unwrap(), 2);
        assert_eq!(inbox.unread_count("u1").await.unwrap(), 0);
        assert_eq!(inbox.mark_all_as_read("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn inbox_only_touches_the_owners_alerts() {
        let (dispatcher, inbox, store) = dispatcher().await;
        dispatcher
            .dispatch(AlertEvent::ParticipantRemoved {
                activity: activity_ref(),
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        let alert_id = inbox.list("u1", None, false).await.unwrap()[0].id.clone();

        assert!(matches!(
            inbox.mark_as_read("intruder", &alert_id).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            inbox.delete("intruder", &alert_id).await,
            Err(DomainError::Forbidden(_))
        ));
        assert_eq!(
            inbox.mark_as_read("u1", "missing").await,
            Err(DomainError::NotFound)
        );

        inbox.delete("u1", &alert_id).await.unwrap();
        assert_eq!(store.count(ALERTS).await, 0);
    }
}
