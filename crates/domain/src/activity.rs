use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::store::Document;

pub const MAX_TEXT_LENGTH: usize = 2_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "coaching session")]
    Coaching,
}

impl ActivityType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "event" => Some(Self::Event),
            "coaching session" | "coaching" => Some(Self::Coaching),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Coaching => "coaching session",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Professional,
}

impl SkillLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            "professional" => Some(Self::Professional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Professional => "professional",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Available,
    Cancelled,
    Expired,
}

impl ActivityStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => Some(Self::Available),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomainError::Validation(
                "latitude must be between -90 and 90".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomainError::Validation(
                "longitude must be between -180 and 180".into(),
            ));
        }
        Ok(())
    }
}

/// Stored shape of an activity. The document body is this struct serialized
/// without `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub activity_name: String,
    pub sport: String,
    pub description: String,
    pub place_name: String,
    #[serde(default)]
    pub banner_image_url: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub skill_level: SkillLevel,
    pub price: u32,
    pub location: GeoPoint,
    #[serde(rename = "dateTime")]
    pub date_time_ms: i64,
    pub max_participants: u32,
    pub creator_id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub join_requests: Vec<String>,
    pub status: ActivityStatus,
}

/// Input for creating an activity.
#[derive(Clone, Debug, PartialEq)]
pub struct NewActivity {
    pub activity_name: String,
    pub sport: String,
    pub description: String,
    pub place_name: String,
    pub banner_image_url: String,
    pub activity_type: ActivityType,
    pub skill_level: SkillLevel,
    pub price: u32,
    pub location: GeoPoint,
    pub date_time_ms: i64,
    pub max_participants: u32,
}

impl NewActivity {
    pub fn validate(mut self) -> DomainResult<Self> {
        self.activity_name = required_text("activityName", &self.activity_name)?;
        self.sport = required_text("sport", &self.sport)?;
        self.description = required_text("description", &self.description)?;
        self.place_name = required_text("placeName", &self.place_name)?;
        self.banner_image_url = self.banner_image_url.trim().to_string();
        if self.max_participants == 0 {
            return Err(DomainError::Validation(
                "maxParticipants must be greater than 0".into(),
            ));
        }
        self.location.validate()?;
        Ok(self)
    }

    pub fn into_activity(self, id: String, creator_id: String) -> Activity {
        Activity {
            id,
            activity_name: self.activity_name,
            sport: self.sport,
            description: self.description,
            place_name: self.place_name,
            banner_image_url: self.banner_image_url,
            activity_type: self.activity_type,
            skill_level: self.skill_level,
            price: self.price,
            location: self.location,
            date_time_ms: self.date_time_ms,
            max_participants: self.max_participants,
            creator_id,
            participants: Vec::new(),
            join_requests: Vec::new(),
            status: ActivityStatus::Available,
        }
    }
}

/// Creator-editable fields. Identity, membership and status have no slot
/// here, so they can never be changed through an update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityPatch {
    pub activity_name: Option<String>,
    pub sport: Option<String>,
    pub description: Option<String>,
    pub place_name: Option<String>,
    pub banner_image_url: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub skill_level: Option<SkillLevel>,
    pub price: Option<u32>,
    pub location: Option<GeoPoint>,
    pub date_time_ms: Option<i64>,
    pub max_participants: Option<u32>,
}

impl ActivityPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Checks that do not depend on the current state of the activity.
    pub fn validate(mut self) -> DomainResult<Self> {
        if self.is_empty() {
            return Err(DomainError::Validation(
                "no updatable fields provided".into(),
            ));
        }
        self.activity_name = optional_text("activityName", self.activity_name)?;
        self.sport = optional_text("sport", self.sport)?;
        self.description = optional_text("description", self.description)?;
        self.place_name = optional_text("placeName", self.place_name)?;
        self.banner_image_url = self.banner_image_url.map(|url| url.trim().to_string());
        if self.max_participants == Some(0) {
            return Err(DomainError::Validation(
                "maxParticipants must be greater than 0".into(),
            ));
        }
        if let Some(location) = self.location.as_ref() {
            location.validate()?;
        }
        Ok(self)
    }

    /// Names of the fields this patch touches, in stored (camelCase) form.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let slots: [(&'static str, bool); 11] = [
            ("activityName", self.activity_name.is_some()),
            ("sport", self.sport.is_some()),
            ("description", self.description.is_some()),
            ("placeName", self.place_name.is_some()),
            ("bannerImageUrl", self.banner_image_url.is_some()),
            ("type", self.activity_type.is_some()),
            ("skillLevel", self.skill_level.is_some()),
            ("price", self.price.is_some()),
            ("location", self.location.is_some()),
            ("dateTime", self.date_time_ms.is_some()),
            ("maxParticipants", self.max_participants.is_some()),
        ];
        for (name, present) in slots {
            if present {
                names.push(name);
            }
        }
        names
    }
}

/// The fields a transition writes back. Only these are sent to the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityChanges(Document);

impl ActivityChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(self, participants: &[String]) -> Self {
        self.set("participants", participants)
    }

    pub fn join_requests(self, join_requests: &[String]) -> Self {
        self.set("joinRequests", join_requests)
    }

    pub fn status(self, status: ActivityStatus) -> Self {
        self.set("status", &status)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    fn set<T: Serialize + ?Sized>(mut self, field: &str, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.0.insert(field.to_string(), value);
        self
    }
}

impl Activity {
    pub fn to_document(&self) -> DomainResult<Document> {
        let value = serde_json::to_value(self)
            .map_err(|err| DomainError::Store(format!("failed to encode activity: {err}")))?;
        let Value::Object(mut document) = value else {
            return Err(DomainError::Store("activity did not encode to an object".into()));
        };
        document.remove("id");
        Ok(document)
    }

    pub fn from_document(id: &str, document: &Document) -> DomainResult<Self> {
        let mut document = document.clone();
        document.insert("id".into(), Value::String(id.to_string()));
        serde_json::from_value(Value::Object(document))
            .map_err(|err| DomainError::Store(format!("malformed activity {id}: {err}")))
    }

    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|id| id == user_id)
    }

    pub fn has_requested(&self, user_id: &str) -> bool {
        self.join_requests.iter().any(|id| id == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }

    /// Creator plus participants.
    pub fn members(&self) -> Vec<String> {
        let mut members = Vec::with_capacity(self.participants.len() + 1);
        members.push(self.creator_id.clone());
        members.extend(self.participants.iter().cloned());
        members
    }

    pub fn join(&self, user_id: &str) -> DomainResult<ActivityChanges> {
        if self.is_participant(user_id) {
            return Err(invalid("You are already a participant in this activity"));
        }
        if self.has_requested(user_id) {
            return Err(invalid(
                "You already have a pending request for this activity",
            ));
        }
        if self.is_creator(user_id) {
            return Err(invalid(
                "You cannot join your own activity as a participant",
            ));
        }
        self.ensure_available()?;
        if self.is_full() {
            return Err(invalid("Activity is already full"));
        }
        let mut join_requests = self.join_requests.clone();
        join_requests.push(user_id.to_string());
        Ok(ActivityChanges::new().join_requests(&join_requests))
    }

    pub fn cancel_join_request(&self, user_id: &str) -> DomainResult<ActivityChanges> {
        self.ensure_available()?;
        if !self.has_requested(user_id) {
            return Err(invalid(
                "You don't have a pending request for this activity",
            ));
        }
        Ok(ActivityChanges::new().join_requests(&without(&self.join_requests, user_id)))
    }

    pub fn approve(&self, user_id: &str, actor_id: &str) -> DomainResult<ActivityChanges> {
        self.ensure_creator(actor_id, "Only the creator can approve join requests")?;
        self.ensure_available()?;
        if !self.has_requested(user_id) {
            return Err(invalid("User does not have a pending join request"));
        }
        if self.is_full() {
            return Err(invalid("Activity is already full"));
        }
        let mut participants = self.participants.clone();
        participants.push(user_id.to_string());
        Ok(ActivityChanges::new()
            .participants(&participants)
            .join_requests(&without(&self.join_requests, user_id)))
    }

    pub fn reject(&self, user_id: &str, actor_id: &str) -> DomainResult<ActivityChanges> {
        self.ensure_creator(actor_id, "Only the creator can reject join requests")?;
        self.ensure_available()?;
        if !self.has_requested(user_id) {
            return Err(invalid("User does not have a pending join request"));
        }
        Ok(ActivityChanges::new().join_requests(&without(&self.join_requests, user_id)))
    }

    pub fn remove_participant(
        &self,
        user_id: &str,
        actor_id: &str,
    ) -> DomainResult<ActivityChanges> {
        self.ensure_creator(actor_id, "Only the creator can remove participants")?;
        self.ensure_available()?;
        if !self.is_participant(user_id) {
            return Err(invalid("User is not a participant in this activity"));
        }
        Ok(ActivityChanges::new().participants(&without(&self.participants, user_id)))
    }

    pub fn leave(&self, user_id: &str) -> DomainResult<ActivityChanges> {
        if self.is_creator(user_id) {
            return Err(invalid("Creator cannot leave their own activity"));
        }
        self.ensure_available()?;
        if !self.is_participant(user_id) {
            return Err(invalid("You are not a participant in this activity"));
        }
        Ok(ActivityChanges::new().participants(&without(&self.participants, user_id)))
    }

    pub fn cancel(&self, actor_id: &str) -> DomainResult<ActivityChanges> {
        self.ensure_creator(actor_id, "Only the creator can cancel this activity")?;
        if self.status != ActivityStatus::Available {
            return Err(invalid(format!(
                "Activity is already {}",
                self.status.as_str()
            )));
        }
        Ok(ActivityChanges::new().status(ActivityStatus::Cancelled))
    }

    /// `None` unless the activity is still AVAILABLE and starts strictly
    /// before `now_ms`.
    pub fn expire(&self, now_ms: i64) -> Option<ActivityChanges> {
        (self.status == ActivityStatus::Available && self.date_time_ms < now_ms)
            .then(|| ActivityChanges::new().status(ActivityStatus::Expired))
    }

    /// Applies a validated patch. Allowed in any status.
    pub fn apply_patch(
        &self,
        patch: &ActivityPatch,
        actor_id: &str,
    ) -> DomainResult<ActivityChanges> {
        self.ensure_creator(actor_id, "Not authorized to update this activity")?;
        if let Some(max) = patch.max_participants {
            if (max as usize) < self.participants.len() {
                return Err(invalid(format!(
                    "maxParticipants cannot be lower than the current participant count ({})",
                    self.participants.len()
                )));
            }
        }

        let mut changes = ActivityChanges::new();
        if let Some(value) = patch.activity_name.as_ref() {
            changes = changes.set("activityName", value);
        }
        if let Some(value) = patch.sport.as_ref() {
            changes = changes.set("sport", value);
        }
        if let Some(value) = patch.description.as_ref() {
            changes = changes.set("description", value);
        }
        if let Some(value) = patch.place_name.as_ref() {
            changes = changes.set("placeName", value);
        }
        if let Some(value) = patch.banner_image_url.as_ref() {
            changes = changes.set("bannerImageUrl", value);
        }
        if let Some(value) = patch.activity_type {
            changes = changes.set("type", &value);
        }
        if let Some(value) = patch.skill_level {
            changes = changes.set("skillLevel", &value);
        }
        if let Some(value) = patch.price {
            changes = changes.set("price", &value);
        }
        if let Some(value) = patch.location {
            changes = changes.set("location", &value);
        }
        if let Some(value) = patch.date_time_ms {
            changes = changes.set("dateTime", &value);
        }
        if let Some(value) = patch.max_participants {
            changes = changes.set("maxParticipants", &value);
        }
        Ok(changes)
    }

    pub fn ensure_creator(&self, actor_id: &str, message: &str) -> DomainResult<()> {
        if self.is_creator(actor_id) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(message.to_string()))
        }
    }

    fn ensure_available(&self) -> DomainResult<()> {
        if self.status == ActivityStatus::Available {
            Ok(())
        } else {
            Err(invalid(format!(
                "Activity is not available (status: {})",
                self.status.as_str()
            )))
        }
    }
}

/// `{creatorId}_{unix_seconds}_{suffix}`.
pub fn new_activity_id(creator_id: &str, now_ms: i64) -> String {
    format!(
        "{creator_id}_{}_{}",
        now_ms.div_euclid(1_000),
        crate::util::short_suffix()
    )
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvalidState(message.into())
}

fn without(ids: &[String], user_id: &str) -> Vec<String> {
    ids.iter().filter(|id| *id != user_id).cloned().collect()
}

fn required_text(field: &str, value: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_TEXT_LENGTH {
        return Err(DomainError::Validation(format!(
            "{field} exceeds max length of {MAX_TEXT_LENGTH}"
        )));
    }
    Ok(value.to_string())
}

fn optional_text(field: &str, value: Option<String>) -> DomainResult<Option<String>> {
    value.map(|value| required_text(field, &value)).transpose()
}
