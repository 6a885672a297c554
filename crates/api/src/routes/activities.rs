use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sportsbuddies_domain::activity::{Activity, ActivityPatch, GeoPoint, NewActivity};
use sportsbuddies_domain::search::{SearchFilter, SearchPage};
use validator::Validate;

use super::{actor_identity, map_domain_error, observe};
use crate::middleware::AuthContext;
use crate::{error::ApiError, state::AppState, validation};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct LocationRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
}

impl From<LocationRequest> for GeoPoint {
    fn from(value: LocationRequest) -> Self {
        GeoPoint::new(value.latitude, value.longitude)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateActivityRequest {
    #[validate(length(min = 1, max = 200))]
    activity_name: String,
    #[validate(length(min = 1, max = 100))]
    sport: String,
    #[validate(length(min = 1, max = 2000))]
    description: String,
    #[validate(length(min = 1, max = 200))]
    place_name: String,
    #[serde(default)]
    #[validate(length(max = 2048))]
    banner_image_url: String,
    #[serde(rename = "type")]
    activity_type: String,
    skill_level: String,
    price: u32,
    #[validate(nested)]
    location: LocationRequest,
    date_time: String,
    #[validate(range(min = 1))]
    max_participants: u32,
}

impl CreateActivityRequest {
    fn into_new_activity(self) -> Result<NewActivity, ApiError> {
        Ok(NewActivity {
            activity_type: validation::parse_activity_type(&self.activity_type)?,
            skill_level: validation::parse_skill_level(&self.skill_level)?,
            date_time_ms: validation::parse_timestamp("dateTime", &self.date_time)?,
            activity_name: self.activity_name,
            sport: self.sport,
            description: self.description,
            place_name: self.place_name,
            banner_image_url: self.banner_image_url,
            price: self.price,
            location: self.location.into(),
            max_participants: self.max_participants,
        })
    }
}

/// Membership, status and creator are not accepted here; unknown keys in the
/// body are ignored.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateActivityRequest {
    #[validate(length(min = 1, max = 200))]
    activity_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    sport: Option<String>,
    #[validate(length(min = 1, max = 2000))]
    description: Option<String>,
    #[validate(length(min = 1, max = 200))]
    place_name: Option<String>,
    #[validate(length(max = 2048))]
    banner_image_url: Option<String>,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    skill_level: Option<String>,
    price: Option<u32>,
    #[validate(nested)]
    location: Option<LocationRequest>,
    date_time: Option<String>,
    #[validate(range(min = 1))]
    max_participants: Option<u32>,
}

impl UpdateActivityRequest {
    fn into_patch(self) -> Result<ActivityPatch, ApiError> {
        Ok(ActivityPatch {
            activity_type: self
                .activity_type
                .as_deref()
                .map(validation::parse_activity_type)
                .transpose()?,
            skill_level: self
                .skill_level
                .as_deref()
                .map(validation::parse_skill_level)
                .transpose()?,
            date_time_ms: self
                .date_time
                .as_deref()
                .map(|value| validation::parse_timestamp("dateTime", value))
                .transpose()?,
            activity_name: self.activity_name,
            sport: self.sport,
            description: self.description,
            place_name: self.place_name,
            banner_image_url: self.banner_image_url,
            price: self.price,
            location: self.location.map(GeoPoint::from),
            max_participants: self.max_participants,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SearchQuery {
    query: Option<String>,
    sport: Option<String>,
    skill_level: Option<String>,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    status: Option<String>,
    place_name: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    max_distance: Option<f64>,
    limit: Option<usize>,
    start_after: Option<String>,
}

impl SearchQuery {
    fn into_filter(self) -> Result<SearchFilter, ApiError> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                let point = GeoPoint::new(latitude, longitude);
                point.validate().map_err(map_domain_error)?;
                Some(point)
            }
            (None, None) => None,
            _ => {
                return Err(ApiError::Validation(
                    "latitude and longitude must be given together".into(),
                ));
            }
        };
        if self
            .max_distance
            .is_some_and(|distance| !distance.is_finite() || distance < 0.0)
        {
            return Err(ApiError::Validation(
                "maxDistance must be a non-negative number".into(),
            ));
        }
        Ok(SearchFilter {
            skill_level: non_blank(self.skill_level)
                .as_deref()
                .map(validation::parse_skill_level)
                .transpose()?,
            activity_type: non_blank(self.activity_type)
                .as_deref()
                .map(validation::parse_activity_type)
                .transpose()?,
            status: non_blank(self.status)
                .as_deref()
                .map(validation::parse_status)
                .transpose()?,
            date_from_ms: non_blank(self.date_from)
                .as_deref()
                .map(|value| validation::parse_timestamp("dateFrom", value))
                .transpose()?,
            date_to_ms: non_blank(self.date_to)
                .as_deref()
                .map(|value| validation::parse_timestamp("dateTo", value))
                .transpose()?,
            query: self.query,
            sport: self.sport,
            place_name: self.place_name,
            location,
            max_distance_km: self.max_distance,
            limit: self.limit,
            start_after: non_blank(self.start_after),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PageQuery {
    limit: Option<usize>,
    start_after: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub(super) async fn create_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateActivityRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let input = payload.into_new_activity()?;
    let activity = observe(
        "create",
        state.activities.create_activity(&actor, input).await,
    )?;
    Ok((StatusCode::CREATED, Json(activity)).into_response())
}

pub(super) async fn get_activity(
    State(state): State<AppState>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let activity = state
        .activities
        .get_activity(&activity_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(activity))
}

pub(super) async fn update_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
    Json(payload): Json<UpdateActivityRequest>,
) -> Result<Json<Activity>, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let patch = payload.into_patch()?;
    let activity = observe(
        "update",
        state
            .activities
            .update_activity(&activity_id, patch, &actor)
            .await,
    )?;
    Ok(Json(activity))
}

pub(super) async fn delete_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_identity(&auth)?;
    observe(
        "delete",
        state.activities.delete_activity(&activity_id, &actor).await,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn join_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe("join", state.activities.join(&activity_id, &actor).await)?;
    Ok(Json(activity))
}

pub(super) async fn cancel_join_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe(
        "cancel_join_request",
        state
            .activities
            .cancel_join_request(&activity_id, &actor)
            .await,
    )?;
    Ok(Json(activity))
}

pub(super) async fn approve_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((activity_id, user_id)): Path<(String, String)>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe(
        "approve",
        state
            .activities
            .approve(&activity_id, &user_id, &actor)
            .await,
    )?;
    Ok(Json(activity))
}

pub(super) async fn reject_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((activity_id, user_id)): Path<(String, String)>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe(
        "reject",
        state
            .activities
            .reject(&activity_id, &user_id, &actor)
            .await,
    )?;
    Ok(Json(activity))
}

pub(super) async fn remove_participant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((activity_id, user_id)): Path<(String, String)>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe(
        "remove_participant",
        state
            .activities
            .remove_participant(&activity_id, &user_id, &actor)
            .await,
    )?;
    Ok(Json(activity))
}

pub(super) async fn leave_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe("leave", state.activities.leave(&activity_id, &actor).await)?;
    Ok(Json(activity))
}

pub(super) async fn cancel_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
) -> Result<Json<Activity>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activity = observe("cancel", state.activities.cancel(&activity_id, &actor).await)?;
    Ok(Json(activity))
}

pub(super) async fn search_activities(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchPage>, ApiError> {
    let filter = query.into_filter()?;
    let page = state
        .activities
        .search(filter)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(page))
}

pub(super) async fn list_created(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activities = state
        .activities
        .list_by_creator(&actor, query.limit, non_blank(query.start_after))
        .await
        .map_err(map_domain_error)?;
    Ok(Json(activities))
}

pub(super) async fn list_participating(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activities = state
        .activities
        .list_by_participant(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(activities))
}

pub(super) async fn list_requested(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activities = state
        .activities
        .list_by_pending_request(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(activities))
}

pub(super) async fn list_pending_approvals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let activities = state
        .activities
        .list_pending_approvals(&actor)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(activities))
}
