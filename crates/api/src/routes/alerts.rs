use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sportsbuddies_domain::alerts::Alert;

use super::{actor_identity, map_domain_error};
use crate::middleware::AuthContext;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AlertListQuery {
    limit: Option<usize>,
    #[serde(default)]
    unread_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UnreadCountResponse {
    unread_count: usize,
}

#[derive(Serialize)]
pub(super) struct MarkAllReadResponse {
    updated: usize,
}

pub(super) async fn list_alerts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let alerts = state
        .alerts
        .list(&actor.user_id, query.limit, query.unread_only)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(alerts))
}

pub(super) async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let unread_count = state
        .alerts
        .unread_count(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub(super) async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(alert_id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    let actor = actor_identity(&auth)?;
    let alert = state
        .alerts
        .mark_as_read(&actor.user_id, &alert_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(alert))
}

pub(super) async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let actor = actor_identity(&auth)?;
    let updated = state
        .alerts
        .mark_all_as_read(&actor.user_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(MarkAllReadResponse { updated }))
}

pub(super) async fn delete_alert(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(alert_id): Path<String>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    state
        .alerts
        .delete(&actor.user_id, &alert_id)
        .await
        .map_err(map_domain_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
