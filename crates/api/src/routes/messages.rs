use axum::extract::{Extension, Path, Query, State};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sportsbuddies_domain::messages::Message;
use validator::Validate;

use super::{actor_identity, map_domain_error, observe};
use crate::middleware::AuthContext;
use crate::{error::ApiError, state::AppState, validation};

#[derive(Debug, Deserialize, Validate)]
pub(super) struct PostMessageRequest {
    #[validate(length(min = 1))]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct MessageListQuery {
    limit: Option<usize>,
}

pub(super) async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor_identity(&auth)?;
    let message = observe(
        "post_message",
        state
            .messages
            .post_message(&actor, &activity_id, &payload.content)
            .await,
    )?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

pub(super) async fn list_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(activity_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let actor = actor_identity(&auth)?;
    let messages = state
        .messages
        .list_messages(&actor, &activity_id, query.limit)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(messages))
}
