mod activities;
mod alerts;
mod messages;

use axum::extract::{Extension, State};
use axum::{
    Json, Router,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use sportsbuddies_domain::{DomainResult, error::DomainError, identity::ActorIdentity};

use crate::middleware::AuthContext;
use crate::{error::ApiError, middleware as app_middleware, observability, state::AppState};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/activities", post(activities::create_activity))
        .route("/v1/activities/search", get(activities::search_activities))
        .route(
            "/v1/activities/mine/created",
            get(activities::list_created),
        )
        .route(
            "/v1/activities/mine/participating",
            get(activities::list_participating),
        )
        .route(
            "/v1/activities/mine/requests",
            get(activities::list_requested),
        )
        .route(
            "/v1/activities/mine/pending-approvals",
            get(activities::list_pending_approvals),
        )
        .route(
            "/v1/activities/:activity_id",
            get(activities::get_activity)
                .put(activities::update_activity)
                .delete(activities::delete_activity),
        )
        .route(
            "/v1/activities/:activity_id/join",
            post(activities::join_activity),
        )
        .route(
            "/v1/activities/:activity_id/cancel-request",
            post(activities::cancel_join_request),
        )
        .route(
            "/v1/activities/:activity_id/approve/:user_id",
            post(activities::approve_request),
        )
        .route(
            "/v1/activities/:activity_id/reject/:user_id",
            post(activities::reject_request),
        )
        .route(
            "/v1/activities/:activity_id/remove/:user_id",
            post(activities::remove_participant),
        )
        .route(
            "/v1/activities/:activity_id/leave",
            post(activities::leave_activity),
        )
        .route(
            "/v1/activities/:activity_id/cancel",
            post(activities::cancel_activity),
        )
        .route(
            "/v1/activities/:activity_id/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/v1/alerts", get(alerts::list_alerts))
        .route("/v1/alerts/unread-count", get(alerts::unread_count))
        .route("/v1/alerts/read-all", post(alerts::mark_all_read))
        .route("/v1/alerts/:alert_id/read", post(alerts::mark_read))
        .route("/v1/alerts/:alert_id", delete(alerts::delete_alert))
        .route("/v1/admin/expire", post(run_expiration_sweep))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(database = state.db.name(), error = %err, "database health check failed");
            "degraded"
        }
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        database: state.db.name(),
    })
}

async fn metrics() -> Result<Response, ApiError> {
    let body = observability::render_metrics().ok_or(ApiError::Internal)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn run_expiration_sweep(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let actor = actor_identity(&auth)?;
    if !actor.role.is_operator() {
        return Err(ApiError::Forbidden(
            "Only operators can run the expiration sweep".into(),
        ));
    }
    let report = state
        .activities
        .run_expiration_sweep()
        .await
        .map_err(map_domain_error)?;
    observability::register_manual_sweep(&report);
    tracing::info!(
        actor = %actor.user_id,
        scanned = report.scanned,
        expired = report.expired,
        "manual expiration sweep"
    );
    Ok(Json(report).into_response())
}

fn actor_identity(auth: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = auth
        .user_id
        .as_ref()
        .filter(|user_id| !user_id.trim().is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(ActorIdentity::with_role(user_id.to_string(), auth.role))
}

/// Maps the domain result and records the operation outcome.
fn observe<T>(operation: &'static str, result: DomainResult<T>) -> Result<T, ApiError> {
    match result {
        Ok(value) => {
            observability::register_activity_operation(operation, "ok");
            Ok(value)
        }
        Err(err) => {
            let err = map_domain_error(err);
            observability::register_activity_operation(operation, err.error_code());
            Err(err)
        }
    }
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Forbidden(message) => ApiError::Forbidden(message),
        DomainError::InvalidState(message) => ApiError::InvalidState(message),
        DomainError::Conflict => ApiError::Conflict,
        DomainError::Store(message) => {
            tracing::error!(error = %message, "document store failure");
            ApiError::Unavailable
        }
    }
}
