use crate::api::api_error::APIError;
use crate::api::auth::Authenticated;
use crate::api::model::{CleanUpMessage, CreatePrincipalMessage, OutcomeResult, PresentMessage};
use crate::api::server::AppState;
use crate::auth::admin;
use crate::orchestrator::{CleanUpRequest, PresentRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/present", post(present))
        .route("/cleanup", post(cleanup))
        .route("/principals", post(create_principal))
        .route("/principals/:name", delete(delete_principal))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn present(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(payload), _): WithRejection<Json<PresentMessage>, APIError>,
) -> Result<Json<OutcomeResult>, APIError> {
    let req = PresentRequest::from(payload);
    state.orchestrator.present(&principal, &req).await?;
    Ok(Json(OutcomeResult::success()))
}

async fn cleanup(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    WithRejection(Json(payload), _): WithRejection<Json<CleanUpMessage>, APIError>,
) -> Result<Json<OutcomeResult>, APIError> {
    let req = CleanUpRequest::from(payload);
    state.orchestrator.clean_up(&principal, &req).await?;
    Ok(Json(OutcomeResult::success()))
}

async fn create_principal(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    WithRejection(Json(payload), _): WithRejection<Json<CreatePrincipalMessage>, APIError>,
) -> Result<impl IntoResponse, APIError> {
    admin::create_principal(&state.store, &actor, &payload.name, &payload.secret).await?;
    Ok((StatusCode::CREATED, Json(json!({"name": payload.name.trim()}))))
}

async fn delete_principal(
    State(state): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(name): Path<String>,
) -> Result<StatusCode, APIError> {
    admin::delete_principal(&state.store, &actor, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}
