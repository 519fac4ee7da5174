//! HTTP handlers for bugs.

use crate::{
    auth::CurrentUser,
    errors::AppError,
    handlers::extract::JsonBody,
    models::{
        inputs::{BugInput, BugQuery},
        representations::BugRepr,
    },
    services::tracker_service::TrackerService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

/// `GET /bugs/` with optional `status`, `priority`, `project`,
/// `assigned_to`, `search` and `ordering` filters.
pub async fn list_bugs(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<BugQuery>,
) -> Result<Json<Vec<BugRepr>>, AppError> {
    Ok(Json(service.list_bugs(&user, &query).await?))
}

/// `GET /bugs/my_bugs/`
pub async fn my_bugs(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<BugRepr>>, AppError> {
    Ok(Json(service.my_bugs(&user).await?))
}

pub async fn create_bug(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<BugInput>,
) -> Result<impl IntoResponse, AppError> {
    let bug = service.create_bug(&user, input).await?;
    Ok((StatusCode::CREATED, Json(bug)))
}

pub async fn get_bug(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<BugRepr>, AppError> {
    Ok(Json(service.get_bug(&user, id).await?))
}

pub async fn update_bug(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<BugInput>,
) -> Result<Json<BugRepr>, AppError> {
    Ok(Json(service.update_bug(&user, id, input, false).await?))
}

pub async fn patch_bug(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<BugInput>,
) -> Result<Json<BugRepr>, AppError> {
    Ok(Json(service.update_bug(&user, id, input, true).await?))
}

pub async fn delete_bug(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    service.delete_bug(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
