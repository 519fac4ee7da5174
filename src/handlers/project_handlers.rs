//! HTTP handlers for projects and their member sets.

use crate::{
    auth::CurrentUser,
    errors::AppError,
    handlers::extract::JsonBody,
    models::{
        inputs::{MemberInput, ProjectInput, ProjectQuery},
        representations::ProjectRepr,
    },
    services::tracker_service::TrackerService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

/// `GET /projects/` lists projects the caller owns or belongs to.
pub async fn list_projects(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Vec<ProjectRepr>>, AppError> {
    Ok(Json(service.list_projects(&user, &query).await?))
}

/// `POST /projects/`
pub async fn create_project(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<ProjectInput>,
) -> Result<impl IntoResponse, AppError> {
    let project = service.create_project(&user, input).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectRepr>, AppError> {
    Ok(Json(service.get_project(&user, id).await?))
}

/// `PUT /projects/{id}/` replaces name and description.
pub async fn update_project(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<ProjectInput>,
) -> Result<Json<ProjectRepr>, AppError> {
    Ok(Json(service.update_project(&user, id, input, false).await?))
}

/// `PATCH /projects/{id}/` only touches the fields present.
pub async fn patch_project(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<ProjectInput>,
) -> Result<Json<ProjectRepr>, AppError> {
    Ok(Json(service.update_project(&user, id, input, true).await?))
}

pub async fn delete_project(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    service.delete_project(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /projects/{id}/add_member/` with `{"username": ...}`.
pub async fn add_member(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<MemberInput>,
) -> Result<impl IntoResponse, AppError> {
    let message = service
        .add_member(&user, id, input.username.as_deref())
        .await?;
    Ok(Json(json!({ "message": message })))
}

/// `DELETE /projects/{id}/remove_member/` with `{"username": ...}`.
pub async fn remove_member(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<MemberInput>,
) -> Result<impl IntoResponse, AppError> {
    let message = service
        .remove_member(&user, id, input.username.as_deref())
        .await?;
    Ok(Json(json!({ "message": message })))
}
