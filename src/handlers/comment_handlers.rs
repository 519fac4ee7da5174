use crate::{
    auth::CurrentUser,
    errors::AppError,
    handlers::extract::JsonBody,
    models::{
        inputs::{CommentInput, CommentQuery},
        representations::CommentRepr,
    },
    services::tracker_service::TrackerService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

/// `GET /comments/`, optionally narrowed with `?bug_id=`.
pub async fn list_comments(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<CommentQuery>,
) -> Result<Json<Vec<CommentRepr>>, AppError> {
    Ok(Json(service.list_comments(&user, &query).await?))
}

/// `POST /comments/` with `{"message": ..., "bug_id": ...}`.
pub async fn create_comment(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<CommentInput>,
) -> Result<impl IntoResponse, AppError> {
    let comment = service.create_comment(&user, input).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<CommentRepr>, AppError> {
    Ok(Json(service.get_comment(&user, id).await?))
}

pub async fn update_comment(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<CommentInput>,
) -> Result<Json<CommentRepr>, AppError> {
    Ok(Json(service.update_comment(&user, id, input, false).await?))
}

pub async fn patch_comment(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    JsonBody(input): JsonBody<CommentInput>,
) -> Result<Json<CommentRepr>, AppError> {
    Ok(Json(service.update_comment(&user, id, input, true).await?))
}

pub async fn delete_comment(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    service.delete_comment(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
