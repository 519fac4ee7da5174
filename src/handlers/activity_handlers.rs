//! Read-only activity feed.

use crate::{
    auth::CurrentUser,
    errors::AppError,
    models::{inputs::ActivityQuery, representations::ActivityRepr},
    services::tracker_service::TrackerService,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// `GET /activities/?project=&action=`
pub async fn list_activities(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRepr>>, AppError> {
    Ok(Json(service.list_activities(&user, &query).await?))
}

pub async fn get_activity(
    State(service): State<TrackerService>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ActivityRepr>, AppError> {
    Ok(Json(service.get_activity(&user, id).await?))
}
