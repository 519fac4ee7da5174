//! Registration and login. Both are open to anonymous callers.

use crate::{
    errors::AppError,
    handlers::extract::JsonBody,
    models::{
        inputs::{LoginInput, RegisterInput},
        representations::UserRepr,
    },
    services::tracker_service::TrackerService,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserRepr,
}

/// `POST /register` answers `201 true` once the account exists.
pub async fn register(
    State(service): State<TrackerService>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> Result<impl IntoResponse, AppError> {
    service.register(input).await?;
    Ok((StatusCode::CREATED, Json(true)))
}

/// `POST /login/` exchanges credentials for an API token.
pub async fn login(
    State(service): State<TrackerService>,
    JsonBody(input): JsonBody<LoginInput>,
) -> Result<Json<LoginResponse>, AppError> {
    let (token, user) = service.login(input).await?;
    Ok(Json(LoginResponse {
        token,
        user: UserRepr::from(&user),
    }))
}
