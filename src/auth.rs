//! Request authentication.
//!
//! REST clients send `Authorization: Token <key>` (or `Bearer <key>`).
//! Browsers cannot set headers on a websocket handshake, so socket requests
//! may pass the key as `?token=<key>` instead.

use crate::{
    errors::AppError,
    models::user::User,
    services::tracker_service::{TrackerError, TrackerService},
};
use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;

/// The authenticated account; rejects the request with 401 otherwise.
pub struct CurrentUser(pub User);

/// The account if the request carries a valid key from either source.
pub struct MaybeUser(pub Option<User>);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn header_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    match scheme {
        "Token" | "Bearer" if !key.is_empty() => Some(key),
        _ => None,
    }
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<TrackerService> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &TrackerService,
    ) -> Result<Self, Self::Rejection> {
        let key = header_token(parts).ok_or(TrackerError::Unauthenticated)?;
        let user = service.authenticate(key).await?;
        Ok(CurrentUser(user))
    }
}

impl FromRequestParts<TrackerService> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &TrackerService,
    ) -> Result<Self, Self::Rejection> {
        let key = match header_token(parts) {
            Some(key) => Some(key.to_string()),
            None => query_token(parts),
        };
        let Some(key) = key else {
            return Ok(MaybeUser(None));
        };
        match service.authenticate(&key).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(TrackerError::InvalidToken) => Ok(MaybeUser(None)),
            Err(err) => Err(err.into()),
        }
    }
}
