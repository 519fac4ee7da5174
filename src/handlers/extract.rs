//! Request body extraction with the crate's JSON error shape.

use crate::errors::AppError;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};

/// `Json<T>` whose rejections render as `AppError` (400 with `fields` for
/// wrongly typed values) instead of axum's plain-text responses.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}
