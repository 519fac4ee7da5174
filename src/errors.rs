use crate::services::{tracker_service::TrackerError, validation::FieldErrors};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by every handler, rendered as a JSON body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Per-field messages for 400 validation failures.
    pub fields: Option<FieldErrors>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            fields: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    fn invalid(fields: FieldErrors) -> Self {
        Self {
            fields: Some(fields),
            ..Self::bad_request("validation failed")
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(fields) = self.fields {
            body["fields"] = json!(fields);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                AppError::invalid(decode_error_fields(&err.body_text()))
            }
            JsonRejection::JsonSyntaxError(err) => AppError::bad_request(err.body_text()),
            other => AppError::new(other.status(), other.body_text()),
        }
    }
}

/// Turn a body decode failure such as `"...target type: title: invalid type"`
/// into a message on the offending field.
fn decode_error_fields(text: &str) -> FieldErrors {
    let detail = text
        .split_once("target type: ")
        .map_or(text, |(_, detail)| detail);
    match detail.split_once(": ") {
        Some((field, message))
            if !field.is_empty()
                && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            FieldErrors::single(field, message)
        }
        _ => FieldErrors::single("non_field_errors", detail),
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::NotFound(_) => AppError::not_found(err.to_string()),
            TrackerError::BadRequest(msg) => AppError::bad_request(msg),
            TrackerError::Validation(fields) => AppError::invalid(fields),
            TrackerError::Unauthenticated | TrackerError::InvalidToken => {
                AppError::unauthorized(err.to_string())
            }
            TrackerError::PasswordHash(_) | TrackerError::Sqlx(_) => {
                tracing::error!("request failed: {}", err);
                AppError::internal("internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_carry_fields() {
        let err = AppError::from(TrackerError::Validation(FieldErrors::single(
            "title",
            "This field is required.",
        )));
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(body["fields"]["title"][0], "This field is required.");
    }

    #[test]
    fn decode_errors_name_the_field() {
        let fields = decode_error_fields(
            "Failed to deserialize the JSON body into the target type: title: invalid type: integer `5`, expected a string at line 1 column 11",
        );
        assert_eq!(
            fields.get("title"),
            Some(&["invalid type: integer `5`, expected a string at line 1 column 11".to_string()][..])
        );

        let fields = decode_error_fields(
            "Failed to deserialize the JSON body into the target type: invalid type: sequence, expected struct BugInput",
        );
        assert!(fields.get("non_field_errors").is_some());
    }

    #[tokio::test]
    async fn tracker_errors_map_to_statuses() {
        let (status, body) = render(TrackerError::NotFound("Bug").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Bug not found");
        assert!(body.get("fields").is_none());

        let (status, _) = render(TrackerError::InvalidToken.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = render(TrackerError::Sqlx(sqlx::Error::PoolTimedOut).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }
}
