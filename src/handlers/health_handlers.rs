//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and the schema

use crate::services::tracker_service::TrackerService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK and never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Confirms the schema has been applied (the `bugs` table exists).
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(service): State<TrackerService>) -> impl IntoResponse {
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let schema_check = match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'bugs'",
    )
    .fetch_one(&*service.db)
    .await
    {
        Ok(1) => (true, None::<String>),
        Ok(_) => (false, Some("schema missing, run with --migrate".to_string())),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let overall_ok = sqlite_check.0 && schema_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_check.0,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "schema",
        CheckStatus {
            ok: schema_check.0,
            error: schema_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
