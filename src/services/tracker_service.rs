//! src/services/tracker_service.rs
//!
//! TrackerService is the resource layer behind every REST handler. It owns the
//! SQLite pool and the project notifier; each resource keeps its operations
//! in its own `impl TrackerService` block (`projects.rs`, `bugs.rs`, ...).
//! This file holds the pieces they share: the error type, visibility SQL,
//! account lookups, the activity log writer and event publishing.

use crate::models::{
    activity::ActivityLog,
    choices::ActivityAction,
    representations::{ActivityRepr, UserRepr},
    user::User,
};
use crate::services::{
    notifier::{Notifier, OutboundMessage},
    validation::FieldErrors,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Unknown id, or an id outside the requester's visible set.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("authentication credentials were not provided")]
    Unauthenticated,
    #[error("invalid token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl From<FieldErrors> for TrackerError {
    fn from(errors: FieldErrors) -> Self {
        TrackerError::Validation(errors)
    }
}

/// Fail with the collected messages, if any.
pub(crate) fn ensure_valid(errors: FieldErrors) -> TrackerResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TrackerError::Validation(errors))
    }
}

/// Shared handle to storage and the notification groups.
#[derive(Clone)]
pub struct TrackerService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,

    /// Per-project broadcast groups for live updates.
    pub notifier: Notifier,
}

impl TrackerService {
    pub fn new(db: Arc<SqlitePool>, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    pub(crate) async fn fetch_user(&self, id: i64) -> TrackerResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, first_name, last_name, password_hash, date_joined
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => TrackerError::NotFound("User"),
            other => TrackerError::Sqlx(other),
        })
    }

    pub(crate) async fn user_repr(&self, id: i64) -> TrackerResult<UserRepr> {
        Ok(UserRepr::from(&self.fetch_user(id).await?))
    }

    pub(crate) async fn find_user_by_username(&self, username: &str) -> TrackerResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, first_name, last_name, password_hash, date_joined
             FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    pub(crate) async fn user_exists(&self, id: i64) -> TrackerResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&*self.db)
            .await?;
        Ok(found > 0)
    }

    pub(crate) async fn activity_repr(&self, entry: &ActivityLog) -> TrackerResult<ActivityRepr> {
        Ok(ActivityRepr::new(entry, self.user_repr(entry.user_id).await?))
    }

    /// Serialize `payload` and push `build(payload)` into the project's group.
    ///
    /// Fire-and-forget: a group with no live connections drops the event.
    pub(crate) fn publish<T, F>(&self, project_id: i64, payload: &T, build: F)
    where
        T: Serialize,
        F: FnOnce(serde_json::Value) -> OutboundMessage,
    {
        match serde_json::to_value(payload) {
            Ok(data) => {
                self.notifier.publish(project_id, build(data));
            }
            Err(err) => warn!("failed to serialize event for project {}: {}", project_id, err),
        }
    }

    /// Announce a freshly written activity row to the project's group.
    pub(crate) async fn publish_activity(&self, entry: &ActivityLog) -> TrackerResult<()> {
        let repr = self.activity_repr(entry).await?;
        self.publish(entry.project_id, &repr, |data| OutboundMessage::ActivityUpdate {
            data,
        });
        Ok(())
    }
}

/// Append one audit row inside the caller's transaction.
pub(crate) async fn append_activity(
    conn: &mut SqliteConnection,
    project_id: i64,
    bug_id: Option<i64>,
    user_id: i64,
    action: ActivityAction,
    description: &str,
) -> sqlx::Result<ActivityLog> {
    sqlx::query_as::<_, ActivityLog>(
        "INSERT INTO activity_logs (project_id, bug_id, user_id, action, description, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING id, project_id, bug_id, user_id, action, description, created_at",
    )
    .bind(project_id)
    .bind(bug_id)
    .bind(user_id)
    .bind(action.as_str())
    .bind(description)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

/// Push a sub-select of the ids of every project `user_id` owns or belongs to.
pub(crate) fn push_visible_project_ids(builder: &mut QueryBuilder<'_, Sqlite>, user_id: i64) {
    builder.push("SELECT vp.id FROM projects vp WHERE vp.owner_id = ");
    builder.push_bind(user_id);
    builder.push(
        " OR EXISTS (SELECT 1 FROM project_members vm \
         WHERE vm.project_id = vp.id AND vm.user_id = ",
    );
    builder.push_bind(user_id);
    builder.push(")");
}

/// Same visibility rule for static queries: binds the user id twice.
pub(crate) const VISIBLE_PROJECT_IDS: &str = "SELECT vp.id FROM projects vp WHERE vp.owner_id = ? \
     OR EXISTS (SELECT 1 FROM project_members vm WHERE vm.project_id = vp.id AND vm.user_id = ?)";

/// Add `AND (c1 LIKE t OR c2 LIKE t ...)` for every whitespace-separated term.
pub(crate) fn push_search(
    builder: &mut QueryBuilder<'_, Sqlite>,
    columns: &[&str],
    search: Option<&str>,
) {
    let Some(search) = search else { return };
    for term in search.split_whitespace() {
        let pattern = format!("%{}%", escape_like(term));
        builder.push(" AND (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(*column);
            builder.push(" LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\'");
        }
        builder.push(")");
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Translate an `ordering` query value into an ORDER BY list.
///
/// `allowed` maps public field names to SQL expressions. Unknown fields are
/// ignored; when nothing usable remains `default` is used. `tiebreak` is
/// always appended so equal timestamps order deterministically.
pub(crate) fn order_clause(
    raw: Option<&str>,
    allowed: &[(&str, &str)],
    default: &str,
    tiebreak: &str,
) -> String {
    let parts: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter_map(|field| {
            let (name, dir) = match field.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (field, "ASC"),
            };
            allowed
                .iter()
                .find(|(public, _)| *public == name)
                .map(|(_, sql)| format!("{} {}", sql, dir))
        })
        .collect();

    let base = if parts.is_empty() {
        default.to_string()
    } else {
        parts.join(", ")
    };
    format!("{}, {}", base, tiebreak)
}

/// Return true if SQLx error indicates a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
