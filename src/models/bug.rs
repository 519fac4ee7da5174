//! Represents a bug filed against a project.

use super::choices::{BugPriority, BugStatus};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A bug row.
#[derive(Clone, FromRow, Debug)]
pub struct Bug {
    pub id: i64,

    pub title: String,

    pub description: String,

    #[sqlx(try_from = "String")]
    pub status: BugStatus,

    #[sqlx(try_from = "String")]
    pub priority: BugPriority,

    /// Assignee; cleared when the account is deleted.
    pub assigned_to_id: Option<i64>,

    /// Owning project; deleting it deletes the bug.
    pub project_id: i64,

    pub created_by_id: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
