//! Append-only audit trail entries.

use super::choices::ActivityAction;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One audit entry. Rows are inserted by bug and comment mutations and are
/// never updated or deleted by the application.
#[derive(Clone, FromRow, Debug)]
pub struct ActivityLog {
    pub id: i64,

    pub project_id: i64,

    /// Bug the entry refers to, if any. Only used for cascading deletes.
    #[allow(dead_code)]
    pub bug_id: Option<i64>,

    /// Acting account.
    pub user_id: i64,

    #[sqlx(try_from = "String")]
    pub action: ActivityAction,

    pub description: String,

    pub created_at: DateTime<Utc>,
}
