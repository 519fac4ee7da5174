use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A comment on a bug. Listed oldest-first.
#[derive(Clone, FromRow, Debug)]
pub struct Comment {
    pub id: i64,
    pub bug_id: i64,
    pub commenter_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
