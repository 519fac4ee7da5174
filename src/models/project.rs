//! A project: the workspace that owns bugs.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A project row.
///
/// Ownership is a single column; membership lives in `project_members` and
/// is tracked independently, so the owner need not appear there.
#[derive(Clone, FromRow, Debug)]
pub struct Project {
    pub id: i64,

    /// Display name, at most 200 characters.
    pub name: String,

    pub description: String,

    /// Account that created the project.
    pub owner_id: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}
