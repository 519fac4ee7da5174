//! Outward JSON shapes.
//!
//! These mirror the rows but nest related accounts and carry derived
//! counts. They are assembled by `TrackerService`, which owns the queries
//! needed to fill the derived fields.

use super::{
    activity::ActivityLog,
    choices::{ActivityAction, BugPriority, BugStatus},
    comment::Comment,
    user::User,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Public view of an account.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UserRepr {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserRepr {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ProjectRepr {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub owner: UserRepr,
    pub members: Vec<UserRepr>,
    /// Number of bugs filed against the project.
    pub bug_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CommentRepr {
    pub id: i64,
    pub message: String,
    pub commenter: UserRepr,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentRepr {
    pub fn new(comment: &Comment, commenter: UserRepr) -> Self {
        Self {
            id: comment.id,
            message: comment.message.clone(),
            commenter,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// A bug with its project name, people and full comment thread.
#[derive(Serialize, Clone, Debug)]
pub struct BugRepr {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: BugStatus,
    pub priority: BugPriority,
    pub assigned_to: Option<UserRepr>,
    /// Owning project id.
    pub project: i64,
    pub project_name: String,
    pub created_by: UserRepr,
    pub comments: Vec<CommentRepr>,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
pub struct ActivityRepr {
    pub id: i64,
    pub user: UserRepr,
    pub action: ActivityAction,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityRepr {
    pub fn new(entry: &ActivityLog, user: UserRepr) -> Self {
        Self {
            id: entry.id,
            user,
            action: entry.action,
            description: entry.description.clone(),
            created_at: entry.created_at,
        }
    }
}
