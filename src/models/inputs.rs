//! Request bodies and query strings.
//!
//! Every field is optional so that missing values surface as field-level
//! validation messages instead of deserializer rejections.

use serde::{Deserialize, Deserializer};

/// Body of `POST /projects/` and `PUT|PATCH /projects/{id}/`.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Body of the membership actions.
#[derive(Debug, Default, Deserialize)]
pub struct MemberInput {
    pub username: Option<String>,
}

/// Body of `POST /bugs/` and `PUT|PATCH /bugs/{id}/`.
#[derive(Debug, Default, Deserialize)]
pub struct BugInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    /// Target project id, as a number or a numeric string.
    pub project: Option<serde_json::Value>,
    /// Absent leaves the assignee untouched; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub assigned_to: Option<Option<serde_json::Value>>,
}

/// Body of `POST /comments/` and `PUT|PATCH /comments/{id}/`.
#[derive(Debug, Default, Deserialize)]
pub struct CommentInput {
    pub message: Option<String>,
    /// Accepted as a number or a numeric string.
    pub bug_id: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginInput {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectQuery {
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BugQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project: Option<String>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentQuery {
    pub bug_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub project: Option<String>,
    pub action: Option<String>,
}

/// Distinguishes an explicit `null` from an absent key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
