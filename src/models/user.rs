//! Represents an account and its API tokens.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A registered account.
///
/// The password hash never leaves the service layer; the outward shape is
/// [`UserRepr`](super::representations::UserRepr).
#[derive(Clone, FromRow, Debug)]
pub struct User {
    pub id: i64,

    /// Unique login name.
    pub username: String,

    pub email: String,

    pub first_name: String,

    pub last_name: String,

    /// Argon2 PHC string.
    pub password_hash: String,

    #[allow(dead_code)]
    pub date_joined: DateTime<Utc>,
}

/// Opaque API token issued at login.
#[derive(Clone, FromRow, Debug)]
pub struct AuthToken {
    pub key: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}
