//! Fixtures for service and router tests.

use crate::db::memory_pool;
use crate::models::user::User;
use crate::services::{notifier::Notifier, tracker_service::TrackerService};
use chrono::Utc;
use std::sync::Arc;

/// Fixed hash; fixtures authenticate with tokens, never passwords.
const FIXTURE_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$fixture$fixture";

pub async fn memory_service() -> TrackerService {
    TrackerService::new(Arc::new(memory_pool().await), Notifier::new(16))
}

/// Insert an account directly, skipping the slow password hash.
pub async fn seed_user(service: &TrackerService, username: &str) -> User {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, email, first_name, last_name, password_hash, date_joined)
         VALUES (?, ?, '', '', ?, ?)
         RETURNING id, username, email, first_name, last_name, password_hash, date_joined",
    )
    .bind(username)
    .bind(format!("{}@example.com", username))
    .bind(FIXTURE_HASH)
    .bind(Utc::now())
    .fetch_one(&*service.db)
    .await
    .expect("seed user")
}

/// Seed an account and return it with a valid API token.
pub async fn seed_user_with_token(service: &TrackerService, username: &str) -> (User, String) {
    let user = seed_user(service, username).await;
    let token = service.issue_token(user.id).await.expect("issue token");
    (user, token)
}
