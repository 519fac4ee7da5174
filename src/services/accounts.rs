//! Account registration, login and token authentication.
//!
//! Passwords are stored as Argon2 PHC strings. Login issues an opaque API
//! token that clients send back as `Authorization: Token <key>`.

use crate::models::{
    inputs::{LoginInput, RegisterInput},
    user::{AuthToken, User},
};
use crate::services::{
    tracker_service::{
        TrackerError, TrackerResult, TrackerService, ensure_valid, is_unique_violation,
    },
    validation::{FieldErrors, REQUIRED, TextRule, check_text},
};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::RngCore;
use tracing::{debug, info};

const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;
const TOKEN_BYTES: usize = 32;

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

impl TrackerService {
    /// Create an account from a public registration form.
    pub async fn register(&self, input: RegisterInput) -> TrackerResult<User> {
        let mut errors = FieldErrors::new();
        check_text(
            &mut errors,
            "username",
            input.username.as_deref(),
            TextRule::required(Some(USERNAME_MAX_LEN)),
            false,
        );
        if let Some(username) = input.username.as_deref() {
            if !username.trim().is_empty() && !is_valid_username(username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }
        match input.email.as_deref().map(str::trim) {
            None | Some("") => errors.add("email", REQUIRED),
            Some(email) if !is_plausible_email(email) => {
                errors.add("email", "Enter a valid email address.")
            }
            Some(_) => {}
        }
        match input.password.as_deref() {
            None | Some("") => errors.add("password", REQUIRED),
            Some(password) if password.chars().count() < PASSWORD_MIN_LEN => errors.add(
                "password",
                format!(
                    "This password is too short. It must contain at least {} characters.",
                    PASSWORD_MIN_LEN
                ),
            ),
            Some(_) => {}
        }
        if let Some(username) = input.username.as_deref() {
            if errors.get("username").is_none()
                && self.find_user_by_username(username).await?.is_some()
            {
                errors.add("username", USERNAME_TAKEN);
            }
        }
        ensure_valid(errors)?;

        let password_hash = hash_password(input.password.as_deref().unwrap_or_default())?;
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, date_joined)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, username, email, first_name, last_name, password_hash, date_joined",
        )
        .bind(input.username.unwrap_or_default())
        .bind(input.email.unwrap_or_default().trim().to_string())
        .bind(input.first_name.unwrap_or_default())
        .bind(input.last_name.unwrap_or_default())
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(user) => {
                info!("registered user {}", user.username);
                Ok(user)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(FieldErrors::single("username", USERNAME_TAKEN).into())
            }
            Err(err) => Err(TrackerError::Sqlx(err)),
        }
    }

    /// Check credentials and issue a fresh API token.
    pub async fn login(&self, input: LoginInput) -> TrackerResult<(String, User)> {
        let mut errors = FieldErrors::new();
        if input.username.as_deref().unwrap_or_default().is_empty() {
            errors.add("username", REQUIRED);
        }
        if input.password.as_deref().unwrap_or_default().is_empty() {
            errors.add("password", REQUIRED);
        }
        ensure_valid(errors)?;

        let username = input.username.unwrap_or_default();
        let password = input.password.unwrap_or_default();
        let user = match self.find_user_by_username(&username).await? {
            Some(user) if verify_password(&password, &user.password_hash) => user,
            _ => return Err(FieldErrors::single("non_field_errors", BAD_CREDENTIALS).into()),
        };

        let token = self.issue_token(user.id).await?;
        info!("user {} logged in", user.username);
        Ok((token, user))
    }

    /// Store and return a new random token for `user_id`.
    pub async fn issue_token(&self, user_id: i64) -> TrackerResult<String> {
        let token = sqlx::query_as::<_, AuthToken>(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?, ?, ?)
             RETURNING key, user_id, created_at",
        )
        .bind(generate_token())
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        debug!("issued token for user {} at {}", token.user_id, token.created_at);
        Ok(token.key)
    }

    /// Resolve a token to its account.
    pub async fn authenticate(&self, key: &str) -> TrackerResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.email, u.first_name, u.last_name,
                    u.password_hash, u.date_joined
             FROM users u JOIN auth_tokens t ON t.user_id = u.id
             WHERE t.key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(TrackerError::InvalidToken)
    }
}

fn hash_password(password: &str) -> TrackerResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| TrackerError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TrackerError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn is_valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{memory_service, seed_user, seed_user_with_token};

    fn form(username: &str, password: &str) -> RegisterInput {
        RegisterInput {
            username: Some(username.into()),
            email: Some(format!("{}@example.com", username)),
            password: Some(password.into()),
            first_name: Some("Ada".into()),
            last_name: None,
        }
    }

    #[test]
    fn username_and_email_shapes() {
        assert!(is_valid_username("ada.l+test@x_y-z"));
        assert!(!is_valid_username("ada lovelace"));
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada example@x.com"));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not a phc string"));
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn register_then_login_issues_working_token() {
        let service = memory_service().await;
        let user = service.register(form("ada", "s3cret-pass")).await.unwrap();
        assert_eq!(user.first_name, "Ada");
        assert_ne!(user.password_hash, "s3cret-pass");

        let (token, logged_in) = service
            .login(LoginInput {
                username: Some("ada".into()),
                password: Some("s3cret-pass".into()),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(service.authenticate(&token).await.unwrap().id, user.id);

        let err = service
            .login(LoginInput {
                username: Some("ada".into()),
                password: Some("nope-nope".into()),
            })
            .await
            .unwrap_err();
        match err {
            TrackerError::Validation(fields) => {
                assert_eq!(
                    fields.get("non_field_errors"),
                    Some(&[BAD_CREDENTIALS.to_string()][..])
                )
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_reports_every_bad_field() {
        let service = memory_service().await;
        seed_user(&service, "taken").await;

        let err = service
            .register(RegisterInput {
                username: Some("taken".into()),
                email: Some("not-an-email".into()),
                password: Some("short".into()),
                ..RegisterInput::default()
            })
            .await
            .unwrap_err();
        match err {
            TrackerError::Validation(fields) => {
                assert_eq!(fields.get("username"), Some(&[USERNAME_TAKEN.to_string()][..]));
                assert!(fields.get("email").is_some());
                assert!(fields.get("password").is_some());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let service = memory_service().await;
        seed_user_with_token(&service, "ada").await;
        assert!(matches!(
            service.authenticate("bogus").await,
            Err(TrackerError::InvalidToken)
        ));
    }
}
