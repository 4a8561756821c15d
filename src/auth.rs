//! Account creation and credential verification.
//!
//! Passwords are hashed with Argon2id using a fresh random salt per account
//! and stored as PHC strings (`$argon2id$v=19$...`). Hashing and verifying
//! are CPU and memory heavy, so both run on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::User;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Username and password are required")]
    MissingField,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verify a password against a PHC-format hash string.
///
/// A malformed stored hash is an error; a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Creates an account and returns its id.
pub async fn signup(pool: &SqlitePool, username: &str, password: &str) -> Result<i64, AuthError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingField);
    }

    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let result = sqlx::query(
        "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            tracing::info!(username, "account created");
            Ok(done.last_insert_rowid())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(AuthError::DuplicateUsername)
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks a username/password pair and returns the matching user.
///
/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub async fn login(pool: &SqlitePool, username: &str, password: &str) -> Result<User, AuthError> {
    let user = find_user(pool, username.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let password = password.to_string();
    let stored = user.password_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await??;

    if matches {
        Ok(user)
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

pub async fn find_user(pool: &SqlitePool, username: &str) -> Result<Option<User>, AuthError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, AuthError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        pool
    }

    #[test]
    fn hash_is_salted() {
        let a = hash_password("hunter2").unwrap();
        let b = hash_password("hunter2").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &a).unwrap());
        assert!(verify_password("hunter2", &b).unwrap());
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(AuthError::Hash(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = memory_pool().await;
        signup(&pool, "rokia", "pw1").await.unwrap();
        let err = signup(&pool, "rokia", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));
    }

    #[tokio::test]
    async fn login_requires_matching_hash() {
        let pool = memory_pool().await;
        let id = signup(&pool, "alice", "s3cret").await.unwrap();

        let user = login(&pool, "alice", "s3cret").await.unwrap();
        assert_eq!(user.id, id);
        assert_ne!(user.password_hash, "s3cret");

        assert!(matches!(
            login(&pool, "alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&pool, "nobody", "s3cret").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let pool = memory_pool().await;
        assert!(matches!(
            signup(&pool, "   ", "pw").await,
            Err(AuthError::MissingField)
        ));
        assert!(matches!(
            signup(&pool, "bob", "").await,
            Err(AuthError::MissingField)
        ));
    }
}
