//! User record validation and credential hashing.
//!
//! These are explicit functions rather than schema hooks: validation runs
//! before every insert and the hash is pure, so there is no hidden dispatch
//! between "set a password" and "store a user".

use std::fmt;

use sha2::{Digest, Sha512};
use sqlx::SqlitePool;

use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserError {
    BlankUsername,
    BlankPassword,
    UsernameTaken,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlankUsername => f.write_str("Username cannot be blank"),
            Self::BlankPassword => f.write_str("Password cannot be blank"),
            Self::UsernameTaken => f.write_str("Username already exists"),
        }
    }
}

impl std::error::Error for UserError {}

/// Pure field validation applied before any store access.
pub fn validate(username: &str, password: &str) -> Result<(), UserError> {
    if username.is_empty() {
        return Err(UserError::BlankUsername);
    }
    if password.is_empty() {
        return Err(UserError::BlankPassword);
    }
    Ok(())
}

pub fn make_salt() -> String {
    rand::random::<u64>().to_string()
}

/// Salted SHA-512 digest of the password, hex-encoded. An empty password
/// hashes to the empty string, which [`validate`] rejects anyway.
pub fn hash_password(password: &str, salt: &str) -> String {
    if password.is_empty() {
        return String::new();
    }
    format!("{:x}", Sha512::digest(format!("{password}{salt}")))
}

pub fn authenticate(plain: &str, salt: &str, hashed_password: &str) -> bool {
    hash_password(plain, salt) == hashed_password
}

/// Validates and inserts a new user with a freshly salted credential hash.
pub async fn register(pool: &SqlitePool, username: &str, password: &str) -> anyhow::Result<i64> {
    validate(username, password)?;
    if store::username_exists(pool, username).await? {
        return Err(UserError::UsernameTaken.into());
    }

    let salt = make_salt();
    let hashed = hash_password(password, &salt);
    Ok(store::create_user(pool, username, &hashed, &salt).await?)
}
