use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Opaque numeric user identifier.
pub type UserId = u64;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email regex"));

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub encrypted_password: String,
}

impl User {
    pub fn compare_password(&self, plaintext: &str) -> bool {
        crate::security::verify_password(&self.encrypted_password, plaintext)
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User").field("id", &self.id).field("name", &self.name).field("email", &self.email).finish_non_exhaustive()
    }
}

/// Public projection of a user; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self { Self { id: u.id, name: u.name.clone(), email: u.email.clone() } }
}

/// Registration payload as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// A validated user with its password already hashed, ready to be stored.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    pub encrypted_password: String,
}

impl NewUser {
    pub fn validate(&self) -> AppResult<()> {
        if self.email.trim().is_empty() {
            return Err(AppError::malformed("invalid_email", "email: cannot be blank"));
        }
        if !EMAIL_RE.is_match(&self.email) {
            return Err(AppError::malformed("invalid_email", "email: must be a valid email address"));
        }
        let name_len = self.name.chars().count();
        if !(2..=100).contains(&name_len) {
            return Err(AppError::malformed("invalid_name", "name: the length must be between 2 and 100"));
        }
        let pw_len = self.password.chars().count();
        if !(6..=100).contains(&pw_len) {
            return Err(AppError::malformed("invalid_password", "password: the length must be between 6 and 100"));
        }
        Ok(())
    }

    /// Validate and hash into a storable record.
    pub fn into_record(self) -> AppResult<UserRecord> {
        self.validate()?;
        let encrypted_password = crate::security::hash_password(&self.password)?;
        Ok(UserRecord { name: self.name, email: self.email, encrypted_password })
    }
}
