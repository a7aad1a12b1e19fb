//! User directory: the relational source of truth for user records.
//! The token lifecycle only needs lookup by id and by e-mail plus password comparison;
//! `create` backs the registration endpoint.

mod user;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

pub use user::{User, UserId, UserRecord, UserView, NewUser};
pub use memory::MemoryUserDirectory;
pub use postgres::PgUserDirectory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user not found")]
    NotFound,
    #[error("already used email: {0}")]
    Conflict(String),
    #[error("user directory timed out")]
    Timeout,
    #[error("user directory error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<User, DirectoryError>;
    async fn find_by_email(&self, email: &str) -> Result<User, DirectoryError>;
    async fn create(&self, record: UserRecord) -> Result<User, DirectoryError>;
}
