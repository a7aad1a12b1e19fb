use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{DirectoryError, User, UserDirectory, UserId, UserRecord, NewUser};

#[derive(Default)]
struct Inner {
    next_id: UserId,
    by_id: HashMap<UserId, User>,
}

/// Process-local user directory. Ids are assigned monotonically from 1.
#[derive(Default)]
pub struct MemoryUserDirectory {
    inner: RwLock<Inner>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self { Self::default() }

    /// Validate, hash and insert a user in one step (startup seeding and tests).
    pub fn seed(&self, name: &str, email: &str, password: &str) -> anyhow::Result<User> {
        let record = NewUser { name: name.into(), email: email.into(), password: password.into() }
            .into_record()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.insert(record).map_err(|e| anyhow::anyhow!(e.to_string()))
    }

    fn insert(&self, record: UserRecord) -> Result<User, DirectoryError> {
        let mut w = self.inner.write();
        if w.by_id.values().any(|u| u.email == record.email) {
            return Err(DirectoryError::Conflict(record.email));
        }
        w.next_id += 1;
        let user = User { id: w.next_id, name: record.name, email: record.email, encrypted_password: record.encrypted_password };
        w.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn len(&self) -> usize { self.inner.read().by_id.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<User, DirectoryError> {
        self.inner.read().by_id.get(&id).cloned().ok_or(DirectoryError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, DirectoryError> {
        self.inner.read().by_id.values().find(|u| u.email == email).cloned().ok_or(DirectoryError::NotFound)
    }

    async fn create(&self, record: UserRecord) -> Result<User, DirectoryError> {
        self.insert(record)
    }
}
