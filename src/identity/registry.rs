use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::directory::UserId;
use crate::storage::KvStore;
use crate::tprintln;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session not found")]
    NotFound,
    #[error("session ttl must be positive")]
    InvalidTtl,
    #[error("session registry timed out")]
    Timeout,
    #[error("session registry error: {0}")]
    Backend(String),
    #[error("session entry {0} holds an unreadable identity")]
    Corrupt(String),
}

/// Expiring index of live credential identifiers.
///
/// `delete` must be atomic per key: when two callers race to delete the same
/// live key, exactly one of them observes `1`.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn put(&self, key: &str, user_id: UserId, ttl: Duration) -> Result<(), RegistryError>;
    async fn get(&self, key: &str) -> Result<UserId, RegistryError>;
    async fn delete(&self, key: &str) -> Result<u64, RegistryError>;
}

/// Session registry over the in-process expiring KV store.
#[derive(Clone)]
pub struct KvSessionRegistry {
    kv: KvStore,
}

impl KvSessionRegistry {
    pub fn new(kv: KvStore) -> Self { Self { kv } }

    pub fn store(&self) -> &KvStore { &self.kv }
}

#[async_trait]
impl SessionRegistry for KvSessionRegistry {
    async fn put(&self, key: &str, user_id: UserId, ttl: Duration) -> Result<(), RegistryError> {
        if ttl.is_zero() { return Err(RegistryError::InvalidTtl); }
        self.kv.set(key, user_id.to_string(), Some(ttl));
        tprintln!("session.put key={} user={} ttl_secs={}", key, user_id, ttl.as_secs());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<UserId, RegistryError> {
        let raw = self.kv.get(key).ok_or(RegistryError::NotFound)?;
        raw.parse::<UserId>().map_err(|_| RegistryError::Corrupt(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<u64, RegistryError> {
        let removed = u64::from(self.kv.delete(key));
        tprintln!("session.delete key={} removed={}", key, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> KvSessionRegistry { KvSessionRegistry::new(KvStore::in_memory("sessions")) }

    #[tokio::test]
    async fn put_get_delete() {
        let r = registry();
        r.put("abc", 42, Duration::from_secs(60)).await.unwrap();
        assert_eq!(r.get("abc").await.unwrap(), 42);
        assert_eq!(r.delete("abc").await.unwrap(), 1);
        assert_eq!(r.delete("abc").await.unwrap(), 0);
        assert_eq!(r.get("abc").await.unwrap_err(), RegistryError::NotFound);
    }

    #[tokio::test]
    async fn zero_ttl_rejected() {
        let r = registry();
        assert_eq!(r.put("abc", 1, Duration::ZERO).await.unwrap_err(), RegistryError::InvalidTtl);
        assert!(r.store().is_empty());
    }

    #[tokio::test]
    async fn entries_expire_with_ttl() {
        let r = registry();
        r.put("short", 1, Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(r.get("short").await.unwrap_err(), RegistryError::NotFound);
        assert_eq!(r.delete("short").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreadable_identity_is_corrupt() {
        let r = registry();
        r.store().set("bad", "not-a-number", Some(Duration::from_secs(60)));
        assert_eq!(r.get("bad").await.unwrap_err(), RegistryError::Corrupt("bad".into()));
    }
}
