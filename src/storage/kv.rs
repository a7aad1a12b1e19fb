use std::time::{Duration, Instant};
use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::path::PathBuf;
use serde::{Serialize, Deserialize};
use std::time::{SystemTime, UNIX_EPOCH};
use crate::tprintln;

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct StoreSettings {
    /// Store name, used only for logging.
    pub name: String,
    /// Optional snapshot persistence. `None` keeps the store purely in memory.
    #[serde(default)]
    pub persistence: Option<PersistenceSettings>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PersistenceSettings {
    /// File the snapshot is written to (via a `.tmp` sibling and rename).
    pub path: PathBuf,
    /// Interval in milliseconds between snapshots
    #[serde(default = "PersistenceSettings::default_interval_ms")]
    pub interval_ms: u64,
}

impl PersistenceSettings {
    fn default_interval_ms() -> u64 { 5_000 }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), interval_ms: Self::default_interval_ms() }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    /// Optional expiry time
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }
}

#[derive(Serialize, Deserialize)]
struct SnapEntry { key: String, value: String, remaining_ms: Option<u64> }
#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, entries: Vec<SnapEntry> }

/// A single named in-memory KV store with per-key expiry.
///
/// All mutation happens under one write lock, so `delete` is an atomic
/// remove-and-report per key: of two concurrent deletes of the same live key,
/// exactly one observes `true`.
#[derive(Clone)]
pub struct KvStore {
    pub(crate) settings: StoreSettings,
    map: Arc<parking_lot::RwLock<StdHashMap<String, Entry>>>,
}

impl KvStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings, map: Arc::new(parking_lot::RwLock::new(StdHashMap::new())) }
    }

    pub fn in_memory(name: &str) -> Self {
        Self::new(StoreSettings { name: name.to_string(), persistence: None })
    }

    pub fn persistence(&self) -> Option<&PersistenceSettings> { self.settings.persistence.as_ref() }

    /// Set a key with optional TTL. Overwrites any previous value and expiry.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = ttl.map(|d| Instant::now() + d);
        let ent = Entry { value: value.into(), expires_at };
        let mut w = self.map.write();
        w.insert(key, ent);
    }

    /// Get a key. If expired, removes it and returns None.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let r = self.map.read();
            match r.get(key) {
                Some(ent) if ent.is_live(now) => return Some(ent.value.clone()),
                Some(_) => { /* expired, fall through to removal */ }
                None => return None,
            }
        }
        let mut w = self.map.write();
        // Re-check under the write lock: the key may have been rewritten meanwhile.
        if let Some(ent) = w.get(key) {
            if ent.is_live(Instant::now()) { return Some(ent.value.clone()); }
            w.remove(key);
        }
        None
    }

    /// Remaining time to live of a live key; `None` if absent, expired or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let r = self.map.read();
        let ent = r.get(key)?;
        if !ent.is_live(now) { return None; }
        ent.expires_at.map(|exp| exp.saturating_duration_since(now))
    }

    /// Remove a key. Returns true only if a live entry was removed; an expired
    /// leftover is dropped but reported as absent.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.map.write().remove(key) {
            Some(ent) => ent.is_live(now),
            None => false,
        }
    }

    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// Remove expired keys. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, v| v.is_live(now));
        let removed = before - w.len();
        if removed > 0 { tprintln!("kv.sweep store={} removed={}", self.settings.name, removed); }
        removed
    }

    /// Write live entries to the configured snapshot file. No-op without persistence settings.
    pub fn save_snapshot(&self) -> anyhow::Result<usize> {
        let Some(p) = self.settings.persistence.as_ref() else { return Ok(0); };
        let now = Instant::now();
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let entries: Vec<SnapEntry> = self.map.read().iter()
            .filter(|(_, v)| v.is_live(now))
            .map(|(k, v)| SnapEntry {
                key: k.clone(),
                value: v.value.clone(),
                remaining_ms: v.expires_at.map(|e| e.saturating_duration_since(now).as_millis() as u64),
            })
            .collect();
        let n = entries.len();
        let snap = Snapshot { version: 1, created_ms: now_ms, entries };
        let bytes = bincode::serialize(&snap)?;
        if let Some(dir) = p.path.parent() { std::fs::create_dir_all(dir).ok(); }
        let tmp = p.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &p.path)?;
        Ok(n)
    }

    /// Load the snapshot file into memory, replacing current contents. Missing file is not an error.
    pub fn load_snapshot(&self) -> anyhow::Result<usize> {
        let Some(p) = self.settings.persistence.as_ref() else { return Ok(0); };
        if !p.path.exists() { return Ok(0); }
        let bytes = std::fs::read(&p.path)?;
        let snap: Snapshot = bincode::deserialize(&bytes)?;
        let now = Instant::now();
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        // Time spent on disk counts against every TTL.
        let on_disk_ms = u64::try_from(now_ms.saturating_sub(snap.created_ms)).unwrap_or(0);
        let mut w = self.map.write();
        w.clear();
        for e in snap.entries.into_iter() {
            let expires_at = match e.remaining_ms {
                Some(rem) if rem <= on_disk_ms => continue,
                Some(rem) => Some(now + Duration::from_millis(rem - on_disk_ms)),
                None => None,
            };
            w.insert(e.key, Entry { value: e.value, expires_at });
        }
        Ok(w.len())
    }
}
