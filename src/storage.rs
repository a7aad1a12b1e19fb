//!
//! sessiongate storage module
//! --------------------------
//! In-process expiring key-value storage backing the session registry. Values are plain
//! strings (the shape a Redis-style registry would hold); expiry is per key and checked on
//! every read, with a periodic sweep and optional snapshot persistence to disk.

pub mod kv;

pub use kv::{KvStore, StoreSettings, PersistenceSettings};
