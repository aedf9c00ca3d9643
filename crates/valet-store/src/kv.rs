use std::time::Duration;

use crate::error::Result;

/// Shared key/value accelerator.
///
/// Never authoritative for correctness: callers treat every failure as a
/// miss and fall back to their local tier. Values are opaque serialized
/// blobs; TTLs are absolute from the time of the write.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Add `member` to the set at `key`, refreshing the set's TTL.
    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()>;

    fn set_members(&self, key: &str) -> Result<Vec<String>>;

    fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    /// Atomically add `delta` to the counter at `key` and return the new
    /// value. The TTL is applied only when the counter is first created.
    fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64>;

    /// Bulk-drop expired entries. Backends that expire lazily on read may
    /// leave this a no-op; returns the number of entries removed.
    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
