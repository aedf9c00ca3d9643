use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::kv::KvStore;

/// SQLite-backed shared KV tier.
///
/// Wraps a single connection in a `Mutex`; every call is one short
/// critical section. Expired rows are dropped lazily on read and can be
/// swept in bulk with [`purge_expired`](SqliteKv::purge_expired).
pub struct SqliteKv {
    db: Mutex<Connection>,
}

impl SqliteKv {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=3000;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Wrap an already-open connection (tests use in-memory connections).
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn deadline(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|d| now_secs() + d.as_secs() as i64)
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.lock()?;
        let row: Option<(String, Option<i64>)> = match db.query_row(
            "SELECT value, expires_at FROM kv WHERE key = ?1",
            [key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(r) => Some(r),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match row {
            Some((_, Some(exp))) if exp <= now_secs() => {
                db.execute("DELETE FROM kv WHERE key = ?1", [key])?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            rusqlite::params![key, value, deadline(ttl)],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let db = self.lock()?;
        db.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let exp = deadline(ttl);
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv_sets (key, member, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, member) DO UPDATE SET expires_at = ?3",
            rusqlite::params![key, member, exp],
        )?;
        // refresh TTL across the whole set so members expire together
        db.execute(
            "UPDATE kv_sets SET expires_at = ?2 WHERE key = ?1",
            rusqlite::params![key, exp],
        )?;
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = now_secs();
        let db = self.lock()?;
        db.execute(
            "DELETE FROM kv_sets
             WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            rusqlite::params![key, now],
        )?;
        let mut stmt = db.prepare("SELECT member FROM kv_sets WHERE key = ?1 ORDER BY member")?;
        let rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "DELETE FROM kv_sets WHERE key = ?1 AND member = ?2",
            rusqlite::params![key, member],
        )?;
        Ok(())
    }

    fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = CAST(CAST(kv.value AS INTEGER) + ?2 AS TEXT)",
            rusqlite::params![key, delta.to_string(), deadline(ttl)],
        )?;
        let value: String =
            db.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })?;
        Ok(value.parse::<i64>().unwrap_or(0))
    }

    /// Rows also expire lazily on read; this sweep keeps the tables from
    /// accumulating dead entries between reads.
    fn purge_expired(&self) -> Result<usize> {
        let now = now_secs();
        let db = self.lock()?;
        let kv = db.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now],
        )?;
        let sets = db.execute(
            "DELETE FROM kv_sets WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            [now],
        )?;
        if kv + sets > 0 {
            debug!(dropped = kv + sets, "purged expired kv rows");
        }
        Ok(kv + sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteKv {
        SqliteKv::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn set_get_round_trip() {
        let kv = store();
        kv.set("context:u1:s1", "{\"a\":1}", None).unwrap();
        assert_eq!(kv.get("context:u1:s1").unwrap().as_deref(), Some("{\"a\":1}"));
        kv.delete("context:u1:s1").unwrap();
        assert_eq!(kv.get("context:u1:s1").unwrap(), None);
    }

    #[test]
    fn expired_entry_reads_as_miss() {
        let kv = store();
        kv.set("k", "v", Some(Duration::from_secs(0))).unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
    }

    #[test]
    fn sets_track_membership() {
        let kv = store();
        kv.set_add("user_sessions:u1", "s1", None).unwrap();
        kv.set_add("user_sessions:u1", "s2", None).unwrap();
        kv.set_add("user_sessions:u1", "s1", None).unwrap();
        assert_eq!(kv.set_members("user_sessions:u1").unwrap(), vec!["s1", "s2"]);
        kv.set_remove("user_sessions:u1", "s1").unwrap();
        assert_eq!(kv.set_members("user_sessions:u1").unwrap(), vec!["s2"]);
    }

    #[test]
    fn counters_accumulate() {
        let kv = store();
        assert_eq!(kv.incr_by("usage:x:m:2026-01-01", 10, None).unwrap(), 10);
        assert_eq!(kv.incr_by("usage:x:m:2026-01-01", 5, None).unwrap(), 15);
    }

    #[test]
    fn purge_sweeps_expired_rows() {
        let kv = store();
        kv.set("stale", "v", Some(Duration::from_secs(0))).unwrap();
        kv.set("fresh", "v", Some(Duration::from_secs(600))).unwrap();
        assert_eq!(kv.purge_expired().unwrap(), 1);
        assert_eq!(kv.get("fresh").unwrap().as_deref(), Some("v"));
    }
}
