use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};
use crate::kv::KvStore;

/// In-process KV used when no database path is configured, and by tests.
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, (String, Option<Instant>)>>,
    sets: Mutex<HashMap<String, (BTreeSet<String>, Option<Instant>)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

fn live(expiry: &Option<Instant>) -> bool {
    expiry.map(|at| at > Instant::now()).unwrap_or(true)
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        let alive = match values.get(key) {
            Some((_, expiry)) => live(expiry),
            None => return Ok(None),
        };
        if !alive {
            values.remove(key);
            return Ok(None);
        }
        Ok(values.get(key).map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        values.insert(key.to_string(), (value.to_string(), deadline(ttl)));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        values.remove(key);
        Ok(())
    }

    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<()> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        let entry = sets
            .entry(key.to_string())
            .or_insert_with(|| (BTreeSet::new(), None));
        entry.0.insert(member.to_string());
        entry.1 = deadline(ttl);
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        let alive = match sets.get(key) {
            Some((_, expiry)) => live(expiry),
            None => return Ok(Vec::new()),
        };
        if !alive {
            sets.remove(key);
            return Ok(Vec::new());
        }
        Ok(sets
            .get(key)
            .map(|(members, _)| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        if let Some((members, _)) = sets.get_mut(key) {
            members.remove(member);
        }
        Ok(())
    }

    fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("kv mutex poisoned".into()))?;
        let next = match values.get(key) {
            Some((value, expiry)) if live(expiry) => value.parse::<i64>().unwrap_or(0) + delta,
            _ => delta,
        };
        let expiry = match values.get(key) {
            Some((_, expiry)) if live(expiry) => *expiry,
            _ => deadline(ttl),
        };
        values.insert(key.to_string(), (next.to_string(), expiry));
        Ok(next)
    }
}
