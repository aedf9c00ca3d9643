use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Message handed to a session's connection pump.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(String),
    /// Tells the pump to close the transport and exit.
    Close,
}

/// Outbound channel depth per session. Messages sent by the server are
/// delivered in send order within one session.
pub const SESSION_CHANNEL_CAPACITY: usize = 64;

/// One open duplex connection.
pub struct SessionHandle {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    message_count: AtomicU64,
    open: AtomicBool,
    tx: mpsc::Sender<Outbound>,
    pub(crate) groups: Mutex<HashSet<String>>,
}

impl SessionHandle {
    pub(crate) fn new(client_id: &str) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let handle = Self {
            client_id: client_id.to_string(),
            connected_at: Utc::now(),
            last_activity_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            message_count: AtomicU64::new(0),
            open: AtomicBool::new(true),
            tx,
            groups: Mutex::new(HashSet::new()),
        };
        (handle, rx)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn touch(&self) {
        let now = Utc::now().timestamp_millis();
        // monotone: never move activity backwards
        self.last_activity_ms.fetch_max(now, Ordering::AcqRel);
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn rewind_activity_for_test(&self, ms: i64) {
        self.last_activity_ms.store(ms, Ordering::Release);
    }

    pub fn idle_secs(&self) -> i64 {
        (Utc::now().timestamp_millis() - self.last_activity_ms()) / 1000
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Queue one outbound message, preserving per-session send order.
    pub async fn send(&self, payload: String) -> bool {
        if !self.is_open() {
            return false;
        }
        let delivered = self.tx.send(Outbound::Text(payload)).await.is_ok();
        if delivered {
            self.message_count.fetch_add(1, Ordering::Relaxed);
            self.touch();
        }
        delivered
    }

    /// Non-blocking variant used for pings and broadcasts: a full channel
    /// counts as a failed best-effort delivery.
    pub fn try_send(&self, payload: String) -> bool {
        if !self.is_open() {
            return false;
        }
        let delivered = self.tx.try_send(Outbound::Text(payload)).is_ok();
        if delivered {
            self.message_count.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    pub(crate) fn request_close(&self) {
        self.mark_closed();
        let _ = self.tx.try_send(Outbound::Close);
    }

    pub fn groups(&self) -> Vec<String> {
        self.groups
            .lock()
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            client_id: self.client_id.clone(),
            connected_at: self.connected_at,
            last_activity_ms: self.last_activity_ms(),
            message_count: self.message_count(),
            groups: self.groups(),
            open: self.is_open(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity_ms: i64,
    pub message_count: u64,
    pub groups: Vec<String>,
    pub open: bool,
}
