use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use valet_protocol::OutboundMessage;
use valet_store::KvStore;

use crate::error::{Result, SessionError};
use crate::types::{Outbound, SessionHandle, SessionStats};

const CONNECTION_META_TTL: Duration = Duration::from_secs(3600);

/// Process-global registry of open duplex sessions.
///
/// Client ids are unique while open: reconnecting under a live id closes
/// the previous session first. Group membership is symmetric — the
/// session lists the group and the group lists the session.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    groups: DashMap<String, HashSet<String>>,
    kv: Option<Arc<dyn KvStore>>,
}

impl SessionRegistry {
    pub fn new(kv: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            sessions: DashMap::new(),
            groups: DashMap::new(),
            kv,
        }
    }

    /// Register a new session and queue its welcome event. Returns the
    /// handle plus the receiver the connection pump drains.
    pub fn connect(&self, client_id: &str) -> (Arc<SessionHandle>, mpsc::Receiver<Outbound>) {
        if let Some((_, stale)) = self.sessions.remove(client_id) {
            warn!(client_id, "client reconnected, closing previous session");
            self.leave_all_groups(&stale);
            stale.request_close();
        }

        let (handle, rx) = SessionHandle::new(client_id);
        let handle = Arc::new(handle);
        handle.try_send(OutboundMessage::welcome(client_id).to_json());
        self.sessions.insert(client_id.to_string(), handle.clone());

        if let Some(kv) = &self.kv {
            let meta = serde_json::json!({
                "client_id": client_id,
                "connected_at": handle.connected_at.to_rfc3339(),
            });
            if let Err(e) = kv.set(
                &format!("ws_connections:{client_id}"),
                &meta.to_string(),
                Some(CONNECTION_META_TTL),
            ) {
                warn!(err = %e, "connection metadata write failed");
            }
        }

        info!(client_id, open = self.sessions.len(), "session connected");
        (handle, rx)
    }

    /// Close a session and remove it from every group.
    pub fn disconnect(&self, client_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(client_id) {
            self.leave_all_groups(&handle);
            handle.request_close();
            if let Some(kv) = &self.kv {
                let _ = kv.delete(&format!("ws_connections:{client_id}"));
            }
            info!(client_id, open = self.sessions.len(), "session disconnected");
        }
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(client_id).map(|h| h.value().clone())
    }

    pub async fn send_personal(&self, client_id: &str, message: &OutboundMessage) -> Result<()> {
        let handle = self.get(client_id).ok_or_else(|| SessionError::NotFound {
            client_id: client_id.to_string(),
        })?;
        if handle.send(message.to_json()).await {
            Ok(())
        } else {
            Err(SessionError::Closed {
                client_id: client_id.to_string(),
            })
        }
    }

    /// Best-effort fan-out to every open session. A failed recipient does
    /// not fail the broadcast; returns the delivered count.
    pub fn broadcast(&self, message: &OutboundMessage, except: Option<&str>) -> usize {
        let payload = message.to_json();
        let handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .iter()
            .filter(|e| except.map(|x| e.key() != x).unwrap_or(true))
            .map(|e| e.value().clone())
            .collect();

        let mut delivered = 0;
        for handle in handles {
            if handle.try_send(payload.clone()) {
                delivered += 1;
            } else {
                debug!(client_id = %handle.client_id, "broadcast delivery failed");
            }
        }
        delivered
    }

    pub fn send_group(&self, group: &str, message: &OutboundMessage) -> Result<usize> {
        let members: Vec<String> = self
            .groups
            .get(group)
            .map(|g| g.iter().cloned().collect())
            .ok_or_else(|| SessionError::GroupNotFound {
                group: group.to_string(),
            })?;

        let payload = message.to_json();
        let mut delivered = 0;
        for client_id in members {
            if let Some(handle) = self.get(&client_id) {
                if handle.try_send(payload.clone()) {
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }

    pub fn add_to_group(&self, client_id: &str, group: &str) -> Result<()> {
        let handle = self.get(client_id).ok_or_else(|| SessionError::NotFound {
            client_id: client_id.to_string(),
        })?;

        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(client_id.to_string());
        if let Ok(mut groups) = handle.groups.lock() {
            groups.insert(group.to_string());
        }
        debug!(client_id, group, "added to group");
        Ok(())
    }

    pub fn remove_from_group(&self, client_id: &str, group: &str) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(client_id);
        }
        self.groups.remove_if(group, |_, members| members.is_empty());
        if let Some(handle) = self.get(client_id) {
            if let Ok(mut groups) = handle.groups.lock() {
                groups.remove(group);
            }
        }
    }

    /// Liveness probe across every session.
    pub fn ping_all(&self) -> HashMap<String, bool> {
        let ping = OutboundMessage::ping().to_json();
        self.sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().try_send(ping.clone())))
            .collect()
    }

    /// Sessions idle beyond `cutoff_secs`, oldest first.
    pub fn idle_sessions(&self, cutoff_secs: i64) -> Vec<String> {
        let mut idle: Vec<(String, i64)> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_secs() > cutoff_secs)
            .map(|e| (e.key().clone(), e.value().idle_secs()))
            .collect();
        idle.sort_by_key(|(_, secs)| std::cmp::Reverse(*secs));
        idle.into_iter().map(|(id, _)| id).collect()
    }

    /// Graceful shutdown: notify every session, then disconnect them all.
    pub fn shutdown_all(&self) {
        self.broadcast(&OutboundMessage::server_shutdown(), None);
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for client_id in ids {
            self.disconnect(&client_id);
        }
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> Vec<SessionStats> {
        self.sessions.iter().map(|e| e.value().stats()).collect()
    }

    fn leave_all_groups(&self, handle: &Arc<SessionHandle>) {
        for group in handle.groups() {
            if let Some(mut members) = self.groups.get_mut(&group) {
                members.remove(&handle.client_id);
            }
            self.groups.remove_if(&group, |_, members| members.is_empty());
        }
    }
}
