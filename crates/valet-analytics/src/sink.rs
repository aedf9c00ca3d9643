use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::profile::apply_event;
use crate::types::{AnalyticsEvent, UserProfile};

const BATCH_TICK_SECS: u64 = 1;
const CLEANER_TICK_SECS: u64 = 3600;

/// Append-only event recorder feeding the background profile updater.
///
/// `track` never blocks the request path: the buffer is bounded and the
/// oldest events are dropped under overload. Loss is acceptable for this
/// subsystem.
pub struct AnalyticsSink {
    buffer: Mutex<VecDeque<AnalyticsEvent>>,
    capacity: usize,
    batch_size: usize,
    profiles: DashMap<String, UserProfile>,
    tracked: AtomicU64,
    dropped: AtomicU64,
}

impl AnalyticsSink {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            batch_size: batch_size.max(1),
            profiles: DashMap::new(),
            tracked: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Record one event. Non-blocking with respect to the hot path.
    pub fn track(&self, event: AnalyticsEvent) {
        let Ok(mut buffer) = self.buffer.lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(event);
        self.tracked.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain up to one batch into the per-user profiles. Returns the
    /// number of events applied.
    pub fn drain_batch(&self) -> usize {
        let batch: Vec<AnalyticsEvent> = {
            let Ok(mut buffer) = self.buffer.lock() else {
                return 0;
            };
            let take = buffer.len().min(self.batch_size);
            buffer.drain(..take).collect()
        };

        for event in &batch {
            let mut profile = self
                .profiles
                .entry(event.user_id.clone())
                .or_insert_with(|| UserProfile::new(&event.user_id));
            apply_event(&mut profile, event);
        }
        if !batch.is_empty() {
            debug!(count = batch.len(), "analytics batch applied");
        }
        batch.len()
    }

    /// Drop profiles inactive beyond the retention window. Returns the
    /// number removed.
    pub fn clean_stale_profiles(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let before = self.profiles.len();
        self.profiles.retain(|_, p| p.last_active >= cutoff);
        before - self.profiles.len()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id).map(|p| p.value().clone())
    }

    pub fn metrics(&self) -> AnalyticsMetrics {
        AnalyticsMetrics {
            tracked: self.tracked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            buffered: self.buffer.lock().map(|b| b.len()).unwrap_or(0),
            profiles: self.profiles.len(),
        }
    }

    /// Batch drainer loop: one batch per tick, plus a final drain on
    /// shutdown so short-lived processes still update profiles.
    pub async fn run_batcher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(batch_size = self.batch_size, "analytics batcher started");
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(BATCH_TICK_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain_batch();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        while self.drain_batch() > 0 {}
                        info!("analytics batcher stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Retention cleaner loop.
    pub async fn run_cleaner(
        self: Arc<Self>,
        retention_days: i64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(retention_days, "analytics cleaner started");
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(CLEANER_TICK_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.clean_stale_profiles(retention_days);
                    if removed > 0 {
                        info!(removed, "stale profiles dropped");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("analytics cleaner stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsMetrics {
    pub tracked: u64,
    pub dropped: u64,
    pub buffered: usize,
    pub profiles: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use serde_json::json;

    fn event(user: &str) -> AnalyticsEvent {
        AnalyticsEvent::new(
            EventKind::Command,
            user,
            "s",
            json!({ "category": "email", "success": true, "text_length": 10 }),
        )
    }

    #[test]
    fn track_then_drain_updates_profiles() {
        let sink = AnalyticsSink::new(100, 10);
        for _ in 0..3 {
            sink.track(event("u1"));
        }
        assert_eq!(sink.metrics().buffered, 3);

        assert_eq!(sink.drain_batch(), 3);
        let profile = sink.profile("u1").unwrap();
        assert_eq!(profile.total_commands, 3);
        assert_eq!(sink.metrics().buffered, 0);
    }

    #[test]
    fn overflow_drops_oldest_without_blocking() {
        let sink = AnalyticsSink::new(5, 10);
        for _ in 0..8 {
            sink.track(event("u1"));
        }
        let m = sink.metrics();
        assert_eq!(m.buffered, 5);
        assert_eq!(m.dropped, 3);
        assert_eq!(m.tracked, 8);
    }

    #[test]
    fn drain_respects_batch_size() {
        let sink = AnalyticsSink::new(100, 4);
        for _ in 0..10 {
            sink.track(event("u1"));
        }
        assert_eq!(sink.drain_batch(), 4);
        assert_eq!(sink.metrics().buffered, 6);
    }

    #[test]
    fn stale_profiles_are_cleaned() {
        let sink = AnalyticsSink::new(100, 10);
        sink.track(event("old-user"));
        sink.drain_batch();

        // nothing stale yet
        assert_eq!(sink.clean_stale_profiles(30), 0);

        // age the profile past the retention window
        sink.profiles.get_mut("old-user").unwrap().last_active =
            Utc::now() - ChronoDuration::days(31);
        assert_eq!(sink.clean_stale_profiles(30), 1);
        assert!(sink.profile("old-user").is_none());
    }
}
