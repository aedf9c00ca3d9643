use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use valet_core::config::{JANITOR_INTERVAL_SECS, SESSION_IDLE_CUTOFF_SECS};

use crate::registry::SessionRegistry;

/// Background sweep disconnecting sessions idle beyond the cutoff.
/// Runs every [`JANITOR_INTERVAL_SECS`] until `shutdown` flips to true.
pub async fn run(registry: Arc<SessionRegistry>, mut shutdown: watch::Receiver<bool>) {
    info!(
        interval = JANITOR_INTERVAL_SECS,
        cutoff = SESSION_IDLE_CUTOFF_SECS,
        "session janitor started"
    );
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(JANITOR_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let idle = registry.idle_sessions(SESSION_IDLE_CUTOFF_SECS);
                if !idle.is_empty() {
                    info!(count = idle.len(), "disconnecting idle sessions");
                }
                for client_id in idle {
                    registry.disconnect(&client_id);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("session janitor stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn idle_detection_uses_cutoff() {
        let registry = SessionRegistry::new(None);
        let (handle, _rx) = registry.connect("stale");

        // fresh session: not idle
        assert!(registry.idle_sessions(SESSION_IDLE_CUTOFF_SECS).is_empty());

        // age the session past the cutoff by rewinding its activity stamp
        let past = Utc::now().timestamp_millis() - (SESSION_IDLE_CUTOFF_SECS + 10) * 1000;
        handle.rewind_activity_for_test(past);
        assert_eq!(
            registry.idle_sessions(SESSION_IDLE_CUTOFF_SECS),
            vec!["stale".to_string()]
        );
    }
}
