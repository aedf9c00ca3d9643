use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod app;
mod auth;
mod error;
mod http;
mod ws;

use app::{AppState, QueueClassifier};
use valet_classifier::BatchClassifier;

#[derive(Parser)]
#[command(name = "valet-gateway", version, about = "Voice assistant backend gateway")]
struct Args {
    /// Path to valet.toml (defaults to ~/.valet/valet.toml).
    #[arg(long)]
    config: Option<String>,
}

/// Grace period for draining running workflow steps on shutdown.
const SHUTDOWN_GRACE_SECS: u64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "valet_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.or_else(|| std::env::var("VALET_CONFIG").ok());
    let config = valet_core::config::ValetConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            valet_core::config::ValetConfig::default()
        });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(AppState::new(config));

    // bring the tool bank up before accepting traffic; a failed tool is
    // isolated as `error` and simply refuses dispatch
    state.broker.start_all().await;

    // background loops, all stopped via the shared shutdown watch
    let shutdown_rx = state.shutdown_tx.subscribe();
    let janitor = tokio::spawn(valet_sessions::janitor::run(
        state.sessions.clone(),
        shutdown_rx.clone(),
    ));
    let batcher = tokio::spawn(
        state
            .analytics
            .clone()
            .run_batcher(shutdown_rx.clone()),
    );
    let cleaner = tokio::spawn(state.analytics.clone().run_cleaner(
        state.config.analytics.retention_days,
        shutdown_rx.clone(),
    ));
    let queue_classifier: Arc<dyn BatchClassifier> =
        Arc::new(QueueClassifier::new(state.engine.clone()));
    let drainer = tokio::spawn(
        state
            .batch
            .clone()
            .run(queue_classifier, shutdown_rx.clone()),
    );
    let maintenance = tokio::spawn(maintenance_loop(state.clone(), shutdown_rx));

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("valet gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_state = state.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            serve_state.stop_accepting();
        })
        .await?;

    // ordered teardown: notify + disconnect sessions, give running
    // workflow steps a bounded grace period, stop the background loops,
    // then shut tools down in reverse dependency order
    state.sessions.shutdown_all();
    tokio::time::sleep(std::time::Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
    let _ = state.shutdown_tx.send(true);
    let _ = tokio::join!(janitor, batcher, cleaner, drainer, maintenance);
    state.broker.shutdown().await;

    info!("valet gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Hourly sweep of expired local contexts and dead KV rows.
async fn maintenance_loop(
    state: Arc<AppState>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // skip the immediate first tick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let contexts = state.context.purge_expired();
                if contexts > 0 {
                    info!(contexts, "expired contexts purged");
                }
                if let Some(kv) = &state.kv {
                    match kv.purge_expired() {
                        Ok(rows) if rows > 0 => info!(rows, "expired kv rows purged"),
                        Ok(_) => {}
                        Err(e) => warn!(err = %e, "kv purge failed"),
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
