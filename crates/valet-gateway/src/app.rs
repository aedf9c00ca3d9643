use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::warn;

use valet_analytics::AnalyticsSink;
use valet_auth::Authenticator;
use valet_broker::document::{DocumentTool, ReferenceRenderer};
use valet_broker::email::{EmailTool, NullTransport};
use valet_broker::providers::{AiProviderTool, OpenAiCompatBackend};
use valet_broker::search::{DuckDuckGoProvider, SearchProvider, SearchTool, WikipediaProvider};
use valet_broker::voice::{UnconfiguredSynthesizer, UnconfiguredTranscriber, VoiceTool};
use valet_broker::{ToolBroker, ToolServer};
use valet_classifier::{
    BatchClassifier, BatchQueue, ClassificationCache, CosineScorer, IntentClassifier,
};
use valet_context::ContextStore;
use valet_core::config::ValetConfig;
use valet_core::types::{ClassificationResult, Utterance};
use valet_sessions::SessionRegistry;
use valet_store::{KvStore, SqliteKv};
use valet_workflow::WorkflowEngine;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
/// Every subsystem is constructor-injected; tests build their own.
pub struct AppState {
    pub config: ValetConfig,
    pub auth: Authenticator,
    pub kv: Option<Arc<dyn KvStore>>,
    pub classifier: Arc<IntentClassifier>,
    pub cache: Arc<ClassificationCache>,
    pub context: Arc<ContextStore>,
    pub broker: Arc<ToolBroker>,
    pub engine: Arc<WorkflowEngine>,
    pub sessions: Arc<SessionRegistry>,
    pub analytics: Arc<AnalyticsSink>,
    pub batch: Arc<BatchQueue>,
    pub shutdown_tx: watch::Sender<bool>,
    pub started_at: DateTime<Utc>,
    accepting: AtomicBool,
}

impl AppState {
    pub fn new(config: ValetConfig) -> Self {
        let kv: Option<Arc<dyn KvStore>> = match SqliteKv::open(&config.database.path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(err = %e, path = %config.database.path, "shared KV unavailable, running local-only");
                None
            }
        };
        Self::with_kv(config, kv)
    }

    /// Shared constructor so tests can inject an in-memory KV.
    pub fn with_kv(config: ValetConfig, kv: Option<Arc<dyn KvStore>>) -> Self {
        let auth = Authenticator::new(config.auth.clone());
        let classifier = Arc::new(IntentClassifier::new(Box::new(CosineScorer::fit())));
        let cache = Arc::new(ClassificationCache::new(
            config.cache.local_capacity,
            Duration::from_secs(config.cache.ttl_secs),
            kv.clone(),
        ));
        let context = Arc::new(ContextStore::new(kv.clone()));
        let broker = Arc::new(
            ToolBroker::new(build_tools(&config, kv.clone()))
                .with_default_timeout(Duration::from_secs(config.broker.dispatch_timeout_secs)),
        );
        let engine = Arc::new(WorkflowEngine::new(
            classifier.clone(),
            cache.clone(),
            context.clone(),
            broker.clone(),
        ));
        let sessions = Arc::new(SessionRegistry::new(kv.clone()));
        let analytics = Arc::new(AnalyticsSink::new(
            config.analytics.buffer_capacity,
            config.analytics.batch_size,
        ));
        let batch = Arc::new(BatchQueue::new(
            config.batch.size,
            Duration::from_millis(config.batch.timeout_ms),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            auth,
            kv,
            classifier,
            cache,
            context,
            broker,
            engine,
            sessions,
            analytics,
            batch,
            shutdown_tx,
            started_at: Utc::now(),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// First phase of graceful shutdown: refuse new connections.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }
}

/// The fixed tool bank, assembled once at startup.
fn build_tools(config: &ValetConfig, kv: Option<Arc<dyn KvStore>>) -> Vec<Arc<dyn ToolServer>> {
    let mut search_providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
    if config.broker.search.duckduckgo {
        search_providers.push(Arc::new(DuckDuckGoProvider::new()));
    }
    if config.broker.search.wikipedia {
        search_providers.push(Arc::new(WikipediaProvider::new()));
    }

    vec![
        Arc::new(DocumentTool::new(Box::new(ReferenceRenderer))),
        Arc::new(EmailTool::new(Box::new(NullTransport), kv.clone())),
        Arc::new(SearchTool::new(
            search_providers,
            kv.clone(),
            Duration::from_secs(config.broker.search.cache_ttl_secs),
        )),
        Arc::new(AiProviderTool::new(
            Arc::new(OpenAiCompatBackend::new(&config.broker.ai)),
            kv,
            config.broker.ai.default_model.clone(),
        )),
        Arc::new(VoiceTool::new(
            Box::new(UnconfiguredTranscriber),
            Box::new(UnconfiguredSynthesizer),
        )),
    ]
}

/// Adapter feeding the priority batch queue with the engine's
/// cache-fronted classification path.
pub struct QueueClassifier {
    engine: Arc<WorkflowEngine>,
}

impl QueueClassifier {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl BatchClassifier for QueueClassifier {
    async fn classify_one(&self, utterance: &Utterance) -> ClassificationResult {
        self.engine.classify(utterance).unwrap_or_else(|e| {
            warn!(err = %e, "queued classification failed");
            ClassificationResult {
                category: valet_core::types::CommandCategory::Unknown,
                intent: valet_core::types::CommandCategory::Unknown.intent(),
                confidence: 0.0,
                parameters: Default::default(),
                raw_text: utterance.text.clone(),
                normalized_text: String::new(),
                context_used: utterance.use_context,
                preprocessing_ms: 0.0,
                classification_ms: 0.0,
                suggestions: Vec::new(),
            }
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // unauthenticated surface
        .route("/health", get(crate::http::health::health_handler))
        .route("/auth/token", post(crate::http::auth::issue_token))
        .route("/tools/status", get(crate::http::tools::tools_status))
        // bearer-protected surface
        .route("/auth/verify", get(crate::http::auth::verify_token))
        .route("/auth/refresh", post(crate::http::auth::refresh_token))
        .route("/voice/classify", post(crate::http::classify::classify))
        .route("/voice/categories", get(crate::http::classify::categories))
        .route(
            "/voice/categories/{category}/patterns",
            get(crate::http::classify::category_patterns),
        )
        .route("/voice/metrics", get(crate::http::classify::classifier_metrics))
        .route(
            "/context/{user_id}/{session_id}/summary",
            get(crate::http::context::summary),
        )
        .route(
            "/context/{user_id}/{session_id}/suggestions",
            get(crate::http::context::suggestions),
        )
        .route(
            "/context/{user_id}/{session_id}/interaction",
            post(crate::http::context::add_interaction),
        )
        .route(
            "/context/{user_id}/{session_id}",
            delete(crate::http::context::clear_session),
        )
        .route("/context/{user_id}", delete(crate::http::context::clear_user))
        .route(
            "/context/{user_id}/sessions",
            get(crate::http::context::user_sessions),
        )
        .route("/workflow/process", post(crate::http::workflow::process))
        .route(
            "/workflow/{workflow_id}",
            get(crate::http::workflow::status),
        )
        .route(
            "/workflow/user/{user_id}",
            get(crate::http::workflow::list_for_user),
        )
        .route(
            "/workflow/{workflow_id}/continue",
            post(crate::http::workflow::continue_workflow),
        )
        .route("/document/generate", post(crate::http::tools::generate_document))
        .route("/email/send", post(crate::http::tools::send_email))
        .route("/search/web", post(crate::http::tools::web_search))
        .route("/ai/process", post(crate::http::tools::ai_process))
        .route("/voice/process", post(crate::http::tools::voice_process))
        .route("/metrics", get(crate::http::metrics::metrics_handler))
        // duplex endpoint
        .route("/ws/{client_id}", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
