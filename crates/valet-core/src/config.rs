use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol limits and budgets shared across crates.
pub const DEFAULT_PORT: u16 = 18620;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per duplex frame
pub const MAX_TEXT_LEN: usize = 1000;

pub const HISTORY_LIMIT: usize = 20; // interactions kept per conversation
pub const CONTEXT_IDLE_MINUTES: i64 = 30;
pub const CONTEXT_LOCAL_CAPACITY: usize = 100;

pub const SESSION_IDLE_CUTOFF_SECS: i64 = 300;
pub const JANITOR_INTERVAL_SECS: u64 = 60;

pub const MAX_WORKFLOW_STEPS: usize = 10;
pub const STEP_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 30;
pub const MIN_DISPATCH_TIMEOUT_SECS: u64 = 1;
pub const MAX_DISPATCH_TIMEOUT_SECS: u64 = 300;

pub const TOKEN_LIFETIME_SECS: i64 = 3600;
pub const MOBILE_TOKEN_LIFETIME_SECS: i64 = 24 * 3600;
pub const TOKEN_EXPIRING_SOON_SECS: i64 = 300;

/// Top-level config (valet.toml + VALET_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValetConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl Default for ValetConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            broker: BrokerConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Token signing and API-key catalog.
///
/// `api_keys` maps an API key to the user id it authenticates as.
/// `service_keys` lists recognized external-service credentials that are
/// also accepted for token issuance (keyed the same way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_secret")]
    pub secret: String,
    #[serde(default = "default_api_keys")]
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default)]
    pub service_keys: Vec<ApiKeyEntry>,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: i64,
    #[serde(default = "default_mobile_lifetime")]
    pub mobile_token_lifetime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            api_keys: default_api_keys(),
            service_keys: Vec::new(),
            token_lifetime_secs: TOKEN_LIFETIME_SECS,
            mobile_token_lifetime_secs: MOBILE_TOKEN_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub local_capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_batch_timeout")]
    pub timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            timeout_ms: default_batch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrokerConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
}

/// OpenAI-compatible chat endpoint used by the AI tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key: None,
            default_model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "bool_true")]
    pub duckduckgo: bool,
    #[serde(default = "bool_true")]
    pub wikipedia: bool,
    #[serde(default = "default_search_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            duckduckgo: true,
            wikipedia: true,
            cache_ttl_secs: default_search_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_buffer")]
    pub buffer_capacity: usize,
    #[serde(default = "default_analytics_batch")]
    pub batch_size: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_analytics_buffer(),
            batch_size: default_analytics_batch(),
            retention_days: default_retention_days(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_secret() -> String {
    "change-me".to_string()
}
fn default_api_keys() -> Vec<ApiKeyEntry> {
    vec![
        ApiKeyEntry {
            key: "demo_key_123".to_string(),
            user_id: "demo_user".to_string(),
        },
        ApiKeyEntry {
            key: "test_key_456".to_string(),
            user_id: "test_user".to_string(),
        },
    ]
}
fn default_token_lifetime() -> i64 {
    TOKEN_LIFETIME_SECS
}
fn default_mobile_lifetime() -> i64 {
    MOBILE_TOKEN_LIFETIME_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.valet/valet.db", home)
}
fn default_cache_capacity() -> usize {
    1000
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_timeout() -> u64 {
    5000
}
fn default_dispatch_timeout() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_SECS
}
fn default_ai_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "valet-chat-1".to_string()
}
fn default_search_cache_ttl() -> u64 {
    3600
}
fn default_analytics_buffer() -> usize {
    1000
}
fn default_analytics_batch() -> usize {
    100
}
fn default_retention_days() -> i64 {
    30
}

impl ValetConfig {
    /// Load config from a TOML file with VALET_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ValetConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VALET_").split("_"))
            .extract()
            .map_err(|e| crate::error::ValetError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.valet/valet.toml", home)
}
