use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use valet_store::KvStore;

use crate::error::{BrokerError, Result};
use crate::tool::{opt_u64, require_str, ToolServer};

const AUTHORITATIVE_DOMAINS: &[&str] = &["wikipedia.org", "britannica.com", ".gov", ".edu"];
const AUTHORITY_BOOST: f64 = 0.2;
const TITLE_MATCH_BOOST: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub relevance_score: f64,
}

/// One upstream search backend. Implementations are thin HTTP adapters;
/// a failed provider contributes nothing to the fan-out.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}

/// Composite ranking: base relevance, plus a boost for authoritative
/// domains, plus a smaller boost when the query appears in the title.
fn rank_score(result: &SearchResult, query: &str) -> f64 {
    let mut score = result.relevance_score;
    let url = result.url.to_lowercase();
    if AUTHORITATIVE_DOMAINS.iter().any(|d| url.contains(d)) {
        score += AUTHORITY_BOOST;
    }
    if result.title.to_lowercase().contains(&query.to_lowercase()) {
        score += TITLE_MATCH_BOOST;
    }
    score
}

/// Merge fan-out results: dedup by URL (first occurrence wins), sort by
/// descending composite score, truncate to the requested count.
pub fn merge_and_rank(
    results: Vec<SearchResult>,
    query: &str,
    limit: usize,
) -> Vec<SearchResult> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| !r.url.is_empty() && seen.insert(r.url.clone()))
        .collect();

    unique.sort_by(|a, b| {
        rank_score(b, query)
            .partial_cmp(&rank_score(a, query))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    unique.truncate(limit);
    unique
}

/// Search tool: concurrent fan-out over the enabled providers with a
/// shared-KV result cache.
pub struct SearchTool {
    providers: Vec<Arc<dyn SearchProvider>>,
    kv: Option<Arc<dyn KvStore>>,
    cache_ttl: Duration,
}

impl SearchTool {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        kv: Option<Arc<dyn KvStore>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            providers,
            kv,
            cache_ttl,
        }
    }

    fn cache_key(operation: &str, query: &str, limit: usize, search_type: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{operation}:{query}:{limit}:{search_type}"));
        format!("search_cache:{}", hex::encode(hasher.finalize()))
    }

    async fn fan_out(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let calls = self
            .providers
            .iter()
            .map(|p| {
                let provider = p.clone();
                let query = query.to_string();
                async move {
                    match provider.search(&query, limit).await {
                        Ok(results) => results,
                        Err(e) => {
                            warn!(provider = provider.name(), err = %e, "search provider failed");
                            Vec::new()
                        }
                    }
                }
            })
            .collect::<Vec<_>>();

        futures_util::future::join_all(calls)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn web_search(&self, params: &Value) -> Result<Value> {
        let query = require_str(params, "query")?;
        let limit = opt_u64(params, "num_results").unwrap_or(10) as usize;
        let search_type = params
            .get("search_type")
            .and_then(|v| v.as_str())
            .unwrap_or("general");

        let cache_key = Self::cache_key("web_search", query, limit, search_type);
        if let Some(kv) = &self.kv {
            if let Ok(Some(blob)) = kv.get(&cache_key) {
                if let Ok(cached) = serde_json::from_str::<Vec<SearchResult>>(&blob) {
                    debug!(query, "search cache hit");
                    return Ok(json!({ "query": query, "results": cached, "cached": true }));
                }
            }
        }

        let merged = merge_and_rank(self.fan_out(query, limit).await, query, limit);

        if let Some(kv) = &self.kv {
            if let Ok(blob) = serde_json::to_string(&merged) {
                if let Err(e) = kv.set(&cache_key, &blob, Some(self.cache_ttl)) {
                    warn!(err = %e, "search cache write failed");
                }
            }
        }

        Ok(json!({ "query": query, "results": merged, "cached": false }))
    }

    /// Knowledge queries restrict the fan-out to encyclopedic sources and
    /// report a confidence derived from how authoritative the results are.
    async fn knowledge_query(&self, params: &Value) -> Result<Value> {
        let query = require_str(params, "query")?;
        let limit = opt_u64(params, "num_results").unwrap_or(5) as usize;

        let merged = merge_and_rank(self.fan_out(query, limit).await, query, limit);
        let authoritative = merged
            .iter()
            .filter(|r| {
                let url = r.url.to_lowercase();
                AUTHORITATIVE_DOMAINS.iter().any(|d| url.contains(d))
            })
            .count();
        let confidence = if merged.is_empty() {
            0.0
        } else {
            (authoritative as f64 / merged.len() as f64 + 0.3).min(1.0)
        };

        Ok(json!({ "query": query, "results": merged, "confidence_score": confidence }))
    }
}

#[async_trait]
impl ToolServer for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "web_search".to_string(),
            "knowledge_query".to_string(),
            "fact_check".to_string(),
            "research".to_string(),
        ]
    }

    async fn execute(&self, command: &str, params: Value) -> Result<Value> {
        match command {
            "web_search" | "research" => self.web_search(&params).await,
            "knowledge_query" | "fact_check" => self.knowledge_query(&params).await,
            other => Err(BrokerError::UnsupportedCommand {
                name: "search".to_string(),
                command: other.to_string(),
            }),
        }
    }
}

// Thin HTTP adapters for the public search endpoints.

pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.duckduckgo.com".to_string(),
        }
    }
}

impl Default for DuckDuckGoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct DdgResponse {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<DdgTopic>,
}

#[derive(Deserialize)]
struct DdgTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    BrokerError::ToolError(format!("duckduckgo unavailable: {e}"))
                } else {
                    BrokerError::Http(e)
                }
            })?;

        let body: DdgResponse = resp
            .json()
            .await
            .map_err(|e| BrokerError::ToolError(format!("duckduckgo parse: {e}")))?;

        let mut results = Vec::new();
        if !body.abstract_text.is_empty() && !body.abstract_url.is_empty() {
            results.push(SearchResult {
                title: body.heading,
                url: body.abstract_url,
                snippet: body.abstract_text,
                source: "duckduckgo".to_string(),
                relevance_score: 0.8,
            });
        }
        for topic in body.related_topics.into_iter().take(limit) {
            if !topic.first_url.is_empty() {
                results.push(SearchResult {
                    title: topic.text.chars().take(80).collect(),
                    url: topic.first_url,
                    snippet: topic.text,
                    source: "duckduckgo".to_string(),
                    relevance_score: 0.6,
                });
            }
        }
        results.truncate(limit);
        Ok(results)
    }
}

pub struct WikipediaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl WikipediaProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://en.wikipedia.org".to_string(),
        }
    }
}

impl Default for WikipediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct WikiSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<WikiContentUrls>,
}

#[derive(Deserialize)]
struct WikiContentUrls {
    desktop: WikiPageUrl,
}

#[derive(Deserialize)]
struct WikiPageUrl {
    page: String,
}

#[async_trait]
impl SearchProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
        let title = query.replace(' ', "_");
        let resp = self
            .client
            .get(format!(
                "{}/api/rest_v1/page/summary/{title}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    BrokerError::ToolError(format!("wikipedia unavailable: {e}"))
                } else {
                    BrokerError::Http(e)
                }
            })?;

        if !resp.status().is_success() {
            return Ok(Vec::new());
        }

        let body: WikiSummary = resp
            .json()
            .await
            .map_err(|e| BrokerError::ToolError(format!("wikipedia parse: {e}")))?;

        if body.extract.is_empty() {
            return Ok(Vec::new());
        }

        let url = body
            .content_urls
            .map(|u| u.desktop.page)
            .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{title}"));

        Ok(vec![SearchResult {
            title: body.title,
            url,
            snippet: body.extract,
            source: "wikipedia".to_string(),
            relevance_score: 1.0,
        }])
    }
}
