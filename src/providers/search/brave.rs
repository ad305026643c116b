//! Primary search stage: paid, high-quality web search API with a key pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::BudgetConfig;
use crate::providers::budget::BudgetManager;
use crate::providers::circuit::CircuitBreaker;
use crate::providers::http_client::SharedHttpClient;
use crate::providers::key_rotator::KeyRotator;
use crate::providers::search::{SearchResult, SearchStage};

const API_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const RATE_LIMIT_KEY: &str = "search_primary";

pub struct BraveSearch {
    http: Arc<SharedHttpClient>,
    keys: Mutex<KeyRotator>,
    budget: Mutex<BudgetManager>,
    circuit: Mutex<CircuitBreaker>,
    component: &'static str,
}

impl BraveSearch {
    pub fn new(http: Arc<SharedHttpClient>, keys: Vec<String>, budget: &BudgetConfig) -> Self {
        Self {
            http,
            keys: Mutex::new(KeyRotator::new("brave", keys)),
            budget: Mutex::new(BudgetManager::new("brave", budget)),
            circuit: Mutex::new(CircuitBreaker::new("brave")),
            component: "news_radar",
        }
    }

    async fn request_once(&self, key: &str, query: &str, limit: usize) -> Result<crate::providers::http_client::HttpResponse> {
        self.http
            .get(
                API_URL,
                RATE_LIMIT_KEY,
                &[
                    ("q", query.to_string()),
                    ("count", limit.to_string()),
                    ("freshness", "pw".to_string()),
                ],
                &[
                    ("Accept", "application/json".to_string()),
                    ("X-Subscription-Token", key.to_string()),
                ],
            )
            .await
    }

    fn parse(&self, body: &serde_json::Value) -> Vec<SearchResult> {
        let mut out = Vec::new();
        let results = body
            .pointer("/web/results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for item in results {
            let title = item["title"].as_str().unwrap_or_default().to_string();
            let url = item["url"].as_str().unwrap_or_default().to_string();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            out.push(SearchResult {
                title,
                url,
                snippet: item["description"].as_str().unwrap_or_default().to_string(),
                source: "brave".to_string(),
            });
        }
        out
    }
}

#[async_trait]
impl SearchStage for BraveSearch {
    fn name(&self) -> &'static str {
        "brave"
    }

    fn supports_negative_operators(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        let now = Utc::now();
        if !self.keys.lock().is_available(now) {
            return false;
        }
        if !self.budget.lock().can_call(self.component, false, now) {
            return false;
        }
        self.circuit.lock().should_allow(now)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let now = Utc::now();
        let key = self
            .keys
            .lock()
            .current(now)
            .context("no primary search key available")?;

        let mut response = self.request_once(&key, query, limit).await?;

        // Quota statuses exhaust the key; one retry with the next one.
        if response.is_quota_exhausted() {
            warn!(status = response.status, "Primary search key exhausted, rotating");
            let retry_key = {
                let mut keys = self.keys.lock();
                keys.mark_exhausted(None, now);
                keys.current(now)
            };
            match retry_key {
                Some(k) => response = self.request_once(&k, query, limit).await?,
                None => {
                    self.circuit.lock().record_failure(now);
                    anyhow::bail!("all primary search keys exhausted");
                }
            }
        }

        if !response.is_success() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!("primary search HTTP {}", response.status);
        }

        let body = match response.json() {
            Ok(v) => v,
            Err(e) => {
                self.circuit.lock().record_failure(now);
                return Err(e);
            }
        };

        self.keys.lock().record_call();
        self.budget.lock().record_call(self.component, now);
        self.circuit.lock().record_success();

        let results = self.parse(&body);
        debug!(results = results.len(), "Primary search returned");
        Ok(results)
    }
}
