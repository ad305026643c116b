//! Last-resort search stage: free unlimited news API with a rotating key
//! pool. Budget counters run for monitoring only; a 429/432 exhausts the
//! active key and retries once on the next.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::BudgetConfig;
use crate::providers::budget::BudgetManager;
use crate::providers::circuit::CircuitBreaker;
use crate::providers::http_client::{HttpResponse, SharedHttpClient};
use crate::providers::key_rotator::KeyRotator;
use crate::providers::search::{SearchResult, SearchStage};

const API_URL: &str = "https://api.mediastack.com/v1/news";
const RATE_LIMIT_KEY: &str = "search_last_resort";

pub struct MediastackSearch {
    http: Arc<SharedHttpClient>,
    keys: Mutex<KeyRotator>,
    budget: Mutex<BudgetManager>,
    circuit: Mutex<CircuitBreaker>,
}

impl MediastackSearch {
    pub fn new(http: Arc<SharedHttpClient>, keys: Vec<String>, budget: &BudgetConfig) -> Self {
        Self {
            http,
            keys: Mutex::new(KeyRotator::new("mediastack", keys)),
            budget: Mutex::new(BudgetManager::new("mediastack", budget)),
            circuit: Mutex::new(CircuitBreaker::new("mediastack")),
        }
    }

    async fn request_once(&self, key: &str, query: &str, limit: usize) -> Result<HttpResponse> {
        self.http
            .get(
                API_URL,
                RATE_LIMIT_KEY,
                &[
                    ("access_key", key.to_string()),
                    ("keywords", query.to_string()),
                    ("languages", "en,it,es,pt,de,fr".to_string()),
                    ("sort", "published_desc".to_string()),
                    ("limit", limit.to_string()),
                ],
                &[],
            )
            .await
    }

    fn parse(&self, body: &serde_json::Value, limit: usize) -> Vec<SearchResult> {
        let mut out = Vec::new();
        for item in body["data"].as_array().cloned().unwrap_or_default() {
            if out.len() >= limit {
                break;
            }
            let title = item["title"].as_str().unwrap_or_default();
            let url = item["url"].as_str().unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            let source_name = item["source"].as_str().unwrap_or_default();
            out.push(SearchResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: crate::util::truncate_chars(
                    item["description"].as_str().unwrap_or_default(),
                    350,
                ),
                source: if source_name.is_empty() {
                    "mediastack".to_string()
                } else {
                    format!("mediastack:{source_name}")
                },
            });
        }
        out
    }
}

#[async_trait]
impl SearchStage for MediastackSearch {
    fn name(&self) -> &'static str {
        "mediastack"
    }

    fn is_available(&self) -> bool {
        let now = Utc::now();
        self.keys.lock().is_available(now) && self.circuit.lock().should_allow(now)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let now = Utc::now();
        let key = self
            .keys
            .lock()
            .current(now)
            .context("no last-resort search key available")?;

        let mut response = self.request_once(&key, query, limit).await?;

        if response.is_quota_exhausted() {
            warn!(status = response.status, "Last-resort search key exhausted, rotating");
            let retry_key = {
                let mut keys = self.keys.lock();
                keys.mark_exhausted(None, now);
                keys.current(now)
            };
            match retry_key {
                Some(k) => response = self.request_once(&k, query, limit).await?,
                None => {
                    self.circuit.lock().record_failure(now);
                    anyhow::bail!("all last-resort search keys exhausted");
                }
            }
        }

        if !response.is_success() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!("last-resort search HTTP {}", response.status);
        }

        let body = match response.json() {
            Ok(v) => v,
            Err(e) => {
                self.circuit.lock().record_failure(now);
                return Err(e);
            }
        };

        // The vendor reports API-level errors inside a 200 body.
        if body.get("error").is_some() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!(
                "last-resort search API error: {}",
                body["error"]["message"].as_str().unwrap_or("unknown")
            );
        }

        self.keys.lock().record_call();
        self.budget.lock().record_call("search_provider", now);
        self.circuit.lock().record_success();

        let results = self.parse(&body, limit);
        debug!(results = results.len(), "Last-resort search returned");
        Ok(results)
    }
}
