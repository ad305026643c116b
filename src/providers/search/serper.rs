//! Tertiary search stage: paid API on a small budget, single key.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::BudgetConfig;
use crate::providers::budget::BudgetManager;
use crate::providers::circuit::CircuitBreaker;
use crate::providers::http_client::SharedHttpClient;
use crate::providers::search::{SearchResult, SearchStage};

const API_URL: &str = "https://google.serper.dev/search";
const RATE_LIMIT_KEY: &str = "search_tertiary";

pub struct SerperSearch {
    http: Arc<SharedHttpClient>,
    api_key: Option<String>,
    budget: Mutex<BudgetManager>,
    circuit: Mutex<CircuitBreaker>,
    component: &'static str,
}

impl SerperSearch {
    pub fn new(http: Arc<SharedHttpClient>, api_key: Option<String>, budget: &BudgetConfig) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            budget: Mutex::new(BudgetManager::new("serper", budget)),
            circuit: Mutex::new(CircuitBreaker::new("serper")),
            component: "news_radar",
        }
    }

    fn parse(&self, body: &serde_json::Value) -> Vec<SearchResult> {
        body["organic"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        let title = item["title"].as_str()?;
                        let url = item["link"].as_str()?;
                        Some(SearchResult {
                            title: title.to_string(),
                            url: url.to_string(),
                            snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                            source: "serper".to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchStage for SerperSearch {
    fn name(&self) -> &'static str {
        "serper"
    }

    fn supports_negative_operators(&self) -> bool {
        true
    }

    fn is_available(&self) -> bool {
        let now = Utc::now();
        self.api_key.is_some()
            && self.budget.lock().can_call(self.component, false, now)
            && self.circuit.lock().should_allow(now)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let now = Utc::now();
        let key = self.api_key.as_deref().context("no tertiary search key")?;

        let payload = serde_json::json!({ "q": query, "num": limit });
        let response = self
            .http
            .post_json(
                API_URL,
                RATE_LIMIT_KEY,
                &[("X-API-KEY", key.to_string())],
                &payload,
                15,
            )
            .await?;

        if !response.is_success() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!("tertiary search HTTP {}", response.status);
        }

        let body = match response.json() {
            Ok(v) => v,
            Err(e) => {
                self.circuit.lock().record_failure(now);
                return Err(e);
            }
        };

        self.budget.lock().record_call(self.component, now);
        self.circuit.lock().record_success();

        let results = self.parse(&body);
        debug!(results = results.len(), "Tertiary search returned");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_refuses_without_key() {
        let http = Arc::new(SharedHttpClient::new(HashMap::new()).unwrap());
        let none = SerperSearch::new(http.clone(), None, &BudgetConfig::unlimited());
        assert!(!none.is_available());
        let blank = SerperSearch::new(http.clone(), Some("  ".to_string()), &BudgetConfig::unlimited());
        assert!(!blank.is_available());
        let keyed = SerperSearch::new(http, Some("k".to_string()), &BudgetConfig::unlimited());
        assert!(keyed.is_available());
    }

    #[test]
    fn test_parse_organic() {
        let http = Arc::new(SharedHttpClient::new(HashMap::new()).unwrap());
        let s = SerperSearch::new(http, Some("k".to_string()), &BudgetConfig::unlimited());
        let body = serde_json::json!({
            "organic": [
                {"title": "Team news", "link": "https://a", "snippet": "rotation expected"},
                {"link": "https://b"}
            ]
        });
        let parsed = s.parse(&body);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Team news");
    }
}
