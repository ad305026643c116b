//! Secondary search stage: free engine, no credentials.
//!
//! No quota to manage, but the endpoint is anti-bot sensitive: the shared
//! client paces this host with a long minimum interval plus jitter, and the
//! fingerprint rotates on 403/429. Only a circuit breaker guards it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::providers::circuit::CircuitBreaker;
use crate::providers::http_client::SharedHttpClient;
use crate::providers::search::{SearchResult, SearchStage};

const API_URL: &str = "https://api.duckduckgo.com/";
const RATE_LIMIT_KEY: &str = "search_secondary";

pub struct DdgSearch {
    http: Arc<SharedHttpClient>,
    circuit: Mutex<CircuitBreaker>,
}

impl DdgSearch {
    pub fn new(http: Arc<SharedHttpClient>) -> Self {
        Self {
            http,
            circuit: Mutex::new(CircuitBreaker::new("ddg")),
        }
    }

    fn parse(&self, body: &serde_json::Value, limit: usize) -> Vec<SearchResult> {
        let mut out = Vec::new();

        // Abstract answer first, when present.
        let abstract_text = body["AbstractText"].as_str().unwrap_or_default();
        let abstract_url = body["AbstractURL"].as_str().unwrap_or_default();
        if !abstract_text.is_empty() && !abstract_url.is_empty() {
            out.push(SearchResult {
                title: body["Heading"].as_str().unwrap_or("Summary").to_string(),
                url: abstract_url.to_string(),
                snippet: abstract_text.to_string(),
                source: "ddg".to_string(),
            });
        }

        // Related topics, flattening one level of nested groups.
        let mut topics: Vec<serde_json::Value> = Vec::new();
        if let Some(arr) = body["RelatedTopics"].as_array() {
            for entry in arr {
                if let Some(nested) = entry["Topics"].as_array() {
                    topics.extend(nested.iter().cloned());
                } else {
                    topics.push(entry.clone());
                }
            }
        }
        for topic in topics {
            if out.len() >= limit {
                break;
            }
            let text = topic["Text"].as_str().unwrap_or_default();
            let url = topic["FirstURL"].as_str().unwrap_or_default();
            if text.is_empty() || url.is_empty() {
                continue;
            }
            // Text runs "Title - snippet"; split on the first separator.
            let (title, snippet) = match text.split_once(" - ") {
                Some((t, s)) => (t.to_string(), s.to_string()),
                None => (text.to_string(), String::new()),
            };
            out.push(SearchResult {
                title,
                url: url.to_string(),
                snippet,
                source: "ddg".to_string(),
            });
        }

        out.truncate(limit);
        out
    }
}

#[async_trait]
impl SearchStage for DdgSearch {
    fn name(&self) -> &'static str {
        "ddg"
    }

    fn is_available(&self) -> bool {
        self.circuit.lock().should_allow(Utc::now())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let now = Utc::now();
        let response = self
            .http
            .get(
                API_URL,
                RATE_LIMIT_KEY,
                &[
                    ("q", query.to_string()),
                    ("format", "json".to_string()),
                    ("no_html", "1".to_string()),
                    ("skip_disambig", "1".to_string()),
                ],
                &[],
            )
            .await?;

        if !response.is_success() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!("secondary search HTTP {}", response.status);
        }

        let body = match response.json() {
            Ok(v) => v,
            Err(e) => {
                self.circuit.lock().record_failure(now);
                return Err(e);
            }
        };

        self.circuit.lock().record_success();
        let results = self.parse(&body, limit);
        debug!(results = results.len(), "Secondary search returned");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stage() -> DdgSearch {
        DdgSearch::new(Arc::new(SharedHttpClient::new(HashMap::new()).unwrap()))
    }

    #[test]
    fn test_parse_related_topics_with_nesting() {
        let s = stage();
        let body = serde_json::json!({
            "AbstractText": "",
            "AbstractURL": "",
            "RelatedTopics": [
                {"Text": "Inter Milan - Italian football club", "FirstURL": "https://a"},
                {"Topics": [
                    {"Text": "Derby della Madonnina - rivalry", "FirstURL": "https://b"}
                ]},
                {"Text": "no url entry"}
            ]
        });
        let parsed = s.parse(&body, 5);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].title, "Inter Milan");
        assert_eq!(parsed[0].snippet, "Italian football club");
        assert_eq!(parsed[1].title, "Derby della Madonnina");
    }

    #[test]
    fn test_parse_respects_limit() {
        let s = stage();
        let topics: Vec<_> = (0..10)
            .map(|i| serde_json::json!({"Text": format!("T{i} - s"), "FirstURL": "https://x"}))
            .collect();
        let body = serde_json::json!({"RelatedTopics": topics});
        assert_eq!(s.parse(&body, 3).len(), 3);
    }
}
