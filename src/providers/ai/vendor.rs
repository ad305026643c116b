//! AI vendor clients behind one completion interface.
//!
//! Both vendors speak the OpenAI-compatible chat shape: the system preamble
//! goes out verbatim as the system message (the caching contract), the
//! dynamic payload as the user message. A 429 or transport error is
//! `Transient` so the router can fail over without a global cooldown.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::providers::http_client::SharedHttpClient;

/// Failure classes the router dispatches on.
#[derive(Debug)]
pub enum AiCallError {
    /// 429 or connection-level failure: retryable on the fallback vendor.
    Transient(String),
    /// Anything else (auth, bad request, empty body).
    Permanent(String),
}

impl std::fmt::Display for AiCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiCallError::Transient(msg) => write!(f, "transient AI failure: {msg}"),
            AiCallError::Permanent(msg) => write!(f, "AI failure: {msg}"),
        }
    }
}

impl std::error::Error for AiCallError {}

#[async_trait]
pub trait AiVendor: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;
    async fn complete(
        &self,
        system: &str,
        user: &str,
        operation: &str,
    ) -> Result<String, AiCallError>;
}

/// Chat-completions client for one vendor endpoint.
pub struct ChatVendor {
    vendor_name: &'static str,
    http: Arc<SharedHttpClient>,
    api_url: String,
    model: String,
    api_key: Option<String>,
    rate_limit_key: &'static str,
}

impl ChatVendor {
    pub fn primary(http: Arc<SharedHttpClient>, api_key: Option<String>) -> Self {
        Self {
            vendor_name: "deepseek",
            http,
            api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "deepseek/deepseek-chat".to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            rate_limit_key: "ai",
        }
    }

    pub fn fallback(http: Arc<SharedHttpClient>, api_key: Option<String>) -> Self {
        Self {
            vendor_name: "perplexity",
            http,
            api_url: "https://api.perplexity.ai/chat/completions".to_string(),
            model: "sonar".to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            rate_limit_key: "ai",
        }
    }
}

#[async_trait]
impl AiVendor for ChatVendor {
    fn name(&self) -> &'static str {
        self.vendor_name
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        operation: &str,
    ) -> Result<String, AiCallError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AiCallError::Permanent("no API key configured".to_string()))?;

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.3,
            "max_tokens": 2000,
        });

        info!(vendor = self.vendor_name, operation, "AI call");
        let response = self
            .http
            .post_json(
                &self.api_url,
                self.rate_limit_key,
                &[("Authorization", format!("Bearer {key}"))],
                &payload,
                60,
            )
            .await
            .map_err(|e| AiCallError::Transient(e.to_string()))?;

        if response.status == 429 {
            warn!(vendor = self.vendor_name, operation, "AI rate limited (transient)");
            return Err(AiCallError::Transient("HTTP 429".to_string()));
        }
        if !response.is_success() {
            return Err(AiCallError::Permanent(format!("HTTP {}", response.status)));
        }

        let body = response
            .json()
            .map_err(|e| AiCallError::Permanent(e.to_string()))?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if content.is_empty() {
            return Err(AiCallError::Permanent("empty completion".to_string()));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_availability_requires_key() {
        let http = Arc::new(SharedHttpClient::new(HashMap::new()).unwrap());
        assert!(!ChatVendor::primary(http.clone(), None).is_available());
        assert!(!ChatVendor::primary(http.clone(), Some(" ".to_string())).is_available());
        assert!(ChatVendor::fallback(http, Some("pk".to_string())).is_available());
    }
}
