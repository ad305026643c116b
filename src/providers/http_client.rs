//! Shared HTTP client.
//!
//! One reqwest pool per process; every outbound call goes through here. Each
//! logical host gets a rate-limit key with a minimum interval and optional
//! uniform jitter. Transient statuses (429/503) and transport errors retry
//! with exponential backoff; 403/429 on scraped hosts additionally rotate the
//! browser fingerprint for that host. Query parameters are passed structured
//! and encoded exactly once, here.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Desktop browser profiles rotated on 403/429 for scraped endpoints.
const FINGERPRINTS: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "en-US,en;q=0.9",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "en-GB,en;q=0.8",
    ),
    (
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "it-IT,it;q=0.9,en;q=0.6",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "es-ES,es;q=0.9,en;q=0.5",
    ),
];

/// Thin response view: status + body. Callers branch on status (429/432 drive
/// key rotation) and parse the body tolerantly.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.status == 429 || self.status == 432
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.body).context("response body is not JSON")
    }
}

struct HostState {
    next_allowed: Instant,
    fingerprint_idx: usize,
}

pub struct SharedHttpClient {
    client: Client,
    rate_limits: HashMap<String, RateLimitConfig>,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl SharedHttpClient {
    pub fn new(rate_limits: HashMap<String, RateLimitConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build shared HTTP client")?;
        Ok(Self {
            client,
            rate_limits,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    /// Wait out the per-key minimum interval (plus jitter), then reserve the
    /// next slot.
    async fn acquire(&self, rate_limit_key: &str) {
        let limit = self
            .rate_limits
            .get(rate_limit_key)
            .copied()
            .unwrap_or(RateLimitConfig::steady(0.5));

        loop {
            let now = Instant::now();
            let wait = {
                let mut hosts = self.hosts.lock();
                let state = hosts.entry(rate_limit_key.to_string()).or_insert(HostState {
                    next_allowed: now,
                    fingerprint_idx: 0,
                });
                if state.next_allowed <= now {
                    let jitter = if limit.jitter_max_secs > limit.jitter_min_secs {
                        rand::thread_rng().gen_range(limit.jitter_min_secs..limit.jitter_max_secs)
                    } else {
                        limit.jitter_min_secs
                    };
                    state.next_allowed =
                        now + Duration::from_secs_f64(limit.min_interval_secs + jitter);
                    None
                } else {
                    Some(state.next_allowed - now)
                }
            };
            match wait {
                None => return,
                Some(d) => {
                    debug!(key = rate_limit_key, wait_ms = d.as_millis() as u64, "Rate limiting");
                    sleep(d).await;
                }
            }
        }
    }

    fn fingerprint_for(&self, rate_limit_key: &str) -> (&'static str, &'static str) {
        let hosts = self.hosts.lock();
        let idx = hosts
            .get(rate_limit_key)
            .map(|s| s.fingerprint_idx)
            .unwrap_or(0);
        FINGERPRINTS[idx % FINGERPRINTS.len()]
    }

    fn rotate_fingerprint(&self, rate_limit_key: &str) {
        let mut hosts = self.hosts.lock();
        if let Some(state) = hosts.get_mut(rate_limit_key) {
            state.fingerprint_idx = (state.fingerprint_idx + 1) % FINGERPRINTS.len();
            debug!(key = rate_limit_key, idx = state.fingerprint_idx, "Fingerprint rotated");
        }
    }

    /// GET with retry. Returns the last HTTP response received, including
    /// 429/432, which call sites need to see to drive key rotation. Err only
    /// when every attempt died in transport.
    pub async fn get(
        &self,
        url: &str,
        rate_limit_key: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        self.request(url, rate_limit_key, query, headers, None).await
    }

    /// POST a JSON body with the same retry envelope as `get`.
    pub async fn post_json(
        &self,
        url: &str,
        rate_limit_key: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
        timeout_secs: u64,
    ) -> Result<HttpResponse> {
        self.request_inner(url, rate_limit_key, &[], headers, Some(body), timeout_secs)
            .await
    }

    async fn request(
        &self,
        url: &str,
        rate_limit_key: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<HttpResponse> {
        self.request_inner(url, rate_limit_key, query, headers, body, DEFAULT_TIMEOUT_SECS)
            .await
    }

    async fn request_inner(
        &self,
        url: &str,
        rate_limit_key: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: Option<&serde_json::Value>,
        timeout_secs: u64,
    ) -> Result<HttpResponse> {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut last_response: Option<HttpResponse> = None;

        for attempt in 0..MAX_RETRIES {
            self.acquire(rate_limit_key).await;

            let (user_agent, accept_language) = self.fingerprint_for(rate_limit_key);
            let mut request = match body {
                Some(json) => self.client.post(url).json(json),
                None => self.client.get(url),
            };
            if !query.is_empty() {
                request = request.query(query);
            }
            request = request
                .header("User-Agent", user_agent)
                .header("Accept-Language", accept_language);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            match timeout(Duration::from_secs(timeout_secs), request.send()).await {
                Ok(Ok(response)) => {
                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();
                    let resp = HttpResponse {
                        status: status.as_u16(),
                        body: body_text,
                    };

                    if status == StatusCode::FORBIDDEN
                        || status == StatusCode::TOO_MANY_REQUESTS
                    {
                        self.rotate_fingerprint(rate_limit_key);
                    }

                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE;
                    if retryable && attempt < MAX_RETRIES - 1 {
                        warn!(
                            key = rate_limit_key,
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            "Transient status, backing off"
                        );
                        last_response = Some(resp);
                    } else {
                        return Ok(resp);
                    }
                }
                Ok(Err(e)) => {
                    warn!(key = rate_limit_key, attempt = attempt + 1, error = %e, "Request failed");
                }
                Err(_) => {
                    warn!(key = rate_limit_key, attempt = attempt + 1, "Request timeout");
                }
            }

            if attempt < MAX_RETRIES - 1 {
                sleep(Duration::from_millis(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_MS);
            }
        }

        // Exhausted retries: surface the last transient status if we got one.
        if let Some(resp) = last_response {
            return Ok(resp);
        }
        anyhow::bail!("max retries exceeded for {url} at {}", Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_helpers() {
        let ok = HttpResponse { status: 200, body: "{}".to_string() };
        assert!(ok.is_success());
        assert!(!ok.is_quota_exhausted());

        let quota = HttpResponse { status: 432, body: String::new() };
        assert!(quota.is_quota_exhausted());
        assert!(HttpResponse { status: 429, body: String::new() }.is_quota_exhausted());
    }

    #[test]
    fn test_response_json_parse() {
        let resp = HttpResponse { status: 200, body: r#"{"ok": 1}"#.to_string() };
        assert_eq!(resp.json().unwrap()["ok"], 1);
        assert!(HttpResponse { status: 200, body: "<html>".to_string() }.json().is_err());
    }

    #[tokio::test]
    async fn test_acquire_spaces_out_calls() {
        let mut limits = HashMap::new();
        limits.insert("t".to_string(), RateLimitConfig::steady(0.05));
        let client = SharedHttpClient::new(limits).unwrap();

        let start = Instant::now();
        client.acquire("t").await;
        client.acquire("t").await;
        client.acquire("t").await;
        // Two gaps of >= 50ms each.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
