//! Alert emission.
//!
//! One-way message channel with lightweight HTML formatting. Delivery is
//! best-effort: a failed send is logged and dropped, never retried from the
//! pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::AnalysisResult;

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send_alert(&self, match_id: &str, payload: &str);
}

/// Render the outbound alert payload.
pub fn format_alert(
    home_team: &str,
    away_team: &str,
    league_key: &str,
    score: f64,
    result: &AnalysisResult,
) -> String {
    let mut lines = vec![
        format!("<b>{home_team} vs {away_team}</b> ({league_key})"),
        format!(
            "Verdict: <b>{}</b> ({}% confidence, score {score:.1}/10)",
            result.verdict.as_str(),
            result.confidence
        ),
        format!("Market: <b>{}</b>", result.recommended_market),
    ];
    if let (Some(edge), Some(kelly)) = (result.quant.edge_pct, result.quant.kelly_pct) {
        let fair = result.quant.fair_odd.unwrap_or(0.0);
        let actual = result.quant.actual_odd.unwrap_or(0.0);
        lines.push(format!(
            "Edge: {edge:+.1}% | Kelly: {kelly:.2}% | Fair {fair:.2} vs {actual:.2}"
        ));
    }
    lines.push(format!("Driver: {}", result.primary_driver));
    lines.push(format!("Verification: {}", result.verification.as_str()));
    lines.push(format!("<i>{}</i>", result.reasoning));
    lines.join("\n")
}

/// Bot-API-style chat channel.
pub struct ChatChannel {
    http: Arc<crate::providers::SharedHttpClient>,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl ChatChannel {
    pub fn from_env(http: Arc<crate::providers::SharedHttpClient>) -> Self {
        Self {
            http,
            bot_token: std::env::var("ALERT_BOT_TOKEN").ok().filter(|s| !s.is_empty()),
            chat_id: std::env::var("ALERT_CHAT_ID").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[async_trait]
impl AlertChannel for ChatChannel {
    async fn send_alert(&self, match_id: &str, payload: &str) {
        let (Some(token), Some(chat_id)) = (self.bot_token.as_deref(), self.chat_id.as_deref())
        else {
            info!(match_id, "Alert channel not configured, logging only:\n{payload}");
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": payload,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        match self.http.post_json(&url, "alerts", &[], &body, 15).await {
            Ok(resp) if resp.is_success() => info!(match_id, "Alert delivered"),
            Ok(resp) => warn!(match_id, status = resp.status, "Alert delivery refused"),
            Err(e) => warn!(match_id, error = %e, "Alert delivery failed"),
        }
    }
}

/// Test/standalone sink that just logs.
pub struct LogChannel;

#[async_trait]
impl AlertChannel for LogChannel {
    async fn send_alert(&self, match_id: &str, payload: &str) {
        info!(match_id, "ALERT:\n{payload}");
    }
}
