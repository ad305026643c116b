//! Core domain records shared across the pipeline.
//!
//! Everything time-related is `DateTime<Utc>`. Parsers that may produce naive
//! timestamps promote them to UTC at the boundary (see `util::time`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final verdict for a match analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Bet,
    NoBet,
}

impl Verdict {
    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Bet => "BET",
            Verdict::NoBet => "NO BET",
        }
    }
}

/// Outcome of the post-AI verification layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Confirmed,
    Rejected,
    ChangeMarket,
    Unverified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VerificationStatus::Confirmed => "CONFIRMED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::ChangeMarket => "CHANGE_MARKET",
            VerificationStatus::Unverified => "UNVERIFIED",
        }
    }
}

/// Confidence tag attached to a news item by its source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewsConfidence {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// A tracked fixture with its odds trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub league_key: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,

    pub opening_home_odd: Option<f64>,
    pub opening_draw_odd: Option<f64>,
    pub opening_away_odd: Option<f64>,
    pub current_home_odd: Option<f64>,
    pub current_draw_odd: Option<f64>,
    pub current_away_odd: Option<f64>,
    pub over25_odd: Option<f64>,
    pub under25_odd: Option<f64>,
    pub btts_odd: Option<f64>,

    /// Highest preliminary score an alert was emitted at, if any.
    pub highest_alerted_score: Option<f64>,
    pub last_deep_dive_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(
        id: impl Into<String>,
        league_key: impl Into<String>,
        home_team: impl Into<String>,
        away_team: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            league_key: league_key.into(),
            home_team: home_team.into(),
            away_team: away_team.into(),
            start_time,
            opening_home_odd: None,
            opening_draw_odd: None,
            opening_away_odd: None,
            current_home_odd: None,
            current_draw_odd: None,
            current_away_odd: None,
            over25_odd: None,
            under25_odd: None,
            btts_odd: None,
            highest_alerted_score: None,
            last_deep_dive_at: None,
        }
    }

    /// A match is analyzable only while it has not kicked off and sits inside
    /// the lookahead horizon. `start_time == now` is already excluded.
    pub fn is_analyzable(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> bool {
        self.start_time > now && self.start_time <= now + horizon
    }
}

/// One point on a match's odds trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub match_id: String,
    pub captured_at: DateTime<Utc>,
    pub home_odd: Option<f64>,
    pub draw_odd: Option<f64>,
    pub away_odd: Option<f64>,
    pub over25_odd: Option<f64>,
    pub btts_odd: Option<f64>,
}

/// A news item attached to a match, deduplicated by content fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub match_id: String,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub confidence: NewsConfidence,
    pub priority_boost: f64,
    pub deep_dive_applied: bool,
}

impl NewsItem {
    pub fn new(
        match_id: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            title: title.into(),
            snippet: snippet.into(),
            source: source.into(),
            published_at: None,
            confidence: NewsConfidence::Low,
            priority_boost: 0.0,
            deep_dive_applied: false,
        }
    }

    pub fn with_confidence(mut self, confidence: NewsConfidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_boost(mut self, boost: f64) -> Self {
        self.priority_boost = boost.max(0.0);
        self
    }

    /// Fingerprint used for cross-provider dedup: case-folded title + source.
    pub fn fingerprint(&self) -> String {
        crate::util::content_fingerprint(&format!(
            "{}|{}",
            self.title.to_lowercase(),
            self.source.to_lowercase()
        ))
    }
}

/// Quantitative summary attached to an analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantBlock {
    pub best_market: Option<String>,
    pub edge_pct: Option<f64>,
    pub kelly_pct: Option<f64>,
    pub fair_odd: Option<f64>,
    pub actual_odd: Option<f64>,
}

impl QuantBlock {
    pub fn empty() -> Self {
        Self {
            best_market: None,
            edge_pct: None,
            kelly_pct: None,
            fair_odd: None,
            actual_odd: None,
        }
    }
}

/// The single scored recommendation emitted per analyzed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub match_id: String,
    pub verdict: Verdict,
    /// Clamped to 0..=100 at parse time.
    pub confidence: u8,
    pub recommended_market: String,
    pub reasoning: String,
    pub primary_driver: String,
    pub quant: QuantBlock,
    pub verification: VerificationStatus,
}

impl AnalysisResult {
    pub fn no_bet(match_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            verdict: Verdict::NoBet,
            confidence: 0,
            recommended_market: String::new(),
            reasoning: reasoning.into(),
            primary_driver: "NONE".to_string(),
            quant: QuantBlock::empty(),
            verification: VerificationStatus::Unverified,
        }
    }
}

/// Per-cycle bookkeeping owned by the main loop.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    pub cycle: u64,
    pub consecutive_dry_cycles: u32,
    pub tier2_fallback_activations_today: u32,
    pub last_fallback_activation: Option<DateTime<Utc>>,
    pub tier2_cursor: usize,
    pub last_reset_day: Option<u32>,
}

impl CycleState {
    /// Daily counter reset on UTC day rollover, checked lazily at cycle start.
    pub fn check_daily_reset(&mut self, now: DateTime<Utc>) {
        use chrono::Datelike;
        let day = now.day();
        match self.last_reset_day {
            None => self.last_reset_day = Some(day),
            Some(prev) if prev != day => {
                self.tier2_fallback_activations_today = 0;
                self.last_reset_day = Some(day);
            }
            _ => {}
        }
    }

    pub fn record_alert(&mut self) {
        self.consecutive_dry_cycles = 0;
    }

    pub fn record_dry_cycle(&mut self) {
        self.consecutive_dry_cycles += 1;
    }
}
