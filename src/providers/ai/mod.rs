//! Intelligence router: one interface over the primary and fallback AI.
//!
//! Each operation optionally pre-enriches through the search federation,
//! assembles `static preamble + dynamic user payload`, applies a local
//! minimum interval between AI calls, and tries the primary vendor first.
//! A failure never trips a global cooldown: the same prompt goes to the
//! fallback vendor, and the first successful parse wins. Responses are
//! normalized into fixed-shape records with typed defaults and clamped
//! ranges.

pub mod prompts;
pub mod vendor;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::providers::search::SearchFederation;
use crate::util::extract_json;
use vendor::AiVendor;

fn safe_str(v: &Value, key: &str, default: &str) -> String {
    v[key]
        .as_str()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn safe_bool(v: &Value, key: &str) -> bool {
    match &v[key] {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn safe_f64(v: &Value, key: &str, default: f64) -> f64 {
    v[key]
        .as_f64()
        .or_else(|| v[key].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(default)
}

fn clamp_confidence(v: &Value, key: &str) -> u8 {
    let raw = v[key]
        .as_i64()
        .or_else(|| v[key].as_f64().map(|f| f as i64))
        .or_else(|| v[key].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0);
    raw.clamp(0, 100) as u8
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepDiveResult {
    pub summary: String,
    pub motivation_home: String,
    pub motivation_away: String,
    pub injury_impact: String,
    /// Absences the AI's reasoning leans on; the verification layer checks
    /// them against the official list.
    pub cited_missing: Vec<String>,
    pub btts_impact: String,
    pub referee_profile: String,
    pub draw_suits_both: bool,
    pub confidence: u8,
    pub web_enriched: bool,
}

impl DeepDiveResult {
    /// Verbatim block for the analyzer dossier.
    pub fn format_for_prompt(&self) -> String {
        format!(
            "AI DEEP DIVE (confidence {}/100):\n{}\nMotivation: home {} / away {}\nInjuries: {}\nBTTS: {}\nReferee: {}\nDraw suits both: {}",
            self.confidence,
            self.summary,
            self.motivation_home,
            self.motivation_away,
            self.injury_impact,
            self.btts_impact,
            self.referee_profile,
            if self.draw_suits_both { "YES" } else { "no" },
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsVerification {
    pub confirmed: bool,
    pub confidence: u8,
    pub assessment: String,
    pub is_official: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollusionConfirmation {
    pub confirmed: bool,
    /// 0-10.
    pub evidence_strength: u8,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BettingStats {
    pub avg_cards_home: f64,
    pub avg_cards_away: f64,
    pub avg_corners_home: f64,
    pub avg_corners_away: f64,
    pub h2h_avg_cards: f64,
    pub h2h_avg_corners: f64,
    pub data_quality: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedContext {
    pub context: String,
    pub notable_absences: Vec<String>,
    pub confidence: u8,
}

pub struct IntelligenceRouter {
    primary: Box<dyn AiVendor>,
    fallback: Box<dyn AiVendor>,
    search: Arc<SearchFederation>,
    min_interval: Duration,
    last_call: AsyncMutex<Option<Instant>>,
}

impl IntelligenceRouter {
    pub fn new(
        primary: Box<dyn AiVendor>,
        fallback: Box<dyn AiVendor>,
        search: Arc<SearchFederation>,
        min_interval_secs: f64,
    ) -> Self {
        Self {
            primary,
            fallback,
            search,
            min_interval: Duration::from_secs_f64(min_interval_secs.max(0.0)),
            last_call: AsyncMutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallback.is_available()
    }

    /// Router-local pacing: minimum interval between any two AI calls.
    async fn wait_for_slot(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Primary first, fallback on any failure, first successful parse wins.
    async fn route(&self, system: &str, user: &str, operation: &str) -> Option<Value> {
        self.wait_for_slot().await;
        let user = prompts::scrub_vendor_branding(user);

        if self.primary.is_available() {
            match self.primary.complete(system, &user, operation).await {
                Ok(text) => {
                    if let Ok(v) = extract_json(&text) {
                        return Some(v);
                    }
                    warn!(
                        vendor = self.primary.name(),
                        operation, "Unparseable AI response, trying fallback"
                    );
                }
                Err(e) => {
                    warn!(vendor = self.primary.name(), operation, error = %e, "Primary AI failed, trying fallback");
                }
            }
        }

        if self.fallback.is_available() {
            match self.fallback.complete(system, &user, operation).await {
                Ok(text) => match extract_json(&text) {
                    Ok(v) => return Some(v),
                    Err(e) => {
                        warn!(vendor = self.fallback.name(), operation, error = %e, "Fallback response unparseable")
                    }
                },
                Err(e) => {
                    warn!(vendor = self.fallback.name(), operation, error = %e, "Fallback AI failed")
                }
            }
        }

        None
    }

    async fn web_block(&self, query: &str, limit: usize) -> String {
        let results = self.search.search(query, limit).await;
        prompts::format_web_results(&results)
    }

    /// Deep qualitative investigation of one match.
    pub async fn deep_dive(
        &self,
        home_team: &str,
        away_team: &str,
        match_date: DateTime<Utc>,
        referee: Option<&str>,
        missing_players: &[String],
    ) -> Option<DeepDiveResult> {
        let web = self
            .web_block(
                &format!("{home_team} {away_team} team news injuries lineup -women -basket"),
                5,
            )
            .await;
        let web_enriched = !web.is_empty();

        let mut user = format!(
            "CONTEXT: Today is {}.\n\nTASK: Analyze the football match {} vs {} scheduled for {}.\n",
            Utc::now().format("%Y-%m-%d"),
            home_team,
            away_team,
            match_date.format("%Y-%m-%d"),
        );
        if let Some(r) = referee {
            user.push_str(&format!("Referee: {r}.\n"));
        }
        if !missing_players.is_empty() {
            user.push_str(&format!(
                "Reported missing players: {}. For each, assess role (starter or bench) and importance.\n",
                missing_players.join(", ")
            ));
        }
        if !web.is_empty() {
            user.push_str("\n");
            user.push_str(&web);
        } else {
            user.push_str(
                "\nNOTE: No recent web search results available. Base your analysis on your training knowledge only and be conservative.\n",
            );
        }

        let v = self.route(prompts::DEEP_DIVE_PREAMBLE, &user, "deep_dive").await?;
        let cited_missing = v["cited_missing"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        Some(DeepDiveResult {
            summary: safe_str(&v, "summary", "Unknown"),
            motivation_home: safe_str(&v, "motivation_home", "Unknown"),
            motivation_away: safe_str(&v, "motivation_away", "Unknown"),
            injury_impact: safe_str(&v, "injury_impact", "Unknown"),
            cited_missing,
            btts_impact: safe_str(&v, "btts_impact", "Neutral"),
            referee_profile: safe_str(&v, "referee_profile", "Unknown"),
            draw_suits_both: safe_bool(&v, "draw_suits_both"),
            confidence: clamp_confidence(&v, "confidence"),
            web_enriched,
        })
    }

    /// Confirm or refute one news item against fresh web evidence.
    pub async fn verify_news(
        &self,
        title: &str,
        snippet: &str,
        team: &str,
        source: &str,
    ) -> Option<NewsVerification> {
        let web = self.web_block(&format!("{team} {title}"), 3).await;
        let user = format!(
            "Headline: {title}\nSnippet: {snippet}\nTeam: {team}\nOriginal source: {source}\n\n{web}",
        );
        let v = self
            .route(prompts::NEWS_VERIFICATION_PREAMBLE, &user, "verify_news")
            .await?;
        Some(NewsVerification {
            confirmed: safe_bool(&v, "confirmed"),
            confidence: clamp_confidence(&v, "confidence"),
            assessment: safe_str(&v, "assessment", "Unknown"),
            is_official: safe_bool(&v, "is_official"),
        })
    }

    /// Second opinion on a detected collusion pattern.
    #[allow(clippy::too_many_arguments)]
    pub async fn confirm_collusion(
        &self,
        home_team: &str,
        away_team: &str,
        league: &str,
        draw_odds: f64,
        odds_pattern: &str,
        season_context: &str,
        detected_factors: &[String],
    ) -> Option<CollusionConfirmation> {
        let web = self
            .web_block(
                &format!("{home_team} {away_team} {league} draw suits both teams table"),
                5,
            )
            .await;
        let user = format!(
            "Fixture: {home_team} vs {away_team} ({league})\nCurrent draw odds: {draw_odds:.2}\nOdds pattern: {odds_pattern}\nSeason context: {season_context}\nDetected factors: {}\n\n{web}",
            detected_factors.join("; "),
        );
        let v = self
            .route(prompts::COLLUSION_CONFIRMATION_PREAMBLE, &user, "confirm_collusion")
            .await?;
        let strength = v["evidence_strength"]
            .as_i64()
            .unwrap_or(0)
            .clamp(0, 10) as u8;
        Some(CollusionConfirmation {
            confirmed: safe_bool(&v, "confirmed"),
            evidence_strength: strength,
            rationale: safe_str(&v, "rationale", "Unknown"),
        })
    }

    /// Cards/corners enrichment for combo markets.
    pub async fn betting_stats(
        &self,
        home_team: &str,
        away_team: &str,
        match_date: DateTime<Utc>,
        league: &str,
    ) -> Option<BettingStats> {
        let web = self
            .web_block(&format!("{home_team} {away_team} cards corners statistics"), 3)
            .await;
        let user = format!(
            "Fixture: {home_team} vs {away_team}\nDate: {}\nLeague: {league}\n\n{web}",
            match_date.format("%Y-%m-%d"),
        );
        let v = self
            .route(prompts::BETTING_STATS_PREAMBLE, &user, "betting_stats")
            .await?;
        Some(BettingStats {
            avg_cards_home: safe_f64(&v, "avg_cards_home", 0.0),
            avg_cards_away: safe_f64(&v, "avg_cards_away", 0.0),
            avg_corners_home: safe_f64(&v, "avg_corners_home", 0.0),
            avg_corners_away: safe_f64(&v, "avg_corners_away", 0.0),
            h2h_avg_cards: safe_f64(&v, "h2h_avg_cards", 0.0),
            h2h_avg_corners: safe_f64(&v, "h2h_avg_corners", 0.0),
            data_quality: safe_str(&v, "data_quality", "POOR"),
        })
    }

    /// Merge already-gathered context with fresh web signal.
    pub async fn enrich_match_context(
        &self,
        home_team: &str,
        away_team: &str,
        league: &str,
        existing_context: &str,
    ) -> Option<EnrichedContext> {
        let web = self
            .web_block(
                &format!("{home_team} vs {away_team} {league} preview form standings"),
                5,
            )
            .await;
        let user = format!(
            "Fixture: {home_team} vs {away_team} ({league})\n\nEXISTING CONTEXT:\n{}\n\n{web}",
            if existing_context.is_empty() { "(none)" } else { existing_context },
        );
        let v = self
            .route(prompts::CONTEXT_ENRICHMENT_PREAMBLE, &user, "enrich_match_context")
            .await?;
        let absences = v["notable_absences"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|x| x.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        Some(EnrichedContext {
            context: safe_str(&v, "context", "Unknown"),
            notable_absences: absences,
            confidence: clamp_confidence(&v, "confidence"),
        })
    }

    /// Triangulation verdict call: the analyzer owns payload assembly and
    /// post-parse normalization; the router owns transport and extraction.
    pub async fn triangulate(&self, user_payload: &str) -> Option<Value> {
        debug!(payload_chars = user_payload.len(), "Triangulation call");
        self.route(prompts::TRIANGULATION_PREAMBLE, user_payload, "triangulation")
            .await
    }
}
