//! Odds-aggregation ingestion.
//!
//! Pulls upcoming fixtures with 1X2 and totals/BTTS prices for one league.
//! Events whose kickoff is already in the past are skipped at the adapter;
//! ingestion is idempotent and never resurrects started matches.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BudgetConfig;
use crate::models::Match;
use crate::providers::budget::BudgetManager;
use crate::providers::circuit::CircuitBreaker;
use crate::providers::http_client::SharedHttpClient;
use crate::util::time::parse_instant;

const API_BASE: &str = "https://api.the-odds-api.com/v4";
const RATE_LIMIT_KEY: &str = "odds";

pub struct OddsProvider {
    http: Arc<SharedHttpClient>,
    api_key: Option<String>,
    budget: Mutex<BudgetManager>,
    circuit: Mutex<CircuitBreaker>,
}

impl OddsProvider {
    pub fn new(http: Arc<SharedHttpClient>, api_key: Option<String>, budget: &BudgetConfig) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            budget: Mutex::new(BudgetManager::new("odds", budget)),
            circuit: Mutex::new(CircuitBreaker::new("odds")),
        }
    }

    pub fn is_available(&self) -> bool {
        let now = Utc::now();
        self.api_key.is_some()
            && self.budget.lock().can_call("main_pipeline", true, now)
            && self.circuit.lock().should_allow(now)
    }

    /// Upcoming fixtures with current prices for one league key.
    pub async fn fetch_league(&self, league_key: &str, horizon_hours: i64) -> Result<Vec<Match>> {
        let now = Utc::now();
        let key = self.api_key.as_deref().context("no odds API key configured")?;

        let url = format!("{API_BASE}/sports/{league_key}/odds");
        let response = self
            .http
            .get(
                &url,
                RATE_LIMIT_KEY,
                &[
                    ("apiKey", key.to_string()),
                    ("regions", "eu".to_string()),
                    ("markets", "h2h,totals,btts".to_string()),
                    ("oddsFormat", "decimal".to_string()),
                ],
                &[],
            )
            .await?;

        if !response.is_success() {
            self.circuit.lock().record_failure(now);
            anyhow::bail!("odds endpoint HTTP {} for {league_key}", response.status);
        }

        let body = match response.json() {
            Ok(v) => v,
            Err(e) => {
                self.circuit.lock().record_failure(now);
                return Err(e);
            }
        };

        self.budget.lock().record_call("main_pipeline", now);
        self.circuit.lock().record_success();

        let horizon = Duration::hours(horizon_hours);
        let mut matches = Vec::new();
        for event in body.as_array().cloned().unwrap_or_default() {
            match parse_event(&event, league_key) {
                Some(m) if m.is_analyzable(now, horizon) => matches.push(m),
                Some(m) => debug!(match_id = %m.id, "Skipping event outside analyzable window"),
                None => warn!(league = league_key, "Unparseable odds event skipped"),
            }
        }
        debug!(league = league_key, matches = matches.len(), "Odds ingested");
        Ok(matches)
    }
}

/// Sanity floor from the data model: a price below 1.01 is noise.
fn valid_odd(v: f64) -> Option<f64> {
    (v >= 1.01).then_some(v)
}

fn parse_event(event: &Value, league_key: &str) -> Option<Match> {
    let id = event["id"].as_str()?;
    let home = event["home_team"].as_str()?;
    let away = event["away_team"].as_str()?;
    let start = parse_instant(event["commence_time"].as_str()?)?;

    let mut m = Match::new(id, league_key, home, away, start);

    // First bookmaker with a priced market wins; we track one consensus-ish
    // price per market, not a book matrix.
    for bookmaker in event["bookmakers"].as_array().cloned().unwrap_or_default() {
        for market in bookmaker["markets"].as_array().cloned().unwrap_or_default() {
            let outcomes = market["outcomes"].as_array().cloned().unwrap_or_default();
            match market["key"].as_str().unwrap_or_default() {
                "h2h" => {
                    for o in &outcomes {
                        let price = o["price"].as_f64().and_then(valid_odd);
                        match o["name"].as_str().unwrap_or_default() {
                            n if n == home => m.current_home_odd = m.current_home_odd.or(price),
                            n if n == away => m.current_away_odd = m.current_away_odd.or(price),
                            "Draw" => m.current_draw_odd = m.current_draw_odd.or(price),
                            _ => {}
                        }
                    }
                }
                "totals" => {
                    for o in &outcomes {
                        let point = o["point"].as_f64().unwrap_or(0.0);
                        if (point - 2.5).abs() > f64::EPSILON {
                            continue;
                        }
                        let price = o["price"].as_f64().and_then(valid_odd);
                        match o["name"].as_str().unwrap_or_default() {
                            "Over" => m.over25_odd = m.over25_odd.or(price),
                            "Under" => m.under25_odd = m.under25_odd.or(price),
                            _ => {}
                        }
                    }
                }
                "btts" => {
                    for o in &outcomes {
                        if o["name"].as_str() == Some("Yes") {
                            let price = o["price"].as_f64().and_then(valid_odd);
                            m.btts_odd = m.btts_odd.or(price);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_json(commence: &str) -> Value {
        serde_json::json!({
            "id": "ev1",
            "home_team": "FC Porto",
            "away_team": "Santa Clara",
            "commence_time": commence,
            "bookmakers": [{
                "key": "book1",
                "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "FC Porto", "price": 1.65},
                        {"name": "Draw", "price": 3.80},
                        {"name": "Santa Clara", "price": 5.50}
                    ]},
                    {"key": "totals", "outcomes": [
                        {"name": "Over", "point": 2.5, "price": 1.85},
                        {"name": "Under", "point": 2.5, "price": 1.95}
                    ]},
                    {"key": "btts", "outcomes": [
                        {"name": "Yes", "price": 1.75},
                        {"name": "No", "price": 2.05}
                    ]}
                ]
            }]
        })
    }

    #[test]
    fn test_parse_event_all_markets() {
        let m = parse_event(&event_json("2026-05-10T14:00:00Z"), "primeira_liga").unwrap();
        assert_eq!(m.home_team, "FC Porto");
        assert_eq!(m.current_home_odd, Some(1.65));
        assert_eq!(m.current_draw_odd, Some(3.80));
        assert_eq!(m.current_away_odd, Some(5.50));
        assert_eq!(m.over25_odd, Some(1.85));
        assert_eq!(m.under25_odd, Some(1.95));
        assert_eq!(m.btts_odd, Some(1.75));
        assert_eq!(
            m.start_time,
            Utc.with_ymd_and_hms(2026, 5, 10, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_odds_below_floor_dropped() {
        let mut ev = event_json("2026-05-10T14:00:00Z");
        ev["bookmakers"][0]["markets"][0]["outcomes"][0]["price"] = serde_json::json!(1.0);
        let m = parse_event(&ev, "primeira_liga").unwrap();
        assert_eq!(m.current_home_odd, None);
        assert_eq!(m.current_draw_odd, Some(3.80));
    }

    #[test]
    fn test_malformed_event_is_none() {
        assert!(parse_event(&serde_json::json!({"id": "x"}), "epl").is_none());
    }
}
