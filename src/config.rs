//! Flat configuration surface.
//!
//! Built exactly once at startup from `.env`/process env with an optional
//! TOML overlay (`PITCHBOT_CONFIG`), then passed by reference. Engines never
//! re-read the environment.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Budget parameters for one provider.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// 0 = unlimited / monitoring only.
    pub monthly_limit: u32,
    pub degraded_threshold: f64,
    pub disabled_threshold: f64,
    /// Per-component call allocations.
    pub allocations: HashMap<String, u32>,
}

impl BudgetConfig {
    pub fn unlimited() -> Self {
        Self {
            monthly_limit: 0,
            degraded_threshold: 0.0,
            disabled_threshold: 0.0,
            allocations: HashMap::new(),
        }
    }
}

/// Per-host pacing for the shared HTTP client.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub min_interval_secs: f64,
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
}

impl RateLimitConfig {
    pub const fn steady(min_interval_secs: f64) -> Self {
        Self {
            min_interval_secs,
            jitter_min_secs: 0.0,
            jitter_max_secs: 0.0,
        }
    }

    pub const fn jittered(min_interval_secs: f64, jitter_min: f64, jitter_max: f64) -> Self {
        Self {
            min_interval_secs,
            jitter_min_secs: jitter_min,
            jitter_max_secs: jitter_max,
        }
    }
}

/// Per-league tuning. Home advantage is additive on the home lambda only.
#[derive(Debug, Clone)]
pub struct LeagueParams {
    pub home_advantage: f64,
    pub news_decay_lambda: f64,
    pub draw_threshold_base: f64,
    /// Minor leagues use a looser draw-odds threshold.
    pub is_minor: bool,
    /// Follow-the-sun window(s) in UTC hours, end-exclusive; may wrap
    /// midnight. Empty = always eligible.
    pub active_hours_utc: Vec<(u8, u8)>,
}

impl Default for LeagueParams {
    fn default() -> Self {
        Self {
            home_advantage: 0.30,
            news_decay_lambda: 0.0032,
            draw_threshold_base: 2.50,
            is_minor: false,
            active_hours_utc: Vec::new(),
        }
    }
}

/// Optional TOML overlay: only the league table is file-configurable, the
/// rest of the surface stays on env.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    #[serde(default)]
    leagues: HashMap<String, LeagueOverlay>,
}

#[derive(Debug, Deserialize)]
struct LeagueOverlay {
    home_advantage: Option<f64>,
    news_decay_lambda: Option<f64>,
    draw_threshold_base: Option<f64>,
    is_minor: Option<bool>,
    #[serde(default)]
    active_hours_utc: Vec<(u8, u8)>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,

    // Provider credentials. Empty pools disable the member (§7 fatal-config
    // rule: the federation drops that member at startup and logs it).
    pub primary_search_keys: Vec<String>,
    pub tertiary_search_key: Option<String>,
    pub last_resort_search_keys: Vec<String>,
    pub ai_primary_key: Option<String>,
    pub ai_fallback_key: Option<String>,
    pub odds_api_key: Option<String>,
    pub weather_api_key: Option<String>,

    // Budgets per provider.
    pub primary_search_budget: BudgetConfig,
    pub tertiary_search_budget: BudgetConfig,
    pub last_resort_search_budget: BudgetConfig,
    pub ai_budget: BudgetConfig,
    pub odds_budget: BudgetConfig,

    // Per-host pacing.
    pub rate_limits: HashMap<String, RateLimitConfig>,

    // League table (tiers + parameters).
    pub tier1_leagues: Vec<String>,
    pub tier2_leagues: Vec<String>,
    pub league_params: HashMap<String, LeagueParams>,

    // Pipeline gates.
    pub alert_threshold_high: f64,
    pub verification_score_threshold: f64,
    pub confidence_gate: u8,
    pub max_stake_pct: f64,
    pub dixon_coles_rho: f64,
    pub enrichment_task_timeout_secs: u64,
    pub enrichment_total_timeout_secs: u64,
    pub enrichment_concurrency: usize,
    pub tier2_per_cycle: usize,
    pub tier2_dry_cycles_threshold: u32,
    pub tier2_fallback_daily_limit: u32,

    // Main loop.
    pub cycle_interval_secs: u64,
    pub match_horizon_hours: i64,
    pub ai_min_interval_secs: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_path = env_str("DATABASE_PATH", "./pitchbot.db");

        let primary_search_keys = env_list("PRIMARY_SEARCH_API_KEYS");
        let tertiary_search_key = std::env::var("TERTIARY_SEARCH_API_KEY").ok();
        let last_resort_search_keys = env_list("LAST_RESORT_SEARCH_API_KEYS");
        let ai_primary_key = std::env::var("AI_PRIMARY_API_KEY").ok();
        let ai_fallback_key = std::env::var("AI_FALLBACK_API_KEY").ok();
        let odds_api_key = std::env::var("ODDS_API_KEY").ok();
        let weather_api_key = std::env::var("WEATHER_API_KEY").ok();

        let primary_search_budget = BudgetConfig {
            monthly_limit: env_parse("PRIMARY_SEARCH_MONTHLY_BUDGET", 6000),
            degraded_threshold: env_parse("PRIMARY_SEARCH_DEGRADED_THRESHOLD", 0.90),
            disabled_threshold: env_parse("PRIMARY_SEARCH_DISABLED_THRESHOLD", 0.95),
            allocations: default_search_allocations(),
        };
        let tertiary_search_budget = BudgetConfig {
            monthly_limit: env_parse("TERTIARY_SEARCH_MONTHLY_BUDGET", 2500),
            degraded_threshold: env_parse("TERTIARY_SEARCH_DEGRADED_THRESHOLD", 0.90),
            disabled_threshold: env_parse("TERTIARY_SEARCH_DISABLED_THRESHOLD", 0.95),
            allocations: default_search_allocations(),
        };
        // Free unlimited tier: counters for monitoring only.
        let last_resort_search_budget = BudgetConfig::unlimited();
        let ai_budget = BudgetConfig {
            monthly_limit: env_parse("AI_MONTHLY_BUDGET", 0),
            degraded_threshold: 0.90,
            disabled_threshold: 0.95,
            allocations: HashMap::new(),
        };
        let odds_budget = BudgetConfig {
            monthly_limit: env_parse("ODDS_MONTHLY_BUDGET", 15000),
            degraded_threshold: env_parse("ODDS_DEGRADED_THRESHOLD", 0.90),
            disabled_threshold: env_parse("ODDS_DISABLED_THRESHOLD", 0.95),
            allocations: HashMap::from([
                ("main_pipeline".to_string(), 12000),
                ("closing_line".to_string(), 2000),
            ]),
        };

        let mut rate_limits = HashMap::new();
        rate_limits.insert("stats".to_string(), RateLimitConfig::steady(1.2));
        rate_limits.insert("odds".to_string(), RateLimitConfig::steady(1.0));
        rate_limits.insert("weather".to_string(), RateLimitConfig::steady(1.0));
        rate_limits.insert("search_primary".to_string(), RateLimitConfig::steady(1.1));
        // The free secondary search throttles itself hard with jitter to stay
        // under the anti-bot radar.
        rate_limits.insert(
            "search_secondary".to_string(),
            RateLimitConfig::jittered(3.0, 0.5, 2.0),
        );
        rate_limits.insert("search_tertiary".to_string(), RateLimitConfig::steady(1.0));
        rate_limits.insert("search_last_resort".to_string(), RateLimitConfig::steady(1.5));
        rate_limits.insert("ai".to_string(), RateLimitConfig::steady(2.0));

        let tier1_leagues = {
            let list = env_list("TIER1_LEAGUES");
            if list.is_empty() { default_tier1() } else { list }
        };
        let tier2_leagues = {
            let list = env_list("TIER2_LEAGUES");
            if list.is_empty() { default_tier2() } else { list }
        };

        let mut league_params = default_league_params();
        if let Ok(path) = std::env::var("PITCHBOT_CONFIG") {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config overlay {path}"))?;
            let overlay: FileOverlay =
                toml::from_str(&raw).with_context(|| format!("invalid TOML in {path}"))?;
            for (league, o) in overlay.leagues {
                let entry = league_params.entry(league).or_default();
                if let Some(ha) = o.home_advantage {
                    entry.home_advantage = ha;
                }
                if let Some(l) = o.news_decay_lambda {
                    entry.news_decay_lambda = l;
                }
                if let Some(d) = o.draw_threshold_base {
                    entry.draw_threshold_base = d;
                }
                if let Some(m) = o.is_minor {
                    entry.is_minor = m;
                }
                if !o.active_hours_utc.is_empty() {
                    entry.active_hours_utc = o.active_hours_utc;
                }
            }
        }

        Ok(Self {
            database_path,
            primary_search_keys,
            tertiary_search_key,
            last_resort_search_keys,
            ai_primary_key,
            ai_fallback_key,
            odds_api_key,
            weather_api_key,
            primary_search_budget,
            tertiary_search_budget,
            last_resort_search_budget,
            ai_budget,
            odds_budget,
            rate_limits,
            tier1_leagues,
            tier2_leagues,
            league_params,
            alert_threshold_high: env_parse("ALERT_THRESHOLD_HIGH", 7.5),
            verification_score_threshold: env_parse("VERIFICATION_SCORE_THRESHOLD", 7.5),
            confidence_gate: env_parse("CONFIDENCE_GATE", 60),
            max_stake_pct: env_parse("MAX_STAKE_PCT", 5.0),
            dixon_coles_rho: env_parse("DIXON_COLES_RHO", -0.07),
            enrichment_task_timeout_secs: env_parse("ENRICHMENT_TASK_TIMEOUT_SECS", 30),
            enrichment_total_timeout_secs: env_parse("ENRICHMENT_TOTAL_TIMEOUT_SECS", 45),
            enrichment_concurrency: env_parse("ENRICHMENT_CONCURRENCY", 4),
            tier2_per_cycle: env_parse("TIER_2_PER_CYCLE", 3),
            tier2_dry_cycles_threshold: env_parse("TIER2_DRY_CYCLES_THRESHOLD", 6),
            tier2_fallback_daily_limit: env_parse("TIER2_FALLBACK_DAILY_LIMIT", 4),
            cycle_interval_secs: env_parse("CYCLE_INTERVAL_SECS", 600),
            match_horizon_hours: env_parse("MATCH_HORIZON_HOURS", 48),
            ai_min_interval_secs: env_parse("AI_MIN_INTERVAL_SECS", 2.0),
        })
    }

    pub fn league(&self, key: &str) -> LeagueParams {
        self.league_params.get(key).cloned().unwrap_or_default()
    }
}

fn default_search_allocations() -> HashMap<String, u32> {
    HashMap::from([
        ("main_pipeline".to_string(), 3000),
        ("news_radar".to_string(), 1500),
        ("deep_dive".to_string(), 1000),
        ("closing_line".to_string(), 500),
    ])
}

fn default_tier1() -> Vec<String> {
    [
        "epl",
        "serie_a",
        "la_liga",
        "bundesliga",
        "ligue_1",
        "eredivisie",
        "primeira_liga",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_tier2() -> Vec<String> {
    [
        "championship",
        "serie_b",
        "la_liga_2",
        "bundesliga_2",
        "scottish_premiership",
        "super_lig",
        "brasileirao",
        "argentina_primera",
        "a_league",
        "j_league",
        "mls",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_league_params() -> HashMap<String, LeagueParams> {
    let mut m = HashMap::new();
    // Home advantage varies widely by league; values in the researched
    // 0.22-0.40 band.
    let entries: &[(&str, f64, bool, &[(u8, u8)])] = &[
        ("epl", 0.22, false, &[(11, 22)]),
        ("bundesliga", 0.24, false, &[(13, 21)]),
        ("serie_a", 0.30, false, &[(11, 22)]),
        ("la_liga", 0.30, false, &[(12, 23)]),
        ("ligue_1", 0.28, false, &[(12, 22)]),
        ("eredivisie", 0.28, false, &[(11, 21)]),
        ("primeira_liga", 0.30, false, &[(14, 23)]),
        ("championship", 0.26, true, &[(11, 22)]),
        ("serie_b", 0.32, true, &[(12, 21)]),
        ("la_liga_2", 0.30, true, &[(14, 22)]),
        ("bundesliga_2", 0.26, true, &[(11, 19)]),
        ("scottish_premiership", 0.28, true, &[(11, 21)]),
        ("super_lig", 0.38, true, &[(10, 19)]),
        ("brasileirao", 0.40, true, &[(19, 3)]),
        ("argentina_primera", 0.38, true, &[(19, 3)]),
        ("a_league", 0.30, true, &[(3, 12)]),
        ("j_league", 0.28, true, &[(3, 12)]),
        ("mls", 0.34, true, &[(22, 5)]),
    ];
    for (key, ha, minor, hours) in entries {
        m.insert(
            key.to_string(),
            LeagueParams {
                home_advantage: *ha,
                is_minor: *minor,
                active_hours_utc: hours.to_vec(),
                ..Default::default()
            },
        );
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_league_params_home_advantage_in_band() {
        for (key, params) in default_league_params() {
            assert!(
                (0.22..=0.40).contains(&params.home_advantage),
                "{key} out of band: {}",
                params.home_advantage
            );
        }
    }

    #[test]
    fn test_unknown_league_falls_back_to_defaults() {
        let cfg = Config::from_env().unwrap();
        let p = cfg.league("faroe_islands_premier");
        assert_eq!(p.home_advantage, 0.30);
        assert_eq!(p.draw_threshold_base, 2.50);
        assert!(p.active_hours_utc.is_empty());
    }
}
