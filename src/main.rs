//! Pitchbot: pre-match football betting intelligence pipeline.
//!
//! Startup builds every process-wide singleton once (shared HTTP client,
//! search and AI federations, providers, store, scheduler) and hands them by
//! reference to the cycle loop. Each cycle: pick leagues, ingest odds,
//! enrich and analyze each pending match, verify candidate alerts, emit at
//! most one decision per (match, cycle).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitchbot_backend::alerts::{self, AlertChannel, ChatChannel};
use pitchbot_backend::analysis::analyzer::{self, SignalBundle};
use pitchbot_backend::analysis::verification;
use pitchbot_backend::brain::LeagueBrain;
use pitchbot_backend::config::Config;
use pitchbot_backend::engine::biscotto::BiscottoSeverity;
use pitchbot_backend::enrichment::{EnrichmentOrchestrator, EnrichmentResult};
use pitchbot_backend::models::{CycleState, Match, NewsConfidence, NewsItem, OddsSnapshot, Verdict, VerificationStatus};
use pitchbot_backend::providers::ai::vendor::ChatVendor;
use pitchbot_backend::providers::ai::IntelligenceRouter;
use pitchbot_backend::providers::odds::OddsProvider;
use pitchbot_backend::providers::search::{
    brave::BraveSearch, ddg::DdgSearch, mediastack::MediastackSearch, serper::SerperSearch,
    SearchFederation, SearchResult,
};
use pitchbot_backend::providers::stats::{IdentityValidation, StatsProvider};
use pitchbot_backend::providers::weather::WeatherProvider;
use pitchbot_backend::providers::{ContentSeenCache, SharedHttpClient};
use pitchbot_backend::storage::{SqliteStore, Store};

#[derive(Parser, Debug)]
#[command(name = "pitchbot", about = "Pre-match football betting intelligence")]
struct Cli {
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Emergency mode: Tier 1 leagues only.
    #[arg(long, env = "EMERGENCY_MODE")]
    emergency: bool,
}

struct App {
    config: Config,
    store: Arc<SqliteStore>,
    odds: OddsProvider,
    stats: Arc<StatsProvider>,
    search: Arc<SearchFederation>,
    router: Arc<IntelligenceRouter>,
    orchestrator: EnrichmentOrchestrator,
    brain: LeagueBrain,
    channel: Box<dyn AlertChannel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        tier1 = config.tier1_leagues.len(),
        tier2 = config.tier2_leagues.len(),
        "Pitchbot starting"
    );

    let app = build_app(config)?;
    let mut cycle_state = CycleState::default();

    if cli.once {
        run_cycle(&app, &mut cycle_state, cli.emergency).await;
        return Ok(());
    }

    let mut ticker = interval(Duration::from_secs(app.config.cycle_interval_secs));
    loop {
        ticker.tick().await;
        run_cycle(&app, &mut cycle_state, cli.emergency).await;
    }
}

fn build_app(config: Config) -> Result<App> {
    let http = Arc::new(SharedHttpClient::new(config.rate_limits.clone())?);
    let seen_cache = Arc::new(ContentSeenCache::default());

    // Federation members missing credentials disable themselves and the
    // chain falls through them.
    if config.primary_search_keys.is_empty() {
        warn!("No primary search keys configured, stage disabled");
    }
    if config.ai_primary_key.is_none() && config.ai_fallback_key.is_none() {
        warn!("No AI credentials configured, triangulation disabled");
    }

    let search = Arc::new(SearchFederation::new(
        vec![
            Box::new(BraveSearch::new(
                http.clone(),
                config.primary_search_keys.clone(),
                &config.primary_search_budget,
            )),
            Box::new(DdgSearch::new(http.clone())),
            Box::new(SerperSearch::new(
                http.clone(),
                config.tertiary_search_key.clone(),
                &config.tertiary_search_budget,
            )),
            Box::new(MediastackSearch::new(
                http.clone(),
                config.last_resort_search_keys.clone(),
                &config.last_resort_search_budget,
            )),
        ],
        seen_cache,
    ));

    let router = Arc::new(IntelligenceRouter::new(
        Box::new(ChatVendor::primary(http.clone(), config.ai_primary_key.clone())),
        Box::new(ChatVendor::fallback(http.clone(), config.ai_fallback_key.clone())),
        search.clone(),
        config.ai_min_interval_secs,
    ));

    let stats = Arc::new(StatsProvider::new(http.clone()));
    let weather = Arc::new(WeatherProvider::new(http.clone(), config.weather_api_key.clone()));
    let orchestrator = EnrichmentOrchestrator::new(stats.clone(), weather, &config);
    let odds = OddsProvider::new(http.clone(), config.odds_api_key.clone(), &config.odds_budget);
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let brain = LeagueBrain::new(&config);
    let channel: Box<dyn AlertChannel> = Box::new(ChatChannel::from_env(http));

    Ok(App {
        config,
        store,
        odds,
        stats,
        search,
        router,
        orchestrator,
        brain,
        channel,
    })
}

async fn run_cycle(app: &App, state: &mut CycleState, emergency: bool) {
    let now = Utc::now();
    state.cycle += 1;
    state.check_daily_reset(now);

    let leagues = app.brain.leagues_for_cycle(state, emergency, &app.config, now);
    info!(cycle = state.cycle, leagues = leagues.len(), "Cycle start");

    // Phase 1: odds ingestion.
    if app.odds.is_available() {
        for league in &leagues {
            match app.odds.fetch_league(league, app.config.match_horizon_hours).await {
                Ok(matches) => {
                    for m in matches {
                        ingest_match(app, m).await;
                    }
                }
                Err(e) => warn!(league = %league, error = %e, "Odds ingestion failed"),
            }
        }
    } else {
        warn!("Odds provider unavailable this cycle");
    }

    // Phase 2: per-match analysis over the pending pool.
    let horizon = ChronoDuration::hours(app.config.match_horizon_hours);
    let pending = match app.store.read_pending_matches(now, horizon) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Failed to read pending matches");
            Vec::new()
        }
    };

    let mut alerts_sent = 0u32;
    for m in &pending {
        if !leagues.contains(&m.league_key) {
            continue;
        }
        match app.store.has_alert(&m.id, state.cycle) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                warn!(match_id = %m.id, error = %e, "Alert-log lookup failed");
                continue;
            }
        }
        if process_match(app, state, m).await {
            alerts_sent += 1;
        }
    }

    if alerts_sent > 0 {
        state.record_alert();
    } else {
        state.record_dry_cycle();
    }
    info!(
        cycle = state.cycle,
        pending = pending.len(),
        alerts = alerts_sent,
        dry_streak = state.consecutive_dry_cycles,
        "Cycle complete"
    );
}

/// Store one ingested fixture, correcting home/away inversions first.
async fn ingest_match(app: &App, mut m: Match) {
    let (home, away, swapped) = app
        .stats
        .validate_home_away_order(&m.home_team, &m.away_team)
        .await;
    if swapped {
        m.home_team = home;
        m.away_team = away;
        // The 1X2 prices travel with the sides.
        std::mem::swap(&mut m.current_home_odd, &mut m.current_away_odd);
        std::mem::swap(&mut m.opening_home_odd, &mut m.opening_away_odd);
    }

    if let Err(e) = app.store.upsert_match(&m) {
        warn!(match_id = %m.id, error = %e, "Match upsert failed");
        return;
    }
    let snapshot = OddsSnapshot {
        match_id: m.id.clone(),
        captured_at: Utc::now(),
        home_odd: m.current_home_odd,
        draw_odd: m.current_draw_odd,
        away_odd: m.current_away_odd,
        over25_odd: m.over25_odd,
        btts_odd: m.btts_odd,
    };
    if let Err(e) = app.store.append_odds_snapshot(&snapshot) {
        warn!(match_id = %m.id, error = %e, "Snapshot append failed");
    }
}

/// Full pipeline for one match. Returns true when an alert went out.
async fn process_match(app: &App, state: &mut CycleState, m: &Match) -> bool {
    debug!(match_id = %m.id, home = %m.home_team, away = %m.away_team, "Analyzing");

    // Identity check: a stats-source fixture at a wildly different kickoff
    // belongs to some other match; its enrichment is dropped.
    let enrichment = match app.stats.fixture_details(&m.home_team).await {
        Ok(Some(details)) => {
            match StatsProvider::validate_kickoff(m.start_time, details.kickoff) {
                IdentityValidation::NotMatched(reason) => {
                    warn!(match_id = %m.id, reason = %reason, "Stats fixture mismatch, dropping enrichment");
                    EnrichmentResult::default()
                }
                _ => app.orchestrator.enrich(m).await,
            }
        }
        _ => app.orchestrator.enrich(m).await,
    };

    // News sweep through the search federation, deduped in the store.
    let news = gather_news(app, m).await;

    let league = app.config.league(&m.league_key);
    let history = app
        .store
        .read_odds_history(&m.id, ChronoDuration::minutes(60))
        .unwrap_or_default();
    let mut bundle = analyzer::build_signal_bundle(
        m,
        &enrichment,
        &news,
        &history,
        &league,
        app.config.dixon_coles_rho,
    );

    // Second opinion on a hot draw anomaly.
    if bundle.biscotto.severity >= BiscottoSeverity::High && app.router.is_available() {
        if let Some(confirmation) = app
            .router
            .confirm_collusion(
                &m.home_team,
                &m.away_team,
                &m.league_key,
                m.current_draw_odd.unwrap_or(0.0),
                &bundle.biscotto.odds_pattern,
                if bundle.biscotto.end_of_season_match {
                    "end of season"
                } else {
                    "mid season"
                },
                &bundle.biscotto.factors,
            )
            .await
        {
            if !confirmation.confirmed && confirmation.evidence_strength < 3 {
                debug!(match_id = %m.id, "Draw anomaly not confirmed by AI, damping");
                bundle.preliminary_score = (bundle.preliminary_score - 1.0).max(0.0);
            }
        }
    }

    if bundle.preliminary_score < app.config.alert_threshold_high - 2.0 {
        debug!(match_id = %m.id, score = bundle.preliminary_score, "Below pre-filter, skipping AI");
        return false;
    }

    if !app.router.is_available() {
        warn!(match_id = %m.id, "No AI vendor available, cannot triangulate");
        return false;
    }

    // Deep dive + verdict.
    let missing_players: Vec<String> = enrichment
        .home_context
        .iter()
        .chain(enrichment.away_context.iter())
        .flat_map(|c| c.injuries.iter().map(|i| i.name.clone()))
        .collect();
    let deep_dive = app
        .router
        .deep_dive(
            &m.home_team,
            &m.away_team,
            m.start_time,
            enrichment.referee.as_ref().map(|r| r.name.as_str()),
            &missing_players,
        )
        .await;

    // Backfill when the structured enrichment came back partial: one
    // qualitative sweep fills the dossier gap.
    let extra_context = if !enrichment.failed_calls.is_empty() {
        app.router
            .enrich_match_context(&m.home_team, &m.away_team, &m.league_key, "")
            .await
            .map(|c| c.context)
    } else {
        None
    };

    let payload = analyzer::build_user_payload(
        m,
        &bundle,
        &enrichment,
        &news,
        deep_dive.as_ref(),
        extra_context.as_deref(),
    );
    let Some(verdict_json) = app.router.triangulate(&payload).await else {
        warn!(match_id = %m.id, "Triangulation failed on all vendors");
        return false;
    };
    let mut result = analyzer::normalize_verdict(m, &verdict_json, &bundle, app.config.confidence_gate);

    // Verification layer for candidates above the gate.
    if analyzer::should_verify(bundle.preliminary_score, &app.config) {
        let cited = deep_dive
            .as_ref()
            .map(|d| d.cited_missing.clone())
            .unwrap_or_default();
        apply_verification(app, m, &enrichment, &bundle, &cited, &mut result).await;
    }

    if result.verdict != Verdict::Bet {
        debug!(match_id = %m.id, "NO BET verdict, nothing to emit");
        return false;
    }
    if bundle.preliminary_score < app.config.alert_threshold_high {
        debug!(match_id = %m.id, score = bundle.preliminary_score, "Score below alert threshold");
        return false;
    }

    // Emit: one decision per (match, cycle).
    if let Err(e) = app.store.record_alert(state.cycle, bundle.preliminary_score, &result) {
        error!(match_id = %m.id, error = %e, "Failed to record alert");
        return false;
    }
    let payload = alerts::format_alert(
        &m.home_team,
        &m.away_team,
        &m.league_key,
        bundle.preliminary_score,
        &result,
    );
    app.channel.send_alert(&m.id, &payload).await;
    info!(
        match_id = %m.id,
        market = %result.recommended_market,
        confidence = result.confidence,
        "Alert emitted"
    );
    true
}

async fn apply_verification(
    app: &App,
    m: &Match,
    enrichment: &EnrichmentResult,
    bundle: &SignalBundle,
    cited_missing: &[String],
    result: &mut pitchbot_backend::models::AnalysisResult,
) {
    // Corroboration stats are only worth a call for discipline markets.
    let market_lower = result.recommended_market.to_lowercase();
    let betting_stats = if market_lower.contains("card") || market_lower.contains("corner") {
        app.router
            .betting_stats(&m.home_team, &m.away_team, m.start_time, &m.league_key)
            .await
    } else {
        None
    };

    let outcome = verification::verify_alert(
        &result.recommended_market,
        cited_missing,
        enrichment,
        bundle,
        betting_stats.as_ref(),
        m.under25_odd.is_some() || m.over25_odd.is_some(),
    );

    result.verification = outcome.status;
    match outcome.status {
        VerificationStatus::Rejected => {
            result.verdict = Verdict::NoBet;
            result.reasoning = format!(
                "verification rejected: {} | {}",
                outcome.notes.join("; "),
                result.reasoning
            );
        }
        VerificationStatus::ChangeMarket => {
            if let Some(new_market) = outcome.new_market {
                result.reasoning = format!(
                    "market switched from {} ({}) | {}",
                    result.recommended_market,
                    outcome.notes.join("; "),
                    result.reasoning
                );
                result.recommended_market = new_market;
            }
            result.confidence =
                (result.confidence as i32 + outcome.confidence_delta).clamp(0, 100) as u8;
        }
        VerificationStatus::Confirmed => {
            result.confidence =
                (result.confidence as i32 + outcome.confidence_delta).clamp(0, 100) as u8;
        }
        VerificationStatus::Unverified => {}
    }
}

/// Query the search federation for fresh team news and fold the hits into
/// the store-backed news log.
async fn gather_news(app: &App, m: &Match) -> Vec<NewsItem> {
    let query = format!(
        "{} {} injuries team news -women -basket",
        m.home_team, m.away_team
    );
    let results = app.search.search(&query, 6).await;
    for r in &results {
        let item = to_news_item(&m.id, r);
        match app.store.upsert_news(&item) {
            Ok(true) => debug!(match_id = %m.id, title = %item.title, "News stored"),
            Ok(false) => {}
            Err(e) => warn!(match_id = %m.id, error = %e, "News upsert failed"),
        }
    }
    let mut items = app.store.read_news(&m.id).unwrap_or_default();

    // AI fact-check for the strongest headline: an unconfirmed claim keeps
    // only a fraction of its boost for this cycle's scoring.
    if let Some(top) = items.first_mut() {
        if top.priority_boost >= 2.0 && app.router.is_available() {
            if let Some(check) = app
                .router
                .verify_news(&top.title, &top.snippet, &m.home_team, &top.source)
                .await
            {
                if !check.confirmed {
                    debug!(match_id = %m.id, title = %top.title, "Headline unconfirmed, damping boost");
                    top.priority_boost *= 0.25;
                } else if check.is_official {
                    top.priority_boost += 0.5;
                }
            }
        }
    }
    items
}

fn to_news_item(match_id: &str, r: &SearchResult) -> NewsItem {
    let confidence = if r.source.starts_with("brave") || r.source.starts_with("serper") {
        NewsConfidence::Medium
    } else {
        NewsConfidence::Low
    };
    NewsItem::new(match_id, r.title.clone(), r.snippet.clone(), r.source.clone())
        .with_confidence(confidence)
        .with_boost(news_priority_boost(&r.title, &r.snippet))
}

/// Keyword heuristic: how actionable a headline smells.
fn news_priority_boost(title: &str, snippet: &str) -> f64 {
    let text = format!("{} {}", title.to_lowercase(), snippet.to_lowercase());
    let mut boost = 0.0;
    for (keyword, weight) in [
        ("ruled out", 2.0),
        ("out for", 1.5),
        ("injur", 1.0),
        ("suspend", 1.0),
        ("doubt", 0.75),
        ("unpaid", 1.5),
        ("strike", 1.25),
        ("crisis", 1.0),
        ("rested", 0.75),
        ("rotation", 0.5),
        ("returns", 0.5),
    ] {
        if text.contains(keyword) {
            boost += weight;
        }
    }
    boost
}
