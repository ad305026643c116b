//! End-to-end scenarios across the store, engines and analyzer, without any
//! network access.

use chrono::{Duration, Utc};

use pitchbot_backend::analysis::analyzer;
use pitchbot_backend::config::LeagueParams;
use pitchbot_backend::engine::biscotto::{self, BiscottoSeverity};
use pitchbot_backend::engine::market_intel;
use pitchbot_backend::engine::poisson::{calculate_btts_trend, PoissonModel};
use pitchbot_backend::enrichment::EnrichmentResult;
use pitchbot_backend::models::{Match, OddsSnapshot, Verdict};
use pitchbot_backend::providers::stats::{TableStanding, TeamStats};
use pitchbot_backend::storage::{SqliteStore, Store};

fn upcoming_match(id: &str) -> Match {
    let mut m = Match::new(
        id,
        "serie_a",
        "Inter",
        "Napoli",
        Utc::now() + Duration::hours(20),
    );
    m.opening_home_odd = Some(1.70);
    m.opening_draw_odd = Some(3.70);
    m.opening_away_odd = Some(5.20);
    m.current_home_odd = Some(1.65);
    m.current_draw_odd = Some(3.80);
    m.current_away_odd = Some(5.50);
    m.over25_odd = Some(1.85);
    m.btts_odd = Some(1.75);
    m
}

fn team_stats(scored: f64, conceded: f64) -> TeamStats {
    TeamStats {
        matches_played: 10,
        avg_scored: scored,
        avg_conceded: conceded,
        avg_cards: None,
        avg_corners: None,
        h2h: vec![],
        form_points_per_game: Some(1.5),
    }
}

#[test]
fn scenario_poisson_kelly_value_detected() {
    // Strong home side against a leaky defense at 1.65: the model must see a
    // better-than-even home win, a fair odd consistent with it, value on at
    // least one market, and a capped stake.
    let model = PoissonModel::default();
    let analysis = model
        .analyze_match(
            2.1,
            0.8,
            1.2,
            1.9,
            Some(1.65),
            Some(3.80),
            Some(5.50),
            Some(1.85),
            None,
            Some(1.75),
            10,
        )
        .expect("valid inputs simulate");

    assert!(analysis.poisson.home_win_prob > 0.50);
    let home = &analysis.edges["home"];
    assert!((home.fair_odd - 1.0 / analysis.poisson.home_win_prob).abs() <= 0.02);
    assert!(analysis.edges.values().any(|e| e.has_value));
    for edge in analysis.edges.values() {
        assert!(edge.kelly_stake <= 5.0);
    }
}

#[test]
fn scenario_btts_trend_high() {
    let trend = calculate_btts_trend(&[(2, 1), (1, 0), (1, 2), (0, 0), (3, 1)]);
    assert_eq!(trend.btts_hits, 3);
    assert_eq!(trend.total_games, 5);
    assert_eq!(trend.btts_rate, 60.0);
    assert_eq!(trend.trend_signal, "High");
}

#[test]
fn scenario_biscotto_extreme_bet_x() {
    let home = TableStanding {
        position: 17,
        points: 34,
        total_teams: 20,
        zone: "Danger Zone".to_string(),
    };
    let away = TableStanding {
        position: 18,
        points: 33,
        total_teams: 20,
        zone: "Relegation".to_string(),
    };
    let analysis = biscotto::analyze_biscotto(
        "Home FC",
        "Away FC",
        Some(1.80),
        Some(3.00),
        Some(&home),
        Some(&away),
        Some(2),
        &LeagueParams::default(),
    );
    assert_eq!(analysis.severity, BiscottoSeverity::Extreme);
    assert!(analysis.betting_recommendation.starts_with("BET X"));
}

#[test]
fn scenario_rlm_high_confidence() {
    let mut m = upcoming_match("rlm1");
    m.opening_home_odd = Some(2.00);
    m.current_home_odd = Some(2.13);
    m.opening_away_odd = Some(2.00);
    m.current_away_odd = Some(1.87);

    let signal = market_intel::detect_reverse_line_movement(&m, Some((0.70, 0.30)))
        .expect("RLM detected");
    assert_eq!(signal.sharp_side, "AWAY");
    assert_eq!(signal.confidence, "HIGH");
}

#[test]
fn store_round_trip_feeds_the_analyzer() {
    let store = SqliteStore::in_memory().unwrap();
    let m = upcoming_match("e2e1");
    store.upsert_match(&m).unwrap();

    // A steam-ish odds trail inside the last hour.
    for (minutes_ago, home_odd) in [(50i64, 1.80), (10, 1.78), (4, 1.65)] {
        store
            .append_odds_snapshot(&OddsSnapshot {
                match_id: m.id.clone(),
                captured_at: Utc::now() - Duration::minutes(minutes_ago),
                home_odd: Some(home_odd),
                draw_odd: m.current_draw_odd,
                away_odd: m.current_away_odd,
                over25_odd: m.over25_odd,
                btts_odd: m.btts_odd,
            })
            .unwrap();
    }

    let pending = store
        .read_pending_matches(Utc::now(), Duration::hours(48))
        .unwrap();
    assert_eq!(pending.len(), 1);
    let stored = &pending[0];
    assert_eq!(stored.opening_home_odd, Some(1.65), "first sighting freezes opening");

    let history = store
        .read_odds_history(&stored.id, Duration::minutes(60))
        .unwrap();
    assert_eq!(history.len(), 3);

    let mut enrichment = EnrichmentResult::default();
    enrichment.home_stats = Some(team_stats(2.1, 0.8));
    enrichment.away_stats = Some(team_stats(1.2, 1.9));

    let bundle = analyzer::build_signal_bundle(
        stored,
        &enrichment,
        &[],
        &history,
        &LeagueParams::default(),
        -0.07,
    );
    assert!(bundle.quant.is_some());
    assert!(bundle.preliminary_score > 0.0);

    // The steam detector sees the 1.78 -> 1.65 drop inside the window.
    assert!(bundle.steam.is_some());
}

#[test]
fn verdict_pipeline_is_deterministic_per_cycle() {
    let m = upcoming_match("det1");
    let mut enrichment = EnrichmentResult::default();
    enrichment.home_stats = Some(team_stats(1.9, 1.0));
    enrichment.away_stats = Some(team_stats(1.0, 1.7));

    let league = LeagueParams::default();
    let verdict_json = serde_json::json!({
        "final_verdict": "BET",
        "confidence": 74,
        "recommended_market": "1",
        "combo_reasoning": "model edge confirmed by market direction",
        "primary_driver": "QUANT_EDGE"
    });

    let run = || {
        let bundle = analyzer::build_signal_bundle(&m, &enrichment, &[], &[], &league, -0.07);
        analyzer::normalize_verdict(&m, &verdict_json, &bundle, 60)
    };
    let first = run();
    let second = run();
    assert_eq!(first, second, "same upstream state, same verdict");
    assert_eq!(first.verdict, Verdict::Bet);

    // Serde round-trip preserves the record exactly.
    let json = serde_json::to_string(&first).unwrap();
    let back: pitchbot_backend::models::AnalysisResult = serde_json::from_str(&json).unwrap();
    assert_eq!(first, back);
}

#[test]
fn alert_log_allows_one_decision_per_cycle() {
    let store = SqliteStore::in_memory().unwrap();
    let m = upcoming_match("cy1");
    store.upsert_match(&m).unwrap();

    let result = pitchbot_backend::models::AnalysisResult {
        match_id: m.id.clone(),
        verdict: Verdict::Bet,
        confidence: 80,
        recommended_market: "1".to_string(),
        reasoning: "edge".to_string(),
        primary_driver: "QUANT_EDGE".to_string(),
        quant: pitchbot_backend::models::QuantBlock::empty(),
        verification: pitchbot_backend::models::VerificationStatus::Confirmed,
    };

    assert!(!store.has_alert(&m.id, 3).unwrap());
    store.record_alert(3, 8.0, &result).unwrap();
    assert!(store.has_alert(&m.id, 3).unwrap());
    // A later cycle is a fresh decision slot.
    assert!(!store.has_alert(&m.id, 4).unwrap());
}
