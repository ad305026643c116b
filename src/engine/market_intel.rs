//! Market intelligence signals.
//!
//! Three reads on the market tape: news impact decaying exponentially with
//! age, steam moves (a sharp single-direction price drop inside a short
//! window), and reverse line movement (the line moving against the public
//! side, read as sharp action on the other one).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Match, OddsSnapshot};
use crate::util::time::parse_instant;

/// Default per-minute decay rate; tuned so a headline is worth ~1% of its
/// initial impact after 24 hours.
pub const NEWS_DECAY_LAMBDA: f64 = 0.0032;

/// Impact floor as a fraction of the initial score.
const DECAY_FLOOR: f64 = 0.01;

/// Fallback age for unparseable publication dates, minutes.
const DEFAULT_NEWS_AGE_MINUTES: f64 = 30.0;

/// Steam detection: minimum drop inside the window.
pub const STEAM_MOVE_THRESHOLD_PCT: f64 = 5.0;
pub const STEAM_WINDOW_MINUTES: i64 = 15;

/// RLM: share of public money that defines a public side, and the minimum
/// adverse move.
pub const RLM_PUBLIC_THRESHOLD: f64 = 0.65;
pub const RLM_BASE_THRESHOLD_PCT: f64 = 4.0;

#[derive(Debug, Clone, Serialize)]
pub struct SteamMoveSignal {
    /// HOME / DRAW / AWAY.
    pub market: String,
    pub drop_pct: f64,
    pub window_minutes: i64,
    pub from_odd: f64,
    pub to_odd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReverseLineSignal {
    pub public_side: String,
    pub sharp_side: String,
    pub movement_pct: f64,
    /// LOW / MEDIUM / HIGH.
    pub confidence: String,
    pub public_share: f64,
}

/// Exponential decay of a news impact score over its age in minutes.
/// Non-positive ages pass the score through; non-positive scores are zero.
pub fn apply_news_decay(score: f64, minutes_since_publish: f64, lambda: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    if minutes_since_publish <= 0.0 {
        return score;
    }
    let decayed = score * (-lambda * minutes_since_publish).exp();
    decayed.max(score * DECAY_FLOOR)
}

/// Parse the relative-date strings news feeds emit ("just now", "15 minutes
/// ago", "2 hours ago", "3 days ago") or an absolute timestamp, into an age
/// and a freshness multiplier. Malformed input gets the default age.
pub fn news_freshness_multiplier(raw_date: Option<&str>, lambda: f64) -> (f64, f64) {
    let minutes = raw_date
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(parse_relative_minutes)
        .unwrap_or(DEFAULT_NEWS_AGE_MINUTES);
    let multiplier = (-lambda * minutes).exp().max(DECAY_FLOOR);
    (multiplier, minutes)
}

fn parse_relative_minutes(raw: &str) -> Option<f64> {
    let lower = raw.to_lowercase();
    if lower.contains("just now") || lower == "now" {
        return Some(2.0);
    }

    // "<n> <unit> ago" shapes.
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    if tokens.len() >= 2 {
        if let Ok(n) = tokens[0].parse::<f64>() {
            let unit = tokens[1];
            if unit.starts_with("minute") || unit.starts_with("min") {
                return Some(n);
            }
            if unit.starts_with("hour") || unit.starts_with('h') {
                return Some(n * 60.0);
            }
            if unit.starts_with("day") {
                return Some(n * 24.0 * 60.0);
            }
        }
    }

    // Absolute timestamps from API feeds.
    if let Some(published) = parse_instant(raw) {
        let age = (Utc::now() - published).num_minutes();
        return Some(age.max(0) as f64);
    }

    None
}

/// Steam move: the current price sits >= threshold below a snapshot taken
/// inside the steam window. Requires history; the freshest qualifying market
/// with the largest drop wins.
pub fn detect_steam_move(
    m: &Match,
    history: &[OddsSnapshot],
    now: DateTime<Utc>,
) -> Option<SteamMoveSignal> {
    if history.is_empty() {
        return None;
    }

    let window_start = now - Duration::minutes(STEAM_WINDOW_MINUTES);
    let mut best: Option<SteamMoveSignal> = None;

    for snapshot in history {
        if snapshot.captured_at < window_start || snapshot.captured_at > now {
            continue;
        }
        let window_minutes = (now - snapshot.captured_at).num_minutes();
        let candidates = [
            ("HOME", snapshot.home_odd, m.current_home_odd),
            ("DRAW", snapshot.draw_odd, m.current_draw_odd),
            ("AWAY", snapshot.away_odd, m.current_away_odd),
        ];
        for (market, then, current) in candidates {
            let (Some(then), Some(current)) = (then, current) else {
                continue;
            };
            if then <= 1.0 || current <= 1.0 || current >= then {
                continue;
            }
            let drop_pct = (then - current) / then * 100.0;
            if drop_pct < STEAM_MOVE_THRESHOLD_PCT {
                continue;
            }
            let replace = best
                .as_ref()
                .map(|b| drop_pct > b.drop_pct)
                .unwrap_or(true);
            if replace {
                best = Some(SteamMoveSignal {
                    market: market.to_string(),
                    drop_pct,
                    window_minutes,
                    from_odd: then,
                    to_odd: current,
                });
            }
        }
    }

    best
}

/// Estimate how the public splits a two-way market: bettors pile onto the
/// favorite, roughly proportional to implied probability.
pub fn estimate_public_split(opening_home: f64, opening_away: f64) -> (f64, f64) {
    let ih = 1.0 / opening_home;
    let ia = 1.0 / opening_away;
    let total = ih + ia;
    if total <= 0.0 {
        return (0.5, 0.5);
    }
    (ih / total, ia / total)
}

/// Reverse line movement on the 1X2 home/away axis. Returns a signal only
/// when a public side exists (share >= threshold) and its price moved AGAINST
/// the public by at least the base threshold.
pub fn detect_reverse_line_movement(
    m: &Match,
    public: Option<(f64, f64)>,
) -> Option<ReverseLineSignal> {
    let opening_home = m.opening_home_odd.filter(|o| *o > 1.0)?;
    let current_home = m.current_home_odd.filter(|o| *o > 1.0)?;
    let opening_away = m.opening_away_odd.filter(|o| *o > 1.0)?;
    let current_away = m.current_away_odd.filter(|o| *o > 1.0)?;

    let (public_home, public_away) =
        public.unwrap_or_else(|| estimate_public_split(opening_home, opening_away));

    let (public_side, sharp_side, opening, current, public_share) =
        if public_home >= RLM_PUBLIC_THRESHOLD {
            ("HOME", "AWAY", opening_home, current_home, public_home)
        } else if public_away >= RLM_PUBLIC_THRESHOLD {
            ("AWAY", "HOME", opening_away, current_away, public_away)
        } else {
            return None;
        };

    // The public side's odds RISING despite the money = book moving the line
    // for the sharps on the other side.
    let movement_pct = (current - opening) / opening * 100.0;
    if movement_pct < RLM_BASE_THRESHOLD_PCT {
        return None;
    }

    let confidence = if movement_pct >= RLM_BASE_THRESHOLD_PCT + 2.0 {
        "HIGH"
    } else if movement_pct >= RLM_BASE_THRESHOLD_PCT + 1.0 {
        "MEDIUM"
    } else {
        "LOW"
    };

    Some(ReverseLineSignal {
        public_side: public_side.to_string(),
        sharp_side: sharp_side.to_string(),
        movement_pct,
        confidence: confidence.to_string(),
        public_share,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn match_with_odds(
        opening_home: f64,
        current_home: f64,
        opening_away: f64,
        current_away: f64,
    ) -> Match {
        let mut m = Match::new("m1", "serie_a", "Home FC", "Away FC", now() + Duration::hours(6));
        m.opening_home_odd = Some(opening_home);
        m.current_home_odd = Some(current_home);
        m.opening_away_odd = Some(opening_away);
        m.current_away_odd = Some(current_away);
        m
    }

    fn snapshot(minutes_ago: i64, home: f64, draw: f64, away: f64) -> OddsSnapshot {
        OddsSnapshot {
            match_id: "m1".to_string(),
            captured_at: now() - Duration::minutes(minutes_ago),
            home_odd: Some(home),
            draw_odd: Some(draw),
            away_odd: Some(away),
            over25_odd: None,
            btts_odd: None,
        }
    }

    #[test]
    fn test_decay_passthrough_and_zero() {
        assert_eq!(apply_news_decay(10.0, 0.0, NEWS_DECAY_LAMBDA), 10.0);
        assert_eq!(apply_news_decay(8.0, -5.0, NEWS_DECAY_LAMBDA), 8.0);
        assert_eq!(apply_news_decay(0.0, 30.0, NEWS_DECAY_LAMBDA), 0.0);
        assert_eq!(apply_news_decay(-5.0, 10.0, NEWS_DECAY_LAMBDA), 0.0);
    }

    #[test]
    fn test_decay_is_monotone_in_age() {
        let r5 = apply_news_decay(10.0, 5.0, NEWS_DECAY_LAMBDA);
        let r30 = apply_news_decay(10.0, 30.0, NEWS_DECAY_LAMBDA);
        let r60 = apply_news_decay(10.0, 60.0, NEWS_DECAY_LAMBDA);
        assert!(r5 > r30 && r30 > r60);
        assert!(r5 < 10.0);
    }

    #[test]
    fn test_decay_formula_and_floor() {
        let expected = 10.0 * (-NEWS_DECAY_LAMBDA * 20.0).exp();
        assert!((apply_news_decay(10.0, 20.0, NEWS_DECAY_LAMBDA) - expected).abs() < 1e-3);

        // After 25 hours the floor holds at 1%.
        let old = apply_news_decay(10.0, 25.0 * 60.0, NEWS_DECAY_LAMBDA);
        assert!((old - 0.1).abs() < 0.02);
    }

    #[test]
    fn test_custom_lambda_ordering() {
        let fast = apply_news_decay(10.0, 10.0, 0.1);
        let slow = apply_news_decay(10.0, 10.0, 0.02);
        assert!(fast < slow);
    }

    #[test]
    fn test_freshness_parsing() {
        let (mult, minutes) = news_freshness_multiplier(Some("just now"), NEWS_DECAY_LAMBDA);
        assert!(minutes <= 5.0);
        assert!(mult > 0.9);

        let (_, minutes) = news_freshness_multiplier(Some("15 minutes ago"), NEWS_DECAY_LAMBDA);
        assert_eq!(minutes, 15.0);

        let (_, minutes) = news_freshness_multiplier(Some("2 hours ago"), NEWS_DECAY_LAMBDA);
        assert_eq!(minutes, 120.0);

        let (_, minutes) = news_freshness_multiplier(Some("1 day ago"), NEWS_DECAY_LAMBDA);
        assert_eq!(minutes, 24.0 * 60.0);
    }

    #[test]
    fn test_freshness_defaults() {
        for raw in [None, Some(""), Some("not a date at all xyz")] {
            let (mult, minutes) = news_freshness_multiplier(raw, NEWS_DECAY_LAMBDA);
            assert_eq!(minutes, 30.0);
            assert!(mult > 0.0 && mult < 1.0);
        }
    }

    #[test]
    fn test_steam_move_detected_on_rapid_drop() {
        let mut m = match_with_odds(2.00, 1.88, 3.80, 3.80);
        m.current_draw_odd = Some(3.50);
        let history = vec![
            snapshot(10, 2.00, 3.50, 3.80),
            snapshot(5, 1.95, 3.50, 3.80),
        ];
        let signal = detect_steam_move(&m, &history, now()).unwrap();
        assert_eq!(signal.market, "HOME");
        assert!(signal.drop_pct >= STEAM_MOVE_THRESHOLD_PCT);
        assert!(signal.window_minutes <= STEAM_WINDOW_MINUTES);
    }

    #[test]
    fn test_steam_move_outside_window_ignored() {
        let m = match_with_odds(2.00, 1.80, 3.80, 3.80);
        let history = vec![snapshot(120, 2.00, 3.50, 3.80)];
        assert!(detect_steam_move(&m, &history, now()).is_none());
    }

    #[test]
    fn test_steam_move_small_drop_ignored() {
        let m = match_with_odds(2.00, 1.96, 3.80, 3.80);
        let history = vec![snapshot(5, 2.00, 3.50, 3.80)];
        assert!(detect_steam_move(&m, &history, now()).is_none());
    }

    #[test]
    fn test_steam_move_no_history() {
        let m = match_with_odds(2.00, 1.80, 3.80, 3.80);
        assert!(detect_steam_move(&m, &[], now()).is_none());
    }

    #[test]
    fn test_rlm_high_confidence_scenario() {
        // Public 70% on home, home odds +6.5%: sharp money on AWAY.
        let m = match_with_odds(2.00, 2.13, 2.00, 1.87);
        let signal = detect_reverse_line_movement(&m, Some((0.70, 0.30))).unwrap();
        assert_eq!(signal.sharp_side, "AWAY");
        assert_eq!(signal.public_side, "HOME");
        assert_eq!(signal.confidence, "HIGH");
    }

    #[test]
    fn test_rlm_medium_confidence() {
        let m = match_with_odds(1.80, 1.90, 2.20, 2.10);
        let signal = detect_reverse_line_movement(&m, Some((0.70, 0.30))).unwrap();
        assert_eq!(signal.sharp_side, "AWAY");
        assert_eq!(signal.confidence, "MEDIUM");
    }

    #[test]
    fn test_rlm_not_detected_when_line_follows_public() {
        let m = match_with_odds(1.80, 1.70, 2.20, 2.30);
        assert!(detect_reverse_line_movement(&m, Some((0.70, 0.30))).is_none());
    }

    #[test]
    fn test_rlm_requires_public_threshold() {
        let m = match_with_odds(1.80, 1.90, 2.20, 2.10);
        assert!(detect_reverse_line_movement(&m, Some((0.50, 0.50))).is_none());
    }

    #[test]
    fn test_rlm_missing_odds() {
        let mut m = match_with_odds(1.80, 1.90, 2.20, 2.10);
        m.opening_home_odd = None;
        assert!(detect_reverse_line_movement(&m, Some((0.70, 0.30))).is_none());

        let mut m2 = match_with_odds(1.80, 1.90, 2.20, 2.10);
        m2.opening_home_odd = Some(0.0);
        assert!(detect_reverse_line_movement(&m2, Some((0.70, 0.30))).is_none());
    }

    #[test]
    fn test_rlm_estimates_public_from_favorite() {
        // Strong favorite drifting out with no explicit public data: the
        // estimator assumes the public is on the short price.
        let m = match_with_odds(1.50, 1.60, 3.00, 2.80);
        let signal = detect_reverse_line_movement(&m, None).unwrap();
        assert_eq!(signal.public_side, "HOME");
        assert_eq!(signal.sharp_side, "AWAY");
        assert!(signal.public_share >= RLM_PUBLIC_THRESHOLD);
    }
}
