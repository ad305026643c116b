//! Mutually-beneficial-draw detector.
//!
//! A "biscotto" is a draw that serves both teams' standings objectives;
//! not necessarily fixed, but a statistical anomaly worth pricing. Signals:
//! absolute draw-odd level against a league threshold, the opening-to-current
//! drop pattern (DRIFT vs CRASH), a z-score against the league's baseline
//! draw probability, and end-of-season mutual-benefit table analysis. The
//! factors combine into a weighted score bucketed into severity.

use serde::Serialize;

use crate::config::LeagueParams;
use crate::providers::stats::TableStanding;

/// League baseline draw probability and its spread.
pub const LEAGUE_AVG_DRAW_PROB: f64 = 0.28;
pub const LEAGUE_DRAW_STD: f64 = 0.05;

/// An absolute draw odd at or below this is anomalous in any league.
const EXTREME_LOW_ODD: f64 = 2.0;

/// Draw threshold bump for minor leagues and late-season matches.
const MINOR_LEAGUE_BUMP: f64 = 0.10;
const END_OF_SEASON_BUMP: f64 = 0.15;

/// Drop-from-opening classification, percent.
const DRIFT_DROP_PCT: f64 = 15.0;
const CRASH_DROP_PCT: f64 = 25.0;

/// Season tail where standings motives dominate.
const END_OF_SEASON_MATCHES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiscottoSeverity {
    None,
    Low,
    Medium,
    High,
    Extreme,
}

impl BiscottoSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiscottoSeverity::None => "NONE",
            BiscottoSeverity::Low => "LOW",
            BiscottoSeverity::Medium => "MEDIUM",
            BiscottoSeverity::High => "HIGH",
            BiscottoSeverity::Extreme => "EXTREME",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BiscottoAnalysis {
    pub is_suspect: bool,
    pub severity: BiscottoSeverity,
    pub factors: Vec<String>,
    /// STABLE / DRIFT / CRASH.
    pub odds_pattern: String,
    pub implied_prob: f64,
    pub zscore: f64,
    pub drop_pct: f64,
    pub end_of_season_match: bool,
    pub mutual_benefit: bool,
    pub betting_recommendation: String,
}

/// Implied probability of an odd; invalid or missing prices carry none.
pub fn calculate_implied_probability(odd: Option<f64>) -> f64 {
    match odd {
        Some(o) if o > 1.0 => 1.0 / o,
        _ => 0.0,
    }
}

/// Z-score of a draw probability against the league baseline.
pub fn calculate_zscore(prob: f64) -> f64 {
    if prob <= 0.0 {
        return 0.0;
    }
    (prob - LEAGUE_AVG_DRAW_PROB) / LEAGUE_DRAW_STD
}

fn relegation_threatened(standing: &TableStanding) -> bool {
    matches!(standing.zone.as_str(), "Relegation" | "Danger Zone")
}

fn chasing_europe(standing: &TableStanding) -> bool {
    (5..=7).contains(&standing.position)
}

/// Both sides gain from a point: both fighting the drop, or both within
/// reach of the last European spot.
fn mutual_benefit(home: Option<&TableStanding>, away: Option<&TableStanding>) -> bool {
    match (home, away) {
        (Some(h), Some(a)) => {
            (relegation_threatened(h) && relegation_threatened(a))
                || (chasing_europe(h) && chasing_europe(a))
        }
        _ => false,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn analyze_biscotto(
    home_team: &str,
    away_team: &str,
    current_draw_odd: Option<f64>,
    opening_draw_odd: Option<f64>,
    home_standing: Option<&TableStanding>,
    away_standing: Option<&TableStanding>,
    matches_remaining: Option<u32>,
    league: &LeagueParams,
) -> BiscottoAnalysis {
    let end_of_season = matches_remaining
        .map(|m| m <= END_OF_SEASON_MATCHES)
        .unwrap_or(false);
    let mutual = mutual_benefit(home_standing, away_standing);

    let not_suspect = |pattern: &str| BiscottoAnalysis {
        is_suspect: false,
        severity: BiscottoSeverity::None,
        factors: Vec::new(),
        odds_pattern: pattern.to_string(),
        implied_prob: 0.0,
        zscore: 0.0,
        drop_pct: 0.0,
        end_of_season_match: end_of_season,
        mutual_benefit: mutual,
        betting_recommendation: "AVOID".to_string(),
    };

    // Missing or degenerate draw prices are never suspect.
    let draw_odd = match current_draw_odd {
        Some(o) if o > 1.0 => o,
        _ => return not_suspect("UNKNOWN"),
    };

    let implied = calculate_implied_probability(Some(draw_odd));
    let zscore = calculate_zscore(implied);

    let drop_pct = match opening_draw_odd {
        Some(open) if open > 1.0 && open > draw_odd => (open - draw_odd) / open * 100.0,
        _ => 0.0,
    };
    let odds_pattern = if drop_pct >= CRASH_DROP_PCT {
        "CRASH"
    } else if drop_pct >= DRIFT_DROP_PCT {
        "DRIFT"
    } else {
        "STABLE"
    };

    let mut suspicious_threshold = league.draw_threshold_base;
    if league.is_minor {
        suspicious_threshold += MINOR_LEAGUE_BUMP;
    }
    if end_of_season {
        suspicious_threshold += END_OF_SEASON_BUMP;
    }

    let mut score = 0u32;
    let mut factors = Vec::new();

    if draw_odd <= EXTREME_LOW_ODD {
        score += 4;
        factors.push(format!("draw odd {draw_odd:.2} at extreme-low level"));
    } else if draw_odd <= suspicious_threshold {
        score += 2;
        factors.push(format!(
            "draw odd {draw_odd:.2} below league threshold {suspicious_threshold:.2}"
        ));
    }

    match odds_pattern {
        "CRASH" => {
            score += 3;
            factors.push(format!("draw odd crashed {drop_pct:.1}% from opening"));
        }
        "DRIFT" => {
            score += 2;
            factors.push(format!("draw odd drifted {drop_pct:.1}% from opening"));
        }
        _ => {}
    }

    if zscore >= 3.0 {
        score += 2;
        factors.push(format!("draw probability z-score {zscore:.1} vs league baseline"));
    } else if zscore >= 2.0 {
        score += 1;
        factors.push(format!("draw probability z-score {zscore:.1} vs league baseline"));
    }

    if end_of_season && mutual {
        score += 3;
        factors.push("end of season with mutual-benefit standings".to_string());
    }

    let severity = match score {
        0 => BiscottoSeverity::None,
        1..=2 => BiscottoSeverity::Low,
        3..=4 => BiscottoSeverity::Medium,
        5..=6 => BiscottoSeverity::High,
        _ => BiscottoSeverity::Extreme,
    };

    let betting_recommendation = match severity {
        BiscottoSeverity::Extreme | BiscottoSeverity::High => format!(
            "BET X ({home_team} vs {away_team} draw @ {draw_odd:.2}, severity {})",
            severity.as_str()
        ),
        BiscottoSeverity::Medium => "MONITOR".to_string(),
        _ => "AVOID".to_string(),
    };

    BiscottoAnalysis {
        is_suspect: severity >= BiscottoSeverity::Medium,
        severity,
        factors,
        odds_pattern: odds_pattern.to_string(),
        implied_prob: implied,
        zscore,
        drop_pct,
        end_of_season_match: end_of_season,
        mutual_benefit: mutual,
        betting_recommendation,
    }
}

/// Dossier block for the analyzer; empty when nothing is suspect.
pub fn format_biscotto_context(analysis: &BiscottoAnalysis) -> String {
    if !analysis.is_suspect {
        return String::new();
    }
    format!(
        "DRAW ANOMALY ({}): {} | pattern {} | {}",
        analysis.severity.as_str(),
        analysis.factors.join("; "),
        analysis.odds_pattern,
        analysis.betting_recommendation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(position: u32, points: u32, zone: &str) -> TableStanding {
        TableStanding {
            position,
            points,
            total_teams: 20,
            zone: zone.to_string(),
        }
    }

    fn league() -> LeagueParams {
        LeagueParams::default()
    }

    #[test]
    fn test_implied_probability() {
        assert_eq!(calculate_implied_probability(Some(2.0)), 0.5);
        assert_eq!(calculate_implied_probability(Some(4.0)), 0.25);
        assert_eq!(calculate_implied_probability(None), 0.0);
        assert_eq!(calculate_implied_probability(Some(1.0)), 0.0);
        assert_eq!(calculate_implied_probability(Some(0.5)), 0.0);
    }

    #[test]
    fn test_zscore() {
        assert_eq!(calculate_zscore(LEAGUE_AVG_DRAW_PROB), 0.0);
        assert!(calculate_zscore(0.50) > 2.0);
        assert_eq!(calculate_zscore(0.0), 0.0);
        assert_eq!(calculate_zscore(-0.5), 0.0);
    }

    #[test]
    fn test_missing_odds_not_suspect() {
        let a = analyze_biscotto("Home FC", "Away FC", None, None, None, None, None, &league());
        assert!(!a.is_suspect);
        assert_eq!(a.severity, BiscottoSeverity::None);
        assert_eq!(a.betting_recommendation, "AVOID");

        let b = analyze_biscotto("H", "A", Some(1.0), None, None, None, None, &league());
        assert!(!b.is_suspect);
    }

    #[test]
    fn test_extreme_crash_scenario() {
        let a = analyze_biscotto(
            "Home FC",
            "Away FC",
            Some(1.80),
            Some(3.00),
            None,
            None,
            None,
            &league(),
        );
        assert!(a.is_suspect);
        assert_eq!(a.severity, BiscottoSeverity::Extreme);
        assert_eq!(a.odds_pattern, "CRASH");
        assert!(a.betting_recommendation.starts_with("BET X"));
    }

    #[test]
    fn test_end_of_season_mutual_benefit_extreme() {
        // Both needing a point with two rounds left, heavy crash.
        let home = standing(17, 34, "Danger Zone");
        let away = standing(18, 33, "Relegation");
        let a = analyze_biscotto(
            "Home FC",
            "Away FC",
            Some(1.80),
            Some(3.00),
            Some(&home),
            Some(&away),
            Some(2),
            &league(),
        );
        assert_eq!(a.severity, BiscottoSeverity::Extreme);
        assert!(a.end_of_season_match);
        assert!(a.mutual_benefit);
        assert!(a.betting_recommendation.starts_with("BET X"));
    }

    #[test]
    fn test_suspicious_level_with_drift() {
        let a = analyze_biscotto(
            "Home FC",
            "Away FC",
            Some(2.30),
            Some(2.80),
            None,
            None,
            None,
            &league(),
        );
        assert!(a.is_suspect);
        assert!(matches!(
            a.severity,
            BiscottoSeverity::Extreme | BiscottoSeverity::High | BiscottoSeverity::Medium
        ));
    }

    #[test]
    fn test_normal_odds_not_suspect() {
        let a = analyze_biscotto(
            "Home FC",
            "Away FC",
            Some(3.50),
            Some(3.60),
            None,
            None,
            None,
            &league(),
        );
        assert!(!a.is_suspect);
        assert_eq!(a.severity, BiscottoSeverity::None);
        assert_eq!(a.odds_pattern, "STABLE");
    }

    #[test]
    fn test_end_of_season_flag_without_mutual_benefit() {
        let home = standing(18, 25, "Relegation");
        let away = standing(17, 26, "Danger Zone");
        let a = analyze_biscotto(
            "Home FC",
            "Away FC",
            Some(2.60),
            Some(3.20),
            Some(&home),
            Some(&away),
            Some(3),
            &league(),
        );
        assert!(a.end_of_season_match);
        // Relegation pair is also a mutual-benefit pattern here.
        assert!(a.mutual_benefit);
        assert!(a.is_suspect);
    }

    #[test]
    fn test_minor_league_threshold_looser() {
        let minor = LeagueParams {
            is_minor: true,
            ..LeagueParams::default()
        };
        // 2.55 clears the 2.50 default but sits under the minor-league 2.60.
        let in_minor = analyze_biscotto(
            "H", "A", Some(2.55), None, None, None, None, &minor,
        );
        let in_major = analyze_biscotto(
            "H", "A", Some(2.55), None, None, None, None, &league(),
        );
        assert!(in_minor.factors.iter().any(|f| f.contains("below league threshold")));
        assert!(!in_major.factors.iter().any(|f| f.contains("below league threshold")));
    }

    #[test]
    fn test_europe_chasers_mutual_benefit() {
        let home = standing(5, 55, "Mid Table");
        let away = standing(6, 54, "Mid Table");
        assert!(mutual_benefit(Some(&home), Some(&away)));
        let far = standing(12, 40, "Mid Table");
        assert!(!mutual_benefit(Some(&home), Some(&far)));
        assert!(!mutual_benefit(None, Some(&away)));
    }

    #[test]
    fn test_context_block_empty_when_clean() {
        let clean = analyze_biscotto(
            "H", "A", Some(3.50), Some(3.60), None, None, None, &league(),
        );
        assert!(format_biscotto_context(&clean).is_empty());

        let hot = analyze_biscotto(
            "H", "A", Some(1.80), Some(3.00), None, None, None, &league(),
        );
        assert!(format_biscotto_context(&hot).contains("DRAW ANOMALY"));
    }
}
