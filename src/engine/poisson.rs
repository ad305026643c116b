//! Quantitative match model.
//!
//! Poisson scoreline grid with the Dixon-Coles low-score correction,
//! league-parameterized home advantage, market edge calculation and a
//! shrinkage quarter-Kelly stake. This is the "big data" leg that the
//! qualitative AI triangulation is checked against.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

/// League average goals per team per match (typical European leagues).
pub const DEFAULT_LEAGUE_AVG: f64 = 1.35;

/// Minimum matches for a reliable Poisson estimate.
pub const MIN_MATCHES_REQUIRED: u32 = 5;

/// Money-management cap: maximum stake as % of bankroll.
pub const MAX_STAKE_PCT: f64 = 5.0;

/// Dixon-Coles correlation parameter. Research puts the optimum around
/// -0.05..-0.08 for most leagues.
pub const DIXON_COLES_RHO: f64 = -0.07;

const MAX_GOALS: u32 = 6;

#[derive(Debug, Clone, Serialize)]
pub struct PoissonResult {
    pub home_win_prob: f64,
    pub draw_prob: f64,
    pub away_win_prob: f64,
    pub home_lambda: f64,
    pub away_lambda: f64,
    pub most_likely_score: String,
    pub over_25_prob: f64,
    pub under_25_prob: f64,
    pub btts_prob: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeResult {
    pub market: String,
    /// Model probability, percent.
    pub math_prob: f64,
    /// Bookmaker-implied probability, percent.
    pub implied_prob: f64,
    /// Percentage points: math - implied.
    pub edge: f64,
    pub fair_odd: f64,
    pub actual_odd: f64,
    /// Quarter-Kelly stake, percent of bankroll, capped.
    pub kelly_stake: f64,
    pub has_value: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchAnalysis {
    pub poisson: PoissonResult,
    pub edges: BTreeMap<String, EdgeResult>,
    pub best_market: Option<String>,
    pub expected_goals: f64,
    pub most_likely_score: String,
}

impl MatchAnalysis {
    pub fn best_edge(&self) -> Option<&EdgeResult> {
        self.best_market.as_ref().and_then(|m| self.edges.get(m))
    }
}

/// H2H both-teams-scored pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BttsTrend {
    pub btts_rate: f64,
    pub btts_hits: u32,
    pub total_games: u32,
    pub trend_signal: String,
}

pub struct PoissonModel {
    league_avg: f64,
    home_advantage: f64,
    rho: f64,
}

impl Default for PoissonModel {
    fn default() -> Self {
        Self::new(DEFAULT_LEAGUE_AVG, 0.30, DIXON_COLES_RHO)
    }
}

impl PoissonModel {
    pub fn new(league_avg: f64, home_advantage: f64, rho: f64) -> Self {
        Self {
            league_avg,
            home_advantage,
            rho,
        }
    }

    /// P(X = k) for X ~ Poisson(lambda).
    pub fn poisson_probability(lambda: f64, k: u32) -> f64 {
        if lambda <= 0.0 {
            return if k == 0 { 1.0 } else { 0.0 };
        }
        let mut factorial = 1.0;
        for i in 2..=k {
            factorial *= i as f64;
        }
        lambda.powi(k as i32) * (-lambda).exp() / factorial
    }

    /// Dixon-Coles correction multiplier for the low-score cells. With a
    /// negative rho the 0-0 and 1-1 cells are inflated (draws are
    /// underestimated by the independent-Poisson assumption). The raw factor
    /// is clamped to [0.01, 2.0]: at high lambdas the unclamped formula blows
    /// past 2x.
    pub fn dixon_coles_correction(
        home_goals: u32,
        away_goals: u32,
        home_lambda: f64,
        away_lambda: f64,
        rho: f64,
    ) -> f64 {
        let correction = match (home_goals, away_goals) {
            (0, 0) => 1.0 - home_lambda * away_lambda * rho,
            (0, 1) => 1.0 + home_lambda * rho,
            (1, 0) => 1.0 + away_lambda * rho,
            (1, 1) => 1.0 - rho,
            _ => return 1.0,
        };
        correction.clamp(0.01, 2.0)
    }

    /// Attack/defense strengths relative to the league average.
    fn strengths(
        &self,
        home_scored: f64,
        home_conceded: f64,
        away_scored: f64,
        away_conceded: f64,
    ) -> (f64, f64, f64, f64) {
        if self.league_avg <= 0.0 {
            return (1.0, 1.0, 1.0, 1.0);
        }
        (
            home_scored / self.league_avg,
            home_conceded / self.league_avg,
            away_scored / self.league_avg,
            away_conceded / self.league_avg,
        )
    }

    /// Full scoreline grid. Home advantage boosts the home lambda only;
    /// suppressing the away lambda as well double-counts the effect and
    /// distorts the distribution.
    pub fn simulate_match(
        &self,
        home_scored: f64,
        home_conceded: f64,
        away_scored: f64,
        away_conceded: f64,
    ) -> Option<PoissonResult> {
        for x in [home_scored, home_conceded, away_scored, away_conceded] {
            if !x.is_finite() || x < 0.0 {
                debug!("Invalid stats for Poisson simulation");
                return None;
            }
        }

        let (home_attack, home_defense, away_attack, away_defense) =
            self.strengths(home_scored, home_conceded, away_scored, away_conceded);

        let mut home_lambda = home_attack * away_defense * self.league_avg;
        let mut away_lambda = away_attack * home_defense * self.league_avg;

        if self.home_advantage > 0.0 {
            home_lambda += self.home_advantage;
        }

        home_lambda = home_lambda.clamp(0.1, 5.0);
        away_lambda = away_lambda.clamp(0.1, 5.0);

        let mut home_win = 0.0;
        let mut draw = 0.0;
        let mut away_win = 0.0;
        let mut over_25 = 0.0;
        let mut under_25 = 0.0;
        let mut btts = 0.0;
        let mut best_score = (0u32, 0u32);
        let mut best_prob = -1.0;

        for h in 0..=MAX_GOALS {
            for a in 0..=MAX_GOALS {
                let mut prob = Self::poisson_probability(home_lambda, h)
                    * Self::poisson_probability(away_lambda, a);
                if h <= 1 && a <= 1 {
                    prob *= Self::dixon_coles_correction(h, a, home_lambda, away_lambda, self.rho);
                }

                if prob > best_prob {
                    best_prob = prob;
                    best_score = (h, a);
                }

                if h > a {
                    home_win += prob;
                } else if h == a {
                    draw += prob;
                } else {
                    away_win += prob;
                }

                if (h + a) as f64 > 2.5 {
                    over_25 += prob;
                } else {
                    under_25 += prob;
                }

                if h > 0 && a > 0 {
                    btts += prob;
                }
            }
        }

        // The correction and the grid truncation leave the three outcomes
        // summing slightly off 1; rescale them.
        let total = home_win + draw + away_win;
        if total > 0.0 {
            home_win /= total;
            draw /= total;
            away_win /= total;
        }

        Some(PoissonResult {
            home_win_prob: home_win,
            draw_prob: draw,
            away_win_prob: away_win,
            home_lambda,
            away_lambda,
            most_likely_score: format!("{}-{}", best_score.0, best_score.1),
            over_25_prob: over_25,
            under_25_prob: under_25,
            btts_prob: btts,
        })
    }

    /// Edge and shrinkage-Kelly stake for one market.
    ///
    /// Shrinkage: with a small sample the probability estimate is noisy, so
    /// Kelly runs on a blend between the 68%-CI lower bound and the point
    /// estimate, trusting the point estimate more as the sample grows
    /// (confidence factor n/15 clamped to 0.6..1.0). Display fields (edge,
    /// fair odd) keep the unshrunk probability.
    pub fn calculate_edge(math_prob: f64, bookmaker_odd: f64, sample_size: u32) -> EdgeResult {
        // Odds this short have no usable risk-reward.
        if bookmaker_odd <= 1.05 {
            return EdgeResult {
                market: String::new(),
                math_prob: math_prob * 100.0,
                implied_prob: 100.0,
                edge: 0.0,
                fair_odd: 1.0,
                actual_odd: bookmaker_odd,
                kelly_stake: 0.0,
                has_value: false,
            };
        }

        // No certainty exists in sports.
        let math_prob = math_prob.min(0.99);

        let effective_prob = if sample_size > 0 {
            let se = (math_prob * (1.0 - math_prob) / sample_size as f64).sqrt();
            let lower = (math_prob - se).max(0.01);
            let confidence_factor = (sample_size as f64 / 15.0).clamp(0.6, 1.0);
            lower + (math_prob - lower) * confidence_factor
        } else {
            math_prob
        };

        let implied_prob = 1.0 / bookmaker_odd;
        let fair_odd = if math_prob > 0.0 { 1.0 / math_prob } else { 999.0 };
        let edge = (math_prob - implied_prob) * 100.0;

        let b = bookmaker_odd - 1.0;
        let kelly_full = (b * effective_prob - (1.0 - effective_prob)) / b;
        let stake_pct = (kelly_full.max(0.0) / 4.0 * 100.0).min(MAX_STAKE_PCT);

        EdgeResult {
            market: String::new(),
            math_prob: math_prob * 100.0,
            implied_prob: implied_prob * 100.0,
            edge,
            fair_odd: (fair_odd * 100.0).round() / 100.0,
            actual_odd: bookmaker_odd,
            kelly_stake: (stake_pct * 100.0).round() / 100.0,
            has_value: edge > 0.0,
        }
    }

    /// Full market sweep: 1X2, Over/Under 2.5, BTTS, Double Chance.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze_match(
        &self,
        home_scored: f64,
        home_conceded: f64,
        away_scored: f64,
        away_conceded: f64,
        home_odd: Option<f64>,
        draw_odd: Option<f64>,
        away_odd: Option<f64>,
        over_25_odd: Option<f64>,
        under_25_odd: Option<f64>,
        btts_odd: Option<f64>,
        sample_size: u32,
    ) -> Option<MatchAnalysis> {
        let poisson =
            self.simulate_match(home_scored, home_conceded, away_scored, away_conceded)?;

        let mut edges: BTreeMap<String, EdgeResult> = BTreeMap::new();
        let mut add_edge = |key: &str, label: &str, prob: f64, odd: Option<f64>| {
            if let Some(odd) = odd.filter(|o| *o > 1.0) {
                let mut edge = Self::calculate_edge(prob, odd, sample_size);
                edge.market = label.to_string();
                edges.insert(key.to_string(), edge);
            }
        };

        add_edge("home", "HOME", poisson.home_win_prob, home_odd);
        add_edge("draw", "DRAW", poisson.draw_prob, draw_odd);
        add_edge("away", "AWAY", poisson.away_win_prob, away_odd);
        add_edge("over_25", "OVER_25", poisson.over_25_prob, over_25_odd);

        // Under 2.5: use the priced odd, else derive one from the Over price
        // assuming a ~5% book margin.
        let under_odd = under_25_odd.filter(|o| *o > 1.0).or_else(|| {
            over_25_odd.filter(|o| *o > 1.0).and_then(|over| {
                let under_implied = (1.0 - 1.0 / over - 0.05).max(0.01);
                let derived = 1.0 / under_implied;
                (derived > 1.0).then_some(derived)
            })
        });
        add_edge("under_25", "UNDER_25", poisson.under_25_prob, under_odd);
        add_edge("btts", "BTTS", poisson.btts_prob, btts_odd);

        // Double chance: probability is the sum of two outcomes, the market
        // odd is inferred from the bookmaker's 1X2 prices.
        let dc_1x_prob = poisson.home_win_prob + poisson.draw_prob;
        let dc_x2_prob = poisson.draw_prob + poisson.away_win_prob;
        if let (Some(h), Some(d)) = (home_odd.filter(|o| *o > 1.0), draw_odd.filter(|o| *o > 1.0)) {
            let implied = 1.0 / h + 1.0 / d;
            if implied > 0.0 {
                let mut edge = Self::calculate_edge(dc_1x_prob, 1.0 / implied, sample_size);
                edge.market = "1X".to_string();
                edge.fair_odd = if dc_1x_prob > 0.0 {
                    ((1.0 / dc_1x_prob) * 100.0).round() / 100.0
                } else {
                    99.0
                };
                edges.insert("1x".to_string(), edge);
            }
        }
        if let (Some(d), Some(a)) = (draw_odd.filter(|o| *o > 1.0), away_odd.filter(|o| *o > 1.0)) {
            let implied = 1.0 / d + 1.0 / a;
            if implied > 0.0 {
                let mut edge = Self::calculate_edge(dc_x2_prob, 1.0 / implied, sample_size);
                edge.market = "X2".to_string();
                edge.fair_odd = if dc_x2_prob > 0.0 {
                    ((1.0 / dc_x2_prob) * 100.0).round() / 100.0
                } else {
                    99.0
                };
                edges.insert("x2".to_string(), edge);
            }
        }

        let best_market = edges
            .iter()
            .filter(|(_, e)| e.has_value)
            .max_by(|(_, a), (_, b)| {
                a.edge
                    .partial_cmp(&b.edge)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(k, _)| k.clone());

        let expected_goals =
            ((poisson.home_lambda + poisson.away_lambda) * 100.0).round() / 100.0;
        let most_likely_score = poisson.most_likely_score.clone();

        Some(MatchAnalysis {
            poisson,
            edges,
            best_market,
            expected_goals,
            most_likely_score,
        })
    }
}

/// BTTS pattern over H2H scorelines. Entries are (home_goals, away_goals);
/// order does not matter.
pub fn calculate_btts_trend(h2h: &[(u32, u32)]) -> BttsTrend {
    let total_games = h2h.len() as u32;
    let btts_hits = h2h.iter().filter(|(h, a)| *h > 0 && *a > 0).count() as u32;

    if total_games == 0 {
        return BttsTrend {
            btts_rate: 0.0,
            btts_hits: 0,
            total_games: 0,
            trend_signal: "Unknown".to_string(),
        };
    }

    let rate = (btts_hits as f64 / total_games as f64) * 100.0;
    let signal = if rate >= 60.0 {
        "High"
    } else if rate >= 40.0 {
        "Medium"
    } else {
        "Low"
    };
    BttsTrend {
        btts_rate: (rate * 10.0).round() / 10.0,
        btts_hits,
        total_games,
        trend_signal: signal.to_string(),
    }
}

/// Compact block of the quantitative picture for the analyzer dossier.
pub fn format_math_context(analysis: &MatchAnalysis) -> String {
    let p = &analysis.poisson;
    let mut lines = vec![
        "MATH MODEL (Poisson):".to_string(),
        format!(
            "  Expected goals: {:.2} | Most likely: {}",
            analysis.expected_goals, analysis.most_likely_score
        ),
        format!(
            "  Home {:.1}% | Draw {:.1}% | Away {:.1}%",
            p.home_win_prob * 100.0,
            p.draw_prob * 100.0,
            p.away_win_prob * 100.0
        ),
        format!(
            "  Over 2.5 {:.1}% | BTTS {:.1}%",
            p.over_25_prob * 100.0,
            p.btts_prob * 100.0
        ),
    ];
    if let Some(best) = analysis.best_edge() {
        lines.push(format!(
            "  VALUE on {}: math {:.1}% vs implied {:.1}% = +{:.1}% edge (fair {:.2}, actual {:.2}, kelly {:.2}%)",
            best.market, best.math_prob, best.implied_prob, best.edge, best.fair_odd,
            best.actual_odd, best.kelly_stake
        ));
    } else {
        lines.push("  No value market detected".to_string());
    }
    lines.join("\n")
}
