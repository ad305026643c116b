//! Post-AI verification layer.
//!
//! Quality filter between a candidate alert and the send decision. The
//! classic failure it exists for: recommending Over 2.5 for a side with
//! seven absences, when a decimated squad scores less, not more. Runs only for
//! alerts at or above the score gate; with nothing to check it returns
//! UNVERIFIED and the alert passes through flagged.

use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::analyzer::SignalBundle;
use crate::enrichment::EnrichmentResult;
use crate::models::VerificationStatus;
use crate::providers::ai::BettingStats;
use crate::util::fuzzy::fuzzy_match_team;

/// Cumulative impact above which absences on one side are critical.
pub const CRITICAL_IMPACT_THRESHOLD: f64 = 8.0;

/// Offensive-impact level that flips an Over recommendation.
pub const ATTACK_IMPACT_THRESHOLD: f64 = 5.0;

/// Points-per-game distance from the league mean that counts as a form
/// deviation.
pub const FORM_DEVIATION_THRESHOLD: f64 = 0.8;
const LEAGUE_MEAN_PPG: f64 = 1.37;

/// H2H corroboration floors.
pub const H2H_CARDS_THRESHOLD: f64 = 4.5;
pub const H2H_CORNERS_THRESHOLD: f64 = 9.5;

/// Referee discipline profile bounds (avg yellows per game).
pub const REFEREE_STRICT_YELLOWS: f64 = 4.5;
pub const REFEREE_LENIENT_YELLOWS: f64 = 2.5;

#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    /// Replacement market when status is CHANGE_MARKET.
    pub new_market: Option<String>,
    /// Applied to the alert confidence (clamped by the caller).
    pub confidence_delta: i32,
    pub notes: Vec<String>,
}

impl VerificationOutcome {
    fn unverified(note: &str) -> Self {
        Self {
            status: VerificationStatus::Unverified,
            new_market: None,
            confidence_delta: 0,
            notes: vec![note.to_string()],
        }
    }
}

fn market_lower(recommended_market: &str) -> String {
    recommended_market.to_lowercase()
}

fn is_over_market(market: &str) -> bool {
    let m = market_lower(market);
    m.contains("over")
}

fn is_cards_market(market: &str) -> bool {
    let m = market_lower(market);
    m.contains("card") || m.contains("booking")
}

fn is_corners_market(market: &str) -> bool {
    market_lower(market).contains("corner")
}

fn market_backs_team(market: &str, side: &str) -> bool {
    let m = market_lower(market);
    match side {
        "home" => m == "1" || m.contains("home") || m == "1x",
        "away" => m == "2" || m.contains("away") || m == "x2",
        _ => false,
    }
}

/// Cross-check the AI-cited absences against the official squad context.
/// Returns how many cited names the official list confirms.
pub fn confirmed_absences(cited: &[String], official: &[String]) -> Vec<String> {
    let official_refs: Vec<&str> = official.iter().map(|s| s.as_str()).collect();
    cited
        .iter()
        .filter_map(|name| fuzzy_match_team(name, &official_refs).map(|m| m.to_string()))
        .collect()
}

/// Run every applicable check against the candidate alert.
#[allow(clippy::too_many_arguments)]
pub fn verify_alert(
    recommended_market: &str,
    cited_missing: &[String],
    enrichment: &EnrichmentResult,
    bundle: &SignalBundle,
    betting_stats: Option<&BettingStats>,
    under_market_priced: bool,
) -> VerificationOutcome {
    let mut notes = Vec::new();
    let mut confidence_delta = 0i32;
    let mut checks_run = 0u32;

    // 1. Absence normalization: AI-cited names vs the official lists.
    let official_names: Vec<String> = enrichment
        .home_context
        .iter()
        .chain(enrichment.away_context.iter())
        .flat_map(|c| c.injuries.iter().map(|i| i.name.clone()))
        .collect();
    if !cited_missing.is_empty() && !official_names.is_empty() {
        checks_run += 1;
        let confirmed = confirmed_absences(cited_missing, &official_names);
        let unconfirmed = cited_missing.len() - confirmed.len();
        if unconfirmed > 0 {
            confidence_delta -= 5 * unconfirmed as i32;
            notes.push(format!(
                "{unconfirmed} cited absence(s) not in the official list"
            ));
        } else {
            notes.push("all cited absences confirmed by official data".to_string());
        }
    }

    let home_impact = &bundle.injuries.home_impact;
    let away_impact = &bundle.injuries.away_impact;
    let combined_offensive = home_impact.offensive_impact + away_impact.offensive_impact;
    let critical_absences = home_impact.total_impact_score >= CRITICAL_IMPACT_THRESHOLD
        || away_impact.total_impact_score >= CRITICAL_IMPACT_THRESHOLD;

    // 2. Over markets against a gutted attack: switch to the Under (or kill
    // the alert when no Under is priced).
    if is_over_market(recommended_market) {
        checks_run += 1;
        if critical_absences && combined_offensive >= ATTACK_IMPACT_THRESHOLD {
            return if under_market_priced {
                info!(
                    market = recommended_market,
                    offensive = combined_offensive,
                    "Critical attack absences: switching Over to Under"
                );
                VerificationOutcome {
                    status: VerificationStatus::ChangeMarket,
                    new_market: Some("Under 2.5 Goals".to_string()),
                    confidence_delta: -5,
                    notes: vec![format!(
                        "critical attack absences (offensive impact {combined_offensive:.1}) contradict an Over"
                    )],
                }
            } else {
                VerificationOutcome {
                    status: VerificationStatus::Rejected,
                    new_market: None,
                    confidence_delta: 0,
                    notes: vec![
                        "critical attack absences contradict the Over and no Under is priced"
                            .to_string(),
                    ],
                }
            };
        }
        notes.push("attack absences compatible with the Over".to_string());
    }

    // 3. Form deviation opposite to the recommendation.
    for (side, stats) in [
        ("home", &enrichment.home_stats),
        ("away", &enrichment.away_stats),
    ] {
        let Some(ppg) = stats.as_ref().and_then(|s| s.form_points_per_game) else {
            continue;
        };
        checks_run += 1;
        let deviation = ppg - LEAGUE_MEAN_PPG;
        if market_backs_team(recommended_market, side)
            && deviation <= -FORM_DEVIATION_THRESHOLD
        {
            return VerificationOutcome {
                status: VerificationStatus::Rejected,
                new_market: None,
                confidence_delta: 0,
                notes: vec![format!(
                    "{side} form {ppg:.2} ppg is {:.2} below league mean, against the recommendation",
                    -deviation
                )],
            };
        }
    }

    // 4. H2H corroboration for cards/corners recommendations.
    if is_cards_market(recommended_market) || is_corners_market(recommended_market) {
        checks_run += 1;
        match betting_stats {
            Some(stats) => {
                if is_cards_market(recommended_market) {
                    if stats.h2h_avg_cards >= H2H_CARDS_THRESHOLD {
                        confidence_delta += 5;
                        notes.push(format!(
                            "H2H cards avg {:.1} corroborates the cards market",
                            stats.h2h_avg_cards
                        ));
                    } else {
                        confidence_delta -= 10;
                        notes.push(format!(
                            "H2H cards avg {:.1} below corroboration floor",
                            stats.h2h_avg_cards
                        ));
                    }
                }
                if is_corners_market(recommended_market) {
                    if stats.h2h_avg_corners >= H2H_CORNERS_THRESHOLD {
                        confidence_delta += 5;
                        notes.push(format!(
                            "H2H corners avg {:.1} corroborates the corners market",
                            stats.h2h_avg_corners
                        ));
                    } else {
                        confidence_delta -= 10;
                        notes.push(format!(
                            "H2H corners avg {:.1} below corroboration floor",
                            stats.h2h_avg_corners
                        ));
                    }
                }
            }
            None => notes.push("no H2H stats available for corroboration".to_string()),
        }
    }

    // 5. Referee tendency for cards markets.
    if is_cards_market(recommended_market) {
        if let Some(avg) = enrichment.referee.as_ref().and_then(|r| r.avg_yellow_cards) {
            checks_run += 1;
            if avg >= REFEREE_STRICT_YELLOWS {
                confidence_delta += 5;
                notes.push(format!("strict referee ({avg:.1} yellows/game)"));
            } else if avg <= REFEREE_LENIENT_YELLOWS {
                confidence_delta -= 10;
                notes.push(format!("lenient referee ({avg:.1} yellows/game)"));
            }
        }
    }

    if checks_run == 0 {
        debug!(market = recommended_market, "Nothing verifiable");
        return VerificationOutcome::unverified("insufficient data for verification");
    }

    VerificationOutcome {
        status: VerificationStatus::Confirmed,
        new_market: None,
        confidence_delta,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::build_signal_bundle;
    use crate::config::LeagueParams;
    use crate::models::Match;
    use crate::providers::stats::{MissingPlayer, SquadGroup, SquadMember, TeamContext, TeamStats};
    use chrono::{Duration, Utc};

    fn sample_match() -> Match {
        let mut m = Match::new(
            "m1",
            "serie_a",
            "Home FC",
            "Away FC",
            Utc::now() + Duration::hours(12),
        );
        m.current_home_odd = Some(2.0);
        m.current_draw_odd = Some(3.4);
        m.current_away_odd = Some(3.6);
        m
    }

    fn stats(ppg: Option<f64>) -> TeamStats {
        TeamStats {
            matches_played: 10,
            avg_scored: 1.5,
            avg_conceded: 1.2,
            avg_cards: None,
            avg_corners: None,
            h2h: vec![],
            form_points_per_game: ppg,
        }
    }

    fn gutted_context(team: &str) -> TeamContext {
        // Three first-choice forwards out.
        TeamContext {
            team_name: team.to_string(),
            injuries: ["Striker A", "Striker B", "Winger C"]
                .iter()
                .map(|n| MissingPlayer {
                    name: n.to_string(),
                    reason: "Injury".to_string(),
                })
                .collect(),
            squad: vec![SquadGroup {
                title: "Forwards".to_string(),
                members: ["Striker A", "Striker B", "Winger C"]
                    .iter()
                    .map(|n| SquadMember {
                        name: n.to_string(),
                        appearances: Some(25),
                        is_youth: false,
                        position_desc: None,
                    })
                    .collect(),
            }],
            ..Default::default()
        }
    }

    fn bundle_for(m: &Match, enrichment: &EnrichmentResult) -> SignalBundle {
        build_signal_bundle(m, enrichment, &[], &[], &LeagueParams::default(), -0.07)
    }

    fn betting_stats(cards: f64, corners: f64) -> BettingStats {
        BettingStats {
            avg_cards_home: 2.0,
            avg_cards_away: 2.0,
            avg_corners_home: 5.0,
            avg_corners_away: 5.0,
            h2h_avg_cards: cards,
            h2h_avg_corners: corners,
            data_quality: "GOOD".to_string(),
        }
    }

    #[test]
    fn test_over_with_gutted_attack_switches_to_under() {
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        enrichment.home_context = Some(gutted_context("Home FC"));
        enrichment.away_context = Some(TeamContext::default());
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("Over 2.5 Goals", &[], &enrichment, &bundle, None, true);
        assert_eq!(outcome.status, VerificationStatus::ChangeMarket);
        assert_eq!(outcome.new_market.as_deref(), Some("Under 2.5 Goals"));
    }

    #[test]
    fn test_over_with_gutted_attack_and_no_under_rejected() {
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        enrichment.home_context = Some(gutted_context("Home FC"));
        enrichment.away_context = Some(TeamContext::default());
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("Over 2.5 Goals", &[], &enrichment, &bundle, None, false);
        assert_eq!(outcome.status, VerificationStatus::Rejected);
    }

    #[test]
    fn test_over_with_healthy_squads_confirmed() {
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        enrichment.home_context = Some(TeamContext::default());
        enrichment.away_context = Some(TeamContext::default());
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("Over 2.5 Goals", &[], &enrichment, &bundle, None, true);
        assert_eq!(outcome.status, VerificationStatus::Confirmed);
    }

    #[test]
    fn test_form_deviation_against_recommendation_rejects() {
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        // Home in dire form, recommendation backs home.
        enrichment.home_stats = Some(stats(Some(0.4)));
        enrichment.away_stats = Some(stats(Some(1.4)));
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("1", &[], &enrichment, &bundle, None, true);
        assert_eq!(outcome.status, VerificationStatus::Rejected);
        assert!(outcome.notes[0].contains("form"));
    }

    #[test]
    fn test_form_deviation_for_other_side_ignored() {
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        // Away side is in dire form but we back home: fine.
        enrichment.home_stats = Some(stats(Some(2.0)));
        enrichment.away_stats = Some(stats(Some(0.4)));
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("1", &[], &enrichment, &bundle, None, true);
        assert_eq!(outcome.status, VerificationStatus::Confirmed);
    }

    #[test]
    fn test_h2h_corroborates_cards_market() {
        let m = sample_match();
        let enrichment = EnrichmentResult::default();
        let bundle = bundle_for(&m, &enrichment);

        let good = verify_alert(
            "Over 4.5 Cards",
            &[],
            &enrichment,
            &bundle,
            Some(&betting_stats(5.2, 8.0)),
            true,
        );
        assert_eq!(good.status, VerificationStatus::Confirmed);
        assert!(good.confidence_delta > 0);

        let weak = verify_alert(
            "Over 4.5 Cards",
            &[],
            &enrichment,
            &bundle,
            Some(&betting_stats(3.0, 8.0)),
            true,
        );
        assert_eq!(weak.status, VerificationStatus::Confirmed);
        assert!(weak.confidence_delta < 0);
    }

    #[test]
    fn test_corners_corroboration() {
        let m = sample_match();
        let enrichment = EnrichmentResult::default();
        let bundle = bundle_for(&m, &enrichment);

        let good = verify_alert(
            "Over 9.5 Corners",
            &[],
            &enrichment,
            &bundle,
            Some(&betting_stats(3.0, 10.5)),
            true,
        );
        assert!(good.confidence_delta > 0);
    }

    #[test]
    fn test_referee_tendency_on_cards() {
        use crate::providers::stats::RefereeInfo;
        let m = sample_match();
        let mut enrichment = EnrichmentResult::default();
        enrichment.referee = Some(RefereeInfo {
            name: "Strict Ref".to_string(),
            avg_yellow_cards: Some(5.1),
        });
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert(
            "Over 4.5 Cards",
            &[],
            &enrichment,
            &bundle,
            Some(&betting_stats(5.0, 8.0)),
            true,
        );
        assert!(outcome.notes.iter().any(|n| n.contains("strict referee")));
        assert!(outcome.confidence_delta >= 10);
    }

    #[test]
    fn test_nothing_verifiable_is_unverified() {
        let m = sample_match();
        let enrichment = EnrichmentResult::default();
        let bundle = bundle_for(&m, &enrichment);

        let outcome = verify_alert("1", &[], &enrichment, &bundle, None, true);
        assert_eq!(outcome.status, VerificationStatus::Unverified);
    }

    #[test]
    fn test_cited_absence_normalization() {
        let official = vec!["Dusan Vlahovic".to_string(), "Federico Chiesa".to_string()];
        let cited = vec!["Vlahovic".to_string(), "Ghost Player".to_string()];
        let confirmed = confirmed_absences(&cited, &official);
        assert_eq!(confirmed, vec!["Dusan Vlahovic".to_string()]);
    }
}
