//! Fatigue engine.
//!
//! Recency-weighted congestion index over a 21-day window: each recent match
//! contributes `w / max(days_ago, 0.5)` (the clamp makes division by zero
//! impossible by construction), scaled by a squad-depth multiplier since deep
//! squads absorb congestion. Rest buckets follow recovery research: full
//! neuromuscular recovery needs 72-96 hours.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Squad-depth multipliers: elite squads halve effective fatigue, thin ones
/// inflate it.
pub const SQUAD_DEPTH_ELITE: f64 = 0.5;
pub const SQUAD_DEPTH_UPPER: f64 = 0.7;
pub const SQUAD_DEPTH_MID: f64 = 1.0;
pub const SQUAD_DEPTH_LOWER: f64 = 1.15;
pub const SQUAD_DEPTH_LOW: f64 = 1.3;

const CONGESTION_WINDOW_DAYS: i64 = 21;

/// Clubs with genuinely two-deep first squads.
const ELITE_SQUADS: &[&str] = &[
    "manchester city",
    "real madrid",
    "bayern munich",
    "bayern münchen",
    "paris saint-germain",
    "liverpool",
    "arsenal",
    "barcelona",
    "inter",
    "chelsea",
];

const UPPER_SQUADS: &[&str] = &[
    "manchester united",
    "atletico madrid",
    "atlético madrid",
    "juventus",
    "milan",
    "napoli",
    "borussia dortmund",
    "tottenham",
    "newcastle united",
    "bayer leverkusen",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FatigueLevel {
    Fresh,
    Low,
    Medium,
    High,
    Critical,
}

impl FatigueLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FatigueLevel::Fresh => "FRESH",
            FatigueLevel::Low => "LOW",
            FatigueLevel::Medium => "MEDIUM",
            FatigueLevel::High => "HIGH",
            FatigueLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamFatigue {
    pub team_name: String,
    pub fatigue_index: f64,
    pub fatigue_level: FatigueLevel,
    pub matches_in_window: u32,
    pub hours_since_last: Option<f64>,
    /// Fatigued teams concede late.
    pub late_game_risk: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FatigueDifferential {
    pub home: TeamFatigue,
    pub away: TeamFatigue,
    /// home index - away index; positive = home more fatigued.
    pub differential: f64,
    /// HOME / AWAY / NEUTRAL.
    pub advantage: &'static str,
}

/// Depth multiplier from the club name; unknown clubs get the mid default.
pub fn squad_depth_multiplier(team_name: &str) -> f64 {
    let name = team_name.trim().to_lowercase();
    if name.is_empty() {
        return SQUAD_DEPTH_MID;
    }
    if ELITE_SQUADS.iter().any(|t| name.contains(t)) {
        SQUAD_DEPTH_ELITE
    } else if UPPER_SQUADS.iter().any(|t| name.contains(t)) {
        SQUAD_DEPTH_UPPER
    } else {
        SQUAD_DEPTH_MID
    }
}

/// Raw congestion index over the rolling window. Empty schedules are exactly
/// zero. Matches nearer than 4 days carry extra weight.
pub fn calculate_fatigue_index(
    schedule: &[DateTime<Utc>],
    upcoming: DateTime<Utc>,
) -> (f64, u32) {
    let mut index = 0.0;
    let mut counted = 0u32;
    for &played in schedule {
        if played >= upcoming {
            continue;
        }
        let days_ago = (upcoming - played).num_minutes() as f64 / (60.0 * 24.0);
        if days_ago > CONGESTION_WINDOW_DAYS as f64 {
            continue;
        }
        let weight = if days_ago <= 4.0 { 0.6 } else { 0.4 };
        index += weight / days_ago.max(0.5);
        counted += 1;
    }
    (index, counted)
}

fn level_from_hours(hours_since_last: Option<f64>) -> FatigueLevel {
    match hours_since_last {
        None => FatigueLevel::Fresh,
        Some(h) if h < 72.0 => FatigueLevel::Critical,
        Some(h) if h < 96.0 => FatigueLevel::High,
        Some(h) if h < 120.0 => FatigueLevel::Medium,
        Some(h) if h < 168.0 => FatigueLevel::Low,
        Some(_) => FatigueLevel::Fresh,
    }
}

pub fn analyze_team_fatigue(
    team_name: &str,
    hours_since_last: Option<f64>,
    schedule: &[DateTime<Utc>],
    upcoming: DateTime<Utc>,
) -> TeamFatigue {
    let (raw_index, matches_in_window) = calculate_fatigue_index(schedule, upcoming);

    // With no schedule but a known rest gap, synthesize the single-match
    // contribution so the index is comparable either way.
    let raw_index = if matches_in_window == 0 {
        match hours_since_last {
            Some(h) if h / 24.0 <= CONGESTION_WINDOW_DAYS as f64 => {
                let days = (h / 24.0).max(0.5);
                let weight = if days <= 4.0 { 0.6 } else { 0.4 };
                weight / days
            }
            _ => 0.0,
        }
    } else {
        raw_index
    };

    let fatigue_index = raw_index * squad_depth_multiplier(team_name);
    let fatigue_level = level_from_hours(hours_since_last);
    let late_game_risk = match fatigue_level {
        FatigueLevel::Critical => "HIGH",
        FatigueLevel::High => "MEDIUM",
        _ => "LOW",
    };

    TeamFatigue {
        team_name: team_name.to_string(),
        fatigue_index,
        fatigue_level,
        matches_in_window,
        hours_since_last,
        late_game_risk,
    }
}

pub fn analyze_fatigue_differential(
    home: TeamFatigue,
    away: TeamFatigue,
) -> FatigueDifferential {
    let differential = home.fatigue_index - away.fatigue_index;

    let home_tired = matches!(home.fatigue_level, FatigueLevel::Critical | FatigueLevel::High);
    let away_tired = matches!(away.fatigue_level, FatigueLevel::Critical | FatigueLevel::High);
    let home_fresh = matches!(home.fatigue_level, FatigueLevel::Fresh | FatigueLevel::Low);
    let away_fresh = matches!(away.fatigue_level, FatigueLevel::Fresh | FatigueLevel::Low);

    let advantage = if home_tired && away_fresh {
        "AWAY"
    } else if away_tired && home_fresh {
        "HOME"
    } else if differential > 0.3 {
        "AWAY"
    } else if differential < -0.3 {
        "HOME"
    } else {
        "NEUTRAL"
    };

    FatigueDifferential {
        home,
        away,
        differential,
        advantage,
    }
}

/// Dossier block for the analyzer.
pub fn format_fatigue_context(diff: &FatigueDifferential) -> String {
    format!(
        "FATIGUE: {} {} (index {:.2}, last match {}) vs {} {} (index {:.2}, last match {}) | advantage: {}",
        diff.home.team_name,
        diff.home.fatigue_level.as_str(),
        diff.home.fatigue_index,
        diff.home
            .hours_since_last
            .map(|h| format!("{h:.0}h ago"))
            .unwrap_or_else(|| "unknown".to_string()),
        diff.away.team_name,
        diff.away.fatigue_level.as_str(),
        diff.away.fatigue_index,
        diff.away
            .hours_since_last
            .map(|h| format!("{h:.0}h ago"))
            .unwrap_or_else(|| "unknown".to_string()),
        diff.advantage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_schedule_is_exactly_zero() {
        let (index, matches) = calculate_fatigue_index(&[], now());
        assert_eq!(index, 0.0);
        assert_eq!(matches, 0);
    }

    #[test]
    fn test_recent_match_high_weight() {
        let (index, matches) = calculate_fatigue_index(&[now() - Duration::days(1)], now());
        assert!(index > 0.3);
        assert_eq!(matches, 1);
    }

    #[test]
    fn test_old_match_low_weight() {
        let (index, _) = calculate_fatigue_index(&[now() - Duration::days(10)], now());
        assert!(index < 0.2);
    }

    #[test]
    fn test_congestion_accumulates() {
        let schedule = [
            now() - Duration::days(3),
            now() - Duration::days(6),
            now() - Duration::days(10),
        ];
        let (index, matches) = calculate_fatigue_index(&schedule, now());
        assert!(index > 0.15);
        assert_eq!(matches, 3);
    }

    #[test]
    fn test_outside_window_ignored() {
        let schedule = [now() - Duration::days(25), now() - Duration::days(40)];
        let (index, matches) = calculate_fatigue_index(&schedule, now());
        assert_eq!(index, 0.0);
        assert_eq!(matches, 0);
    }

    #[test]
    fn test_same_day_clamp_prevents_blowup() {
        let (index, _) = calculate_fatigue_index(&[now() - Duration::hours(3)], now());
        // 0.6 / 0.5 is the maximum single-match contribution.
        assert!(index <= 1.2 + 1e-9);
    }

    #[test]
    fn test_depth_multipliers() {
        assert_eq!(squad_depth_multiplier("Manchester City"), SQUAD_DEPTH_ELITE);
        assert_eq!(squad_depth_multiplier("Real Madrid"), SQUAD_DEPTH_ELITE);
        assert_eq!(squad_depth_multiplier("Unknown FC"), SQUAD_DEPTH_MID);
        assert_eq!(squad_depth_multiplier(""), SQUAD_DEPTH_MID);
        assert_eq!(squad_depth_multiplier("Juventus"), SQUAD_DEPTH_UPPER);
    }

    #[test]
    fn test_no_rest_data_is_fresh() {
        let result = analyze_team_fatigue("Test FC", None, &[], now());
        assert_eq!(result.fatigue_index, 0.0);
        assert_eq!(result.fatigue_level, FatigueLevel::Fresh);
        assert_eq!(result.late_game_risk, "LOW");
    }

    #[test]
    fn test_under_72h_is_critical() {
        let result = analyze_team_fatigue("Test FC", Some(48.0), &[], now());
        assert_eq!(result.fatigue_level, FatigueLevel::Critical);
        assert_eq!(result.late_game_risk, "HIGH");
        assert!(result.fatigue_index > 0.0);
    }

    #[test]
    fn test_elite_depth_halves_index() {
        let schedule = [now() - Duration::days(2), now() - Duration::days(5)];
        let elite = analyze_team_fatigue("Manchester City", Some(48.0), &schedule, now());
        let plain = analyze_team_fatigue("Plain FC", Some(48.0), &schedule, now());
        assert!((elite.fatigue_index - plain.fatigue_index * SQUAD_DEPTH_ELITE).abs() < 1e-9);
    }

    #[test]
    fn test_differential_favors_rested_side() {
        let home = analyze_team_fatigue("Tired FC", Some(48.0), &[], now());
        let away = analyze_team_fatigue("Fresh FC", Some(120.0), &[], now());
        assert_eq!(home.fatigue_level, FatigueLevel::Critical);
        assert!(matches!(away.fatigue_level, FatigueLevel::Low | FatigueLevel::Fresh));

        let diff = analyze_fatigue_differential(home, away);
        assert_eq!(diff.advantage, "AWAY");
        assert!(diff.differential > 0.0);
    }

    #[test]
    fn test_balanced_is_neutral() {
        let home = analyze_team_fatigue("A", Some(130.0), &[], now());
        let away = analyze_team_fatigue("B", Some(135.0), &[], now());
        let diff = analyze_fatigue_differential(home, away);
        assert_eq!(diff.advantage, "NEUTRAL");
    }

    #[test]
    fn test_context_string_mentions_fatigue() {
        let home = analyze_team_fatigue("Home FC", Some(72.0), &[], now());
        let away = analyze_team_fatigue("Away FC", Some(120.0), &[], now());
        let diff = analyze_fatigue_differential(home, away);
        let ctx = format_fatigue_context(&diff);
        assert!(ctx.contains("FATIGUE"));
        assert!(ctx.contains("Home FC"));
    }
}
