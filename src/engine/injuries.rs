//! Injury impact differential.
//!
//! Weighs each missing player by position and squad role, aggregates per
//! team, and produces a differential the analyzer applies context-aware: a
//! positive differential means the HOME side is more affected, and whether
//! that helps or hurts the score depends on which market is recommended.

use serde::Serialize;

use crate::providers::stats::{MissingPlayer, SquadGroup, TeamContext};

/// Player's standing in the squad hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    Starter,
    Rotation,
    Backup,
    Youth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerPosition {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerImpact {
    pub name: String,
    pub position: PlayerPosition,
    pub role: PlayerRole,
    /// 0.0 - 10.0.
    pub impact_score: f64,
    pub reason: String,
    pub is_key_player: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamInjuryImpact {
    pub team_name: String,
    pub total_impact_score: f64,
    pub missing_starters: u32,
    pub missing_rotation: u32,
    pub missing_backups: u32,
    pub key_players_out: Vec<String>,
    pub defensive_impact: f64,
    pub offensive_impact: f64,
    pub players: Vec<PlayerImpact>,
}

impl TeamInjuryImpact {
    fn empty(team_name: &str) -> Self {
        Self {
            team_name: team_name.to_string(),
            total_impact_score: 0.0,
            missing_starters: 0,
            missing_rotation: 0,
            missing_backups: 0,
            key_players_out: Vec::new(),
            defensive_impact: 0.0,
            offensive_impact: 0.0,
            players: Vec::new(),
        }
    }

    pub fn severity(&self) -> &'static str {
        if self.total_impact_score >= 15.0 || self.missing_starters >= 3 {
            "CRITICAL"
        } else if self.total_impact_score >= 8.0 || self.missing_starters >= 2 {
            "HIGH"
        } else if self.total_impact_score >= 4.0 || self.missing_starters >= 1 {
            "MEDIUM"
        } else {
            "LOW"
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InjuryDifferential {
    pub home_impact: TeamInjuryImpact,
    pub away_impact: TeamInjuryImpact,
    /// home total - away total; positive = home more affected.
    pub differential: f64,
    /// The raw differential capped to +/-1.8. The market-aware sign
    /// inversion happens in the analyzer, not here.
    pub score_adjustment: f64,
    pub favors_home: bool,
    pub favors_away: bool,
    pub summary: String,
}

const ADJUSTMENT_CAP: f64 = 1.8;
const KEY_PLAYER_BONUS: f64 = 1.5;

fn position_base(position: PlayerPosition) -> f64 {
    match position {
        PlayerPosition::Goalkeeper => 3.0,
        PlayerPosition::Forward => 2.5,
        PlayerPosition::Defender => 2.2,
        PlayerPosition::Midfielder => 2.0,
        PlayerPosition::Unknown => 1.5,
    }
}

fn role_multiplier(role: PlayerRole) -> f64 {
    match role {
        PlayerRole::Starter => 3.0,
        PlayerRole::Rotation => 1.5,
        PlayerRole::Backup => 0.5,
        PlayerRole::Youth => 0.3,
    }
}

/// Position from a squad-group title. Group names come localized.
pub fn detect_position_from_group(title: &str) -> PlayerPosition {
    let t = title.to_lowercase();
    if t.is_empty() {
        return PlayerPosition::Unknown;
    }
    const GK: &[&str] = &["goalkeeper", "keeper", "portier", "gk", "portero", "torwart"];
    const DEF: &[&str] = &["defender", "defence", "defense", "difensor", "defensa", "verteidiger"];
    const MID: &[&str] = &["midfield", "centrocamp", "mediocentro", "mittelfeld"];
    const FWD: &[&str] = &["forward", "striker", "attacc", "attack", "delanter", "sturm"];

    let hit = |terms: &[&str]| terms.iter().any(|k| t.contains(k) || t == *k);
    if hit(GK) || t == "gk" {
        PlayerPosition::Goalkeeper
    } else if hit(DEF) {
        PlayerPosition::Defender
    } else if hit(MID) {
        PlayerPosition::Midfielder
    } else if hit(FWD) {
        PlayerPosition::Forward
    } else {
        PlayerPosition::Unknown
    }
}

/// Position from a per-player description when the group title told us
/// nothing.
pub fn detect_position_from_desc(desc: Option<&str>) -> PlayerPosition {
    match desc {
        Some(d) => detect_position_from_group(d),
        None => PlayerPosition::Unknown,
    }
}

/// Role heuristics, in priority order: youth flag, appearance counts, then
/// slot within the position group (squad lists run starters first). A group
/// size of zero is invalid data and falls back to BACKUP.
pub fn estimate_player_role(
    appearances: Option<u32>,
    is_youth: bool,
    player_index_in_group: usize,
    total_in_group: usize,
) -> PlayerRole {
    if total_in_group == 0 {
        return PlayerRole::Backup;
    }
    if is_youth {
        return PlayerRole::Youth;
    }
    match appearances {
        Some(n) if n >= 15 => return PlayerRole::Starter,
        Some(n) if n >= 8 => return PlayerRole::Rotation,
        Some(_) => {
            // A known-low appearance count outranks list position.
            return PlayerRole::Backup;
        }
        None => {}
    }
    if player_index_in_group == 0 || total_in_group == 1 {
        PlayerRole::Starter
    } else if player_index_in_group * 2 < total_in_group {
        PlayerRole::Rotation
    } else {
        PlayerRole::Backup
    }
}

pub fn calculate_player_impact(
    name: &str,
    position: PlayerPosition,
    role: PlayerRole,
    reason: &str,
    is_key_player: bool,
) -> PlayerImpact {
    let mut score = position_base(position) * role_multiplier(role);
    if is_key_player {
        score += KEY_PLAYER_BONUS;
    }
    PlayerImpact {
        name: name.to_string(),
        position,
        role,
        impact_score: score.clamp(0.0, 10.0),
        reason: reason.to_string(),
        is_key_player,
    }
}

struct SquadSlot {
    position: PlayerPosition,
    appearances: Option<u32>,
    is_youth: bool,
    index_in_group: usize,
    group_size: usize,
}

fn build_player_map(squad: &[SquadGroup]) -> std::collections::HashMap<String, SquadSlot> {
    let mut map = std::collections::HashMap::new();
    for group in squad {
        let group_position = detect_position_from_group(&group.title);
        let size = group.members.len();
        for (idx, member) in group.members.iter().enumerate() {
            if member.name.trim().is_empty() {
                continue;
            }
            let position = if group_position != PlayerPosition::Unknown {
                group_position
            } else {
                detect_position_from_desc(member.position_desc.as_deref())
            };
            map.insert(
                member.name.to_lowercase(),
                SquadSlot {
                    position,
                    appearances: member.appearances,
                    is_youth: member.is_youth,
                    index_in_group: idx,
                    group_size: size,
                },
            );
        }
    }
    map
}

pub fn calculate_team_injury_impact(
    team_name: &str,
    injuries: &[MissingPlayer],
    squad: &[SquadGroup],
    key_players: &[String],
) -> TeamInjuryImpact {
    let mut impact = TeamInjuryImpact::empty(team_name);
    if injuries.is_empty() {
        return impact;
    }

    let player_map = build_player_map(squad);
    let key_lower: Vec<String> = key_players.iter().map(|k| k.to_lowercase()).collect();

    for missing in injuries {
        let name = missing.name.trim();
        if name.is_empty() {
            continue;
        }
        let is_key = key_lower.contains(&name.to_lowercase());

        let (position, role) = match player_map.get(&name.to_lowercase()) {
            Some(slot) => (
                slot.position,
                estimate_player_role(
                    slot.appearances,
                    slot.is_youth,
                    slot.index_in_group,
                    slot.group_size,
                ),
            ),
            // Not in the known squad: assume a fringe player.
            None => (PlayerPosition::Unknown, PlayerRole::Backup),
        };

        let player = calculate_player_impact(name, position, role, &missing.reason, is_key);

        match player.role {
            PlayerRole::Starter => impact.missing_starters += 1,
            PlayerRole::Rotation => impact.missing_rotation += 1,
            PlayerRole::Backup | PlayerRole::Youth => impact.missing_backups += 1,
        }
        if is_key {
            impact.key_players_out.push(name.to_string());
        }

        impact.total_impact_score += player.impact_score;
        match player.position {
            PlayerPosition::Goalkeeper | PlayerPosition::Defender => {
                impact.defensive_impact += player.impact_score
            }
            PlayerPosition::Forward => impact.offensive_impact += player.impact_score,
            PlayerPosition::Midfielder => {
                impact.defensive_impact += player.impact_score * 0.5;
                impact.offensive_impact += player.impact_score * 0.5;
            }
            PlayerPosition::Unknown => {}
        }

        impact.players.push(player);
    }

    impact.defensive_impact = impact.defensive_impact.min(10.0);
    impact.offensive_impact = impact.offensive_impact.min(10.0);
    impact
}

pub fn calculate_injury_differential(
    home_impact: TeamInjuryImpact,
    away_impact: TeamInjuryImpact,
) -> InjuryDifferential {
    let differential = home_impact.total_impact_score - away_impact.total_impact_score;

    let score_adjustment = differential.clamp(-ADJUSTMENT_CAP, ADJUSTMENT_CAP);

    let favors_away = differential > 0.5;
    let favors_home = differential < -0.5;

    let summary = if differential.abs() < 0.5 {
        format!(
            "{} and {} similarly affected (H {:.1} vs A {:.1})",
            home_impact.team_name,
            away_impact.team_name,
            home_impact.total_impact_score,
            away_impact.total_impact_score
        )
    } else if favors_away {
        format!(
            "{} more affected ({}, impact {:.1} vs {:.1})",
            home_impact.team_name,
            home_impact.severity(),
            home_impact.total_impact_score,
            away_impact.total_impact_score
        )
    } else {
        format!(
            "{} more affected ({}, impact {:.1} vs {:.1})",
            away_impact.team_name,
            away_impact.severity(),
            away_impact.total_impact_score,
            home_impact.total_impact_score
        )
    };

    InjuryDifferential {
        home_impact,
        away_impact,
        differential,
        score_adjustment,
        favors_home,
        favors_away,
        summary,
    }
}

/// Entry point from the analyzer: contexts may be missing entirely.
pub fn analyze_match_injuries(
    home_team: &str,
    away_team: &str,
    home_context: Option<&TeamContext>,
    away_context: Option<&TeamContext>,
) -> InjuryDifferential {
    let empty_injuries: Vec<MissingPlayer> = Vec::new();
    let empty_squad: Vec<SquadGroup> = Vec::new();
    let empty_keys: Vec<String> = Vec::new();

    let home = calculate_team_injury_impact(
        home_team,
        home_context.map(|c| c.injuries.as_slice()).unwrap_or(&empty_injuries),
        home_context.map(|c| c.squad.as_slice()).unwrap_or(&empty_squad),
        home_context.map(|c| c.key_players.as_slice()).unwrap_or(&empty_keys),
    );
    let away = calculate_team_injury_impact(
        away_team,
        away_context.map(|c| c.injuries.as_slice()).unwrap_or(&empty_injuries),
        away_context.map(|c| c.squad.as_slice()).unwrap_or(&empty_squad),
        away_context.map(|c| c.key_players.as_slice()).unwrap_or(&empty_keys),
    );

    calculate_injury_differential(home, away)
}
