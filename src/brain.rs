//! League scheduling brain.
//!
//! Decides which leagues each cycle polls. Tier 1 is always in (and is the
//! whole selection in emergency mode). Tier 2 rotates a fixed-size batch
//! through a cursor. "Follow the sun" restricts the selection to leagues
//! whose configured UTC active-hours window contains the current hour,
//! unless that filter would empty the selection, in which case the full
//! selection stands. After enough consecutive dry cycles a bonus Tier-2
//! batch is promoted for one cycle, capped per UTC day.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info};

use crate::config::Config;
use crate::models::CycleState;

pub struct LeagueBrain {
    tier1: Vec<String>,
    tier2: Vec<String>,
    tier2_per_cycle: usize,
    dry_cycles_threshold: u32,
    fallback_daily_limit: u32,
}

impl LeagueBrain {
    pub fn new(config: &Config) -> Self {
        Self {
            tier1: config.tier1_leagues.clone(),
            tier2: config.tier2_leagues.clone(),
            tier2_per_cycle: config.tier2_per_cycle,
            dry_cycles_threshold: config.tier2_dry_cycles_threshold,
            fallback_daily_limit: config.tier2_fallback_daily_limit,
        }
    }

    /// Next rotating Tier-2 batch; advances the cursor modulo the tier size.
    /// An empty Tier 2 yields an empty batch and leaves the cursor alone.
    fn tier2_batch(&self, state: &mut CycleState) -> Vec<String> {
        if self.tier2.is_empty() || self.tier2_per_cycle == 0 {
            return Vec::new();
        }
        let take = self.tier2_per_cycle.min(self.tier2.len());
        let mut batch = Vec::with_capacity(take);
        for i in 0..take {
            batch.push(self.tier2[(state.tier2_cursor + i) % self.tier2.len()].clone());
        }
        state.tier2_cursor = (state.tier2_cursor + take) % self.tier2.len();
        batch
    }

    /// Leagues to poll this cycle.
    pub fn leagues_for_cycle(
        &self,
        state: &mut CycleState,
        emergency_mode: bool,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        state.check_daily_reset(now);

        let mut selection = self.tier1.clone();
        if !emergency_mode {
            selection.extend(self.tier2_batch(state));

            // Dry-spell promotion: one extra rotating batch, rate-limited
            // per day.
            if state.consecutive_dry_cycles >= self.dry_cycles_threshold
                && state.tier2_fallback_activations_today < self.fallback_daily_limit
            {
                let bonus = self.tier2_batch(state);
                if !bonus.is_empty() {
                    info!(
                        dry_cycles = state.consecutive_dry_cycles,
                        activations_today = state.tier2_fallback_activations_today + 1,
                        "Promoting fallback batch after dry spell"
                    );
                    state.tier2_fallback_activations_today += 1;
                    state.last_fallback_activation = Some(now);
                    state.consecutive_dry_cycles = 0;
                    selection.extend(bonus);
                }
            }
        }

        selection.dedup();

        // Follow the sun: keep leagues whose active window contains the
        // current UTC hour. An all-inactive result falls back to the full
        // selection.
        let hour = now.hour() as u8;
        let active: Vec<String> = selection
            .iter()
            .filter(|league| {
                let params = config.league(league);
                params.active_hours_utc.is_empty()
                    || params
                        .active_hours_utc
                        .iter()
                        .any(|&(start, end)| hour_in_window(hour, start, end))
            })
            .cloned()
            .collect();

        if active.is_empty() {
            debug!(hour, "No league active this hour, keeping full selection");
            selection
        } else {
            active
        }
    }
}

/// End-exclusive window check; windows may wrap midnight.
fn hour_in_window(hour: u8, start: u8, end: u8) -> bool {
    if start == end {
        // Degenerate window covers the whole day.
        true
    } else if start < end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}
