//! Per-provider API budget with tiered throttling.
//!
//! Three regimes by monthly usage: normal (component allocations enforced),
//! degraded (non-critical components cut to half their allocation), disabled
//! (critical components only). A monthly limit of 0 means unlimited: the
//! counters run for monitoring but `can_call` always passes. Day and month
//! rollovers reset lazily on the first call after the boundary.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BudgetConfig;

/// Components allowed through even in disabled mode.
const CRITICAL_COMPONENTS: &[&str] = &["main_pipeline", "closing_line"];

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub monthly_used: u32,
    pub monthly_limit: u32,
    pub daily_used: u32,
    pub usage_percentage: f64,
    pub is_degraded: bool,
    pub is_disabled: bool,
    pub component_usage: HashMap<String, u32>,
}

#[derive(Debug)]
pub struct BudgetManager {
    provider_name: String,
    monthly_limit: u32,
    degraded_threshold: f64,
    disabled_threshold: f64,
    allocations: HashMap<String, u32>,

    monthly_used: u32,
    daily_used: u32,
    component_usage: HashMap<String, u32>,
    last_reset_day: Option<u32>,
    last_reset_month: Option<u32>,
}

impl BudgetManager {
    pub fn new(provider_name: impl Into<String>, config: &BudgetConfig) -> Self {
        let provider_name = provider_name.into();
        info!(
            provider = %provider_name,
            monthly_limit = config.monthly_limit,
            components = config.allocations.len(),
            "Budget manager initialized"
        );
        Self {
            provider_name,
            monthly_limit: config.monthly_limit,
            degraded_threshold: config.degraded_threshold,
            disabled_threshold: config.disabled_threshold,
            allocations: config.allocations.clone(),
            monthly_used: 0,
            daily_used: 0,
            component_usage: config.allocations.keys().map(|k| (k.clone(), 0)).collect(),
            last_reset_day: None,
            last_reset_month: None,
        }
    }

    fn is_critical(&self, component: &str, is_critical: bool) -> bool {
        is_critical || CRITICAL_COMPONENTS.contains(&component)
    }

    pub fn can_call(&mut self, component: &str, is_critical: bool, now: DateTime<Utc>) -> bool {
        self.check_reset(now);

        if self.monthly_limit == 0 {
            return true;
        }

        let usage_pct = self.monthly_used as f64 / self.monthly_limit as f64;

        // Disabled mode: critical callers only.
        if usage_pct >= self.disabled_threshold {
            if self.is_critical(component, is_critical) {
                debug!(
                    provider = %self.provider_name,
                    component,
                    "Critical call allowed in disabled mode"
                );
                return true;
            }
            warn!(
                provider = %self.provider_name,
                component,
                "Call blocked: budget disabled"
            );
            return false;
        }

        // Degraded mode: non-critical components run on half allocation.
        if usage_pct >= self.degraded_threshold && !self.is_critical(component, is_critical) {
            let used = self.component_usage.get(component).copied().unwrap_or(0);
            let limit = self.allocations.get(component).copied().unwrap_or(0);
            if used as f64 >= limit as f64 * 0.5 {
                warn!(
                    provider = %self.provider_name,
                    component,
                    "Call throttled: degraded mode"
                );
                return false;
            }
        }

        // Normal mode: enforce the component allocation when one is set.
        let used = self.component_usage.get(component).copied().unwrap_or(0);
        let limit = self.allocations.get(component).copied().unwrap_or(0);
        if limit > 0 && used >= limit {
            warn!(
                provider = %self.provider_name,
                component,
                limit,
                "Component at allocation limit"
            );
            return false;
        }

        true
    }

    /// Record a completed call. Exactly one increment of the monthly counter
    /// per successful HTTP round-trip.
    pub fn record_call(&mut self, component: &str, now: DateTime<Utc>) {
        self.check_reset(now);

        self.monthly_used += 1;
        self.daily_used += 1;
        *self.component_usage.entry(component.to_string()).or_insert(0) += 1;

        if self.monthly_limit > 0 {
            let degraded_at = (self.monthly_limit as f64 * self.degraded_threshold) as u32;
            let disabled_at = (self.monthly_limit as f64 * self.disabled_threshold) as u32;
            if self.monthly_used == disabled_at {
                warn!(
                    provider = %self.provider_name,
                    "DISABLED threshold reached: only critical calls allowed"
                );
            } else if self.monthly_used == degraded_at {
                warn!(
                    provider = %self.provider_name,
                    "DEGRADED threshold reached: non-critical calls throttled"
                );
            }
            if self.monthly_used % 100 == 0 {
                info!(
                    provider = %self.provider_name,
                    used = self.monthly_used,
                    limit = self.monthly_limit,
                    "Budget usage milestone"
                );
            }
        }
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> BudgetStatus {
        self.check_reset(now);
        let usage_pct = if self.monthly_limit > 0 {
            self.monthly_used as f64 / self.monthly_limit as f64
        } else {
            0.0
        };
        BudgetStatus {
            monthly_used: self.monthly_used,
            monthly_limit: self.monthly_limit,
            daily_used: self.daily_used,
            usage_percentage: usage_pct * 100.0,
            is_degraded: self.monthly_limit > 0 && usage_pct >= self.degraded_threshold,
            is_disabled: self.monthly_limit > 0 && usage_pct >= self.disabled_threshold,
            component_usage: self.component_usage.clone(),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.monthly_limit.saturating_sub(self.monthly_used)
    }

    fn check_reset(&mut self, now: DateTime<Utc>) {
        let day = now.day();
        let month = now.month();

        match self.last_reset_month {
            None => self.last_reset_month = Some(month),
            Some(prev) if prev != month => {
                info!(provider = %self.provider_name, "New month: monthly budget reset");
                self.monthly_used = 0;
                self.daily_used = 0;
                for v in self.component_usage.values_mut() {
                    *v = 0;
                }
                self.last_reset_month = Some(month);
                self.last_reset_day = Some(day);
                return;
            }
            _ => {}
        }

        match self.last_reset_day {
            None => self.last_reset_day = Some(day),
            Some(prev) if prev != day => {
                debug!(provider = %self.provider_name, "Daily counter reset");
                self.daily_used = 0;
                self.last_reset_day = Some(day);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn config(limit: u32) -> BudgetConfig {
        BudgetConfig {
            monthly_limit: limit,
            degraded_threshold: 0.90,
            disabled_threshold: 0.95,
            allocations: HashMap::from([
                ("news_radar".to_string(), 10),
                ("main_pipeline".to_string(), 100),
            ]),
        }
    }

    #[test]
    fn test_record_call_increments_monthly_by_one() {
        let mut b = BudgetManager::new("test", &config(100));
        for i in 1..=5 {
            b.record_call("news_radar", t0());
            assert_eq!(b.status(t0()).monthly_used, i);
        }
    }

    #[test]
    fn test_unlimited_provider_always_allows() {
        let mut b = BudgetManager::new("free", &BudgetConfig::unlimited());
        for _ in 0..1000 {
            b.record_call("anything", t0());
        }
        assert!(b.can_call("anything", false, t0()));
        let status = b.status(t0());
        assert!(!status.is_degraded);
        assert!(!status.is_disabled);
        assert_eq!(status.monthly_used, 1000);
    }

    #[test]
    fn test_component_allocation_enforced_in_normal_mode() {
        let mut b = BudgetManager::new("test", &config(1000));
        for _ in 0..10 {
            assert!(b.can_call("news_radar", false, t0()));
            b.record_call("news_radar", t0());
        }
        assert!(!b.can_call("news_radar", false, t0()));
        // Components without an allocation are unconstrained in normal mode.
        assert!(b.can_call("deep_dive", false, t0()));
    }

    #[test]
    fn test_disabled_mode_critical_only() {
        let mut b = BudgetManager::new("test", &config(100));
        for _ in 0..96 {
            b.record_call("main_pipeline", t0());
        }
        assert!(b.status(t0()).is_disabled);
        assert!(!b.can_call("news_radar", false, t0()));
        assert!(b.can_call("main_pipeline", false, t0()), "critical component passes");
        assert!(b.can_call("news_radar", true, t0()), "explicit critical flag passes");
    }

    #[test]
    fn test_degraded_mode_halves_noncritical_allocation() {
        let mut b = BudgetManager::new("test", &config(100));
        // Use 6 of the news_radar allocation (10), then push monthly into the
        // degraded band (90..95).
        for _ in 0..6 {
            b.record_call("news_radar", t0());
        }
        for _ in 0..85 {
            b.record_call("main_pipeline", t0());
        }
        let status = b.status(t0());
        assert!(status.is_degraded && !status.is_disabled);
        // 6 >= 10 * 0.5: throttled.
        assert!(!b.can_call("news_radar", false, t0()));
        assert!(b.can_call("main_pipeline", false, t0()));
    }

    #[test]
    fn test_daily_and_monthly_rollover_is_lazy() {
        let mut b = BudgetManager::new("test", &config(100));
        b.record_call("main_pipeline", t0());
        assert_eq!(b.status(t0()).daily_used, 1);

        let next_day = Utc.with_ymd_and_hms(2026, 5, 11, 0, 1, 0).unwrap();
        assert_eq!(b.status(next_day).daily_used, 0);
        assert_eq!(b.status(next_day).monthly_used, 1);

        let next_month = Utc.with_ymd_and_hms(2026, 6, 1, 0, 1, 0).unwrap();
        let status = b.status(next_month);
        assert_eq!(status.monthly_used, 0);
        assert_eq!(status.component_usage.get("main_pipeline"), Some(&0));
    }
}
