//! API key pool with exhaustion tracking and lazy monthly reset.
//!
//! A 429/432 from the vendor marks the active key exhausted and advances to
//! the next live one, wrapping modulo the pool. Once the whole pool is
//! exhausted, rotation attempts a monthly reset, only if a month boundary
//! has been crossed since the last reset. The reset is always triggered
//! lazily from inside rotation/lookup, never from a timer.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct KeyRotatorStatus {
    pub total_keys: usize,
    pub available_keys: usize,
    pub current_index: usize,
    pub exhausted: Vec<usize>,
    pub total_usage: u64,
    pub last_reset_month: Option<u32>,
}

#[derive(Debug)]
pub struct KeyRotator {
    name: String,
    keys: Vec<String>,
    current_index: usize,
    usage: Vec<u64>,
    exhausted: HashSet<usize>,
    last_reset_month: Option<u32>,
}

impl KeyRotator {
    pub fn new(name: impl Into<String>, keys: Vec<String>) -> Self {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let name = name.into();
        if keys.is_empty() {
            warn!(rotator = %name, "Key rotator initialized with no valid keys");
        } else {
            info!(rotator = %name, keys = keys.len(), "Key rotator initialized");
        }
        let usage = vec![0; keys.len()];
        Self {
            name,
            keys,
            current_index: 0,
            usage,
            exhausted: HashSet::new(),
            last_reset_month: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Active key, or None when the whole pool is exhausted (and no month
    /// boundary allows a reset). Never returns an exhausted key.
    pub fn current(&mut self, now: DateTime<Utc>) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        self.check_monthly_reset(now);
        if self.exhausted.contains(&self.current_index) && !self.rotate_to_next(now) {
            return None;
        }
        Some(self.keys[self.current_index].clone())
    }

    /// Flag a key (default: the active one) as exhausted and try to move on.
    pub fn mark_exhausted(&mut self, index: Option<usize>, now: DateTime<Utc>) {
        let idx = index.unwrap_or(self.current_index);
        if idx < self.keys.len() {
            self.exhausted.insert(idx);
            warn!(
                rotator = %self.name,
                key = idx + 1,
                usage = self.usage.get(idx).copied().unwrap_or(0),
                "Key marked exhausted"
            );
            if idx == self.current_index {
                self.rotate_to_next(now);
            }
        }
    }

    /// Advance one step to the next non-exhausted key, wrapping around. When
    /// every key is exhausted, attempt a monthly reset before giving up.
    pub fn rotate_to_next(&mut self, now: DateTime<Utc>) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        let from = self.current_index;
        for _ in 0..self.keys.len() {
            self.current_index = (self.current_index + 1) % self.keys.len();
            if !self.exhausted.contains(&self.current_index) {
                info!(
                    rotator = %self.name,
                    from = from + 1,
                    to = self.current_index + 1,
                    remaining = self.keys.len() - self.exhausted.len(),
                    "Key rotation"
                );
                return true;
            }
        }

        // Whole pool exhausted: a crossed month boundary earns a reset.
        let current_month = now.month();
        if self.last_reset_month != Some(current_month) {
            info!(rotator = %self.name, "All keys exhausted, applying monthly reset");
            self.reset_all(now);
            return true;
        }

        warn!(rotator = %self.name, "All keys exhausted, no reset available");
        false
    }

    /// Count a call against the active key.
    pub fn record_call(&mut self) {
        if let Some(slot) = self.usage.get_mut(self.current_index) {
            *slot += 1;
        }
    }

    /// Clear the exhausted set and usage counters; stamp the reset month.
    pub fn reset_all(&mut self, now: DateTime<Utc>) {
        self.current_index = 0;
        self.exhausted.clear();
        for slot in &mut self.usage {
            *slot = 0;
        }
        self.last_reset_month = Some(now.month());
        info!(rotator = %self.name, keys = self.keys.len(), "Key pool reset");
    }

    pub fn is_available(&mut self, now: DateTime<Utc>) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        self.check_monthly_reset(now);
        self.exhausted.len() < self.keys.len()
    }

    pub fn status(&self) -> KeyRotatorStatus {
        KeyRotatorStatus {
            total_keys: self.keys.len(),
            available_keys: self.keys.len() - self.exhausted.len(),
            current_index: self.current_index,
            exhausted: {
                let mut v: Vec<usize> = self.exhausted.iter().copied().collect();
                v.sort_unstable();
                v
            },
            total_usage: self.usage.iter().sum(),
            last_reset_month: self.last_reset_month,
        }
    }

    fn check_monthly_reset(&mut self, now: DateTime<Utc>) {
        let current_month = now.month();
        match self.last_reset_month {
            None => self.last_reset_month = Some(current_month),
            Some(prev) if prev != current_month => {
                info!(rotator = %self.name, "New month detected");
                self.reset_all(now);
            }
            _ => {}
        }
    }
}
