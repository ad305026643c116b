//! Process-wide seen-content cache.
//!
//! Suppresses cross-provider duplicates in the search federation and the AI
//! pre-enrichment: the same headline fetched via two different vendors should
//! hit the pipeline once. Entries carry a bounded age and the set is capped.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::util::content_fingerprint;

pub struct ContentSeenCache {
    entries: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    max_age: Duration,
    max_entries: usize,
}

impl ContentSeenCache {
    pub fn new(max_age: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
            max_entries: max_entries.max(16),
        }
    }

    pub fn is_seen(&self, content: &str, source: &str, now: DateTime<Utc>) -> bool {
        let key = (source.to_string(), content_fingerprint(content));
        let entries = self.entries.lock();
        entries
            .get(&key)
            .map(|seen_at| now - *seen_at <= self.max_age)
            .unwrap_or(false)
    }

    pub fn mark_seen(&self, content: &str, source: &str, now: DateTime<Utc>) {
        let key = (source.to_string(), content_fingerprint(content));
        let mut entries = self.entries.lock();
        entries.insert(key, now);

        if entries.len() > self.max_entries {
            let cutoff = now - self.max_age;
            entries.retain(|_, seen_at| *seen_at > cutoff);
            // Still oversized after expiry sweep: drop the oldest half.
            if entries.len() > self.max_entries {
                let mut by_age: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
                by_age.sort_by_key(|(_, v)| *v);
                for (k, _) in by_age.into_iter().take(entries.len() / 2) {
                    entries.remove(&k);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ContentSeenCache {
    fn default() -> Self {
        Self::new(Duration::hours(24), 5000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_seen_is_scoped_by_source() {
        let cache = ContentSeenCache::default();
        cache.mark_seen("Striker out injured", "brave", t0());
        assert!(cache.is_seen("Striker out injured", "brave", t0()));
        assert!(!cache.is_seen("Striker out injured", "mediastack", t0()));
    }

    #[test]
    fn test_entries_expire() {
        let cache = ContentSeenCache::new(Duration::hours(1), 100);
        cache.mark_seen("old headline", "ddg", t0());
        assert!(cache.is_seen("old headline", "ddg", t0() + Duration::minutes(59)));
        assert!(!cache.is_seen("old headline", "ddg", t0() + Duration::minutes(61)));
    }

    #[test]
    fn test_fingerprint_normalization_collapses_variants() {
        let cache = ContentSeenCache::default();
        cache.mark_seen("Striker   OUT  injured", "brave", t0());
        assert!(cache.is_seen("striker out injured", "brave", t0()));
    }

    #[test]
    fn test_size_cap_evicts() {
        let cache = ContentSeenCache::new(Duration::hours(24), 16);
        for i in 0..40 {
            cache.mark_seen(&format!("headline {i}"), "ddg", t0());
        }
        assert!(cache.len() <= 20, "cache kept {} entries", cache.len());
    }
}
