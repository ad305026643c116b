//! Search federation.
//!
//! Ordered chain of search providers behind one `search` operation:
//! quality-first paid primary, free self-rate-limited secondary, paid
//! small-budget tertiary, free unlimited last resort. A stage may refuse
//! (budget, circuit, missing credentials) and the chain falls through; when
//! every stage refuses the federation returns an empty list, never an error.
//!
//! Query hygiene: negative-term operators (`-basket`) are stripped before
//! dispatch to providers that cannot parse them and re-applied post-fetch.
//! Every stage's results pass the sport/gender exclusion filter.

pub mod brave;
pub mod ddg;
pub mod mediastack;
pub mod serper;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::providers::content_cache::ContentSeenCache;

/// One search hit, normalized across providers.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

/// Results whose title or snippet match any of these indicate the wrong
/// sport or the women's side of a shared club name.
const SPORT_EXCLUSION_TERMS: &[&str] = &[
    // Basketball
    "basket",
    "basketball",
    "euroleague",
    "nba",
    "pallacanestro",
    "baloncesto",
    "basketbol",
    // American football
    "nfl",
    "american football",
    "touchdown",
    "super bowl",
    // Women's football (avoid false positives on shared team names)
    "women",
    "woman",
    "ladies",
    "feminine",
    "femminile",
    "femenino",
    "kobiet",
    "kadin",
    "wsl",
    "liga f",
    // Other codes
    "handball",
    "volleyball",
    "rugby",
    "futsal",
];

/// Word-boundary containment check. Short terms (<= 4 chars) require word
/// boundaries so "women" never fires on "showmen" and "nba" never fires on
/// "unbalanced"; longer terms use plain containment.
pub fn matches_exclusion_term(text: &str, term: &str) -> bool {
    let text = text.to_lowercase();
    let term = term.to_lowercase();
    if term.len() <= 4 {
        contains_word(&text, &term)
    } else {
        text.contains(&term)
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    for (idx, _) in text.match_indices(word) {
        let before_ok = text[..idx]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = text[idx + word.len()..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

fn is_excluded(result: &SearchResult, extra_terms: &[String]) -> bool {
    let fields = [result.title.as_str(), result.snippet.as_str()];
    for text in fields {
        for term in SPORT_EXCLUSION_TERMS {
            if matches_exclusion_term(text, term) {
                return true;
            }
        }
        for term in extra_terms {
            if matches_exclusion_term(text, term) {
                return true;
            }
        }
    }
    false
}

/// Split `-term` exclusions out of a query. Multi-word negatives are not
/// produced by our query builders, so token-level parsing is enough.
pub fn strip_negative_terms(query: &str) -> (String, Vec<String>) {
    let mut kept = Vec::new();
    let mut excluded = Vec::new();
    for token in query.split_whitespace() {
        if let Some(term) = token.strip_prefix('-') {
            if !term.is_empty() {
                excluded.push(term.to_lowercase());
            }
        } else {
            kept.push(token);
        }
    }
    (kept.join(" "), excluded)
}

/// A member of the federation chain.
#[async_trait]
pub trait SearchStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this stage can parse `-term` operators natively. When false
    /// the federation strips them and filters post-fetch.
    fn supports_negative_operators(&self) -> bool {
        false
    }

    /// Cheap refusal check (credentials, budget, circuit). A refusing stage
    /// is skipped without counting as a failure.
    fn is_available(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchResult>>;
}

pub struct SearchFederation {
    stages: Vec<Box<dyn SearchStage>>,
    seen_cache: Arc<ContentSeenCache>,
}

impl SearchFederation {
    pub fn new(stages: Vec<Box<dyn SearchStage>>, seen_cache: Arc<ContentSeenCache>) -> Self {
        info!(stages = stages.len(), "Search federation initialized");
        Self { stages, seen_cache }
    }

    /// Walk the chain until one stage yields usable results. All-refused or
    /// all-failed returns an empty list.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let (clean_query, negatives) = strip_negative_terms(query);
        let now = Utc::now();

        for stage in &self.stages {
            if !stage.is_available() {
                debug!(stage = stage.name(), "Search stage refused");
                continue;
            }

            let dispatch_query = if stage.supports_negative_operators() {
                query.to_string()
            } else {
                clean_query.clone()
            };

            match stage.search(&dispatch_query, limit).await {
                Ok(results) => {
                    let total = results.len();
                    let filtered: Vec<SearchResult> = results
                        .into_iter()
                        .filter(|r| !is_excluded(r, &negatives))
                        .filter(|r| {
                            // Cross-provider dedup on the shared seen-cache.
                            let fresh = !self.seen_cache.is_seen(&r.title, "search", now);
                            if fresh {
                                self.seen_cache.mark_seen(&r.title, "search", now);
                            }
                            fresh
                        })
                        .collect();
                    if total > filtered.len() {
                        debug!(
                            stage = stage.name(),
                            dropped = total - filtered.len(),
                            "Filtered excluded/duplicate results"
                        );
                    }
                    if !filtered.is_empty() {
                        info!(stage = stage.name(), results = filtered.len(), "Search served");
                        return filtered;
                    }
                }
                Err(e) => {
                    warn!(stage = stage.name(), error = %e, "Search stage failed, falling through");
                }
            }
        }

        debug!(query = %query, "All search stages refused or failed");
        Vec::new()
    }
}
