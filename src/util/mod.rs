//! Shared parsing and text utilities.

pub mod fuzzy;
pub mod json_extract;
pub mod time;

pub use fuzzy::fuzzy_match_team;
pub use json_extract::{extract_json, JsonExtractError};
pub use time::ensure_utc;

use sha2::{Digest, Sha256};

/// Stable fingerprint of a piece of content: sha256 over the case-folded,
/// whitespace-collapsed text.
pub fn content_fingerprint(content: &str) -> String {
    let normalized: String = content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncate on a char boundary, appending an ellipsis when content was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}
