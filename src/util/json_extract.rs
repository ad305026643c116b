//! Tolerant JSON extraction from AI responses.
//!
//! Models wrap their JSON in prose, markdown fences, or `<think>` blocks, and
//! sometimes emit several candidate objects. The contract here: strip the
//! noise, scan for balanced top-level objects, and return the LAST one that
//! parses. No panics, no exceptions-as-control-flow; a typed error when the
//! text holds no JSON at all.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonExtractError {
    /// Input was empty or whitespace-only.
    Empty,
    /// No balanced `{...}` region parsed as a JSON object.
    NoJsonFound,
}

impl std::fmt::Display for JsonExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonExtractError::Empty => write!(f, "empty AI response"),
            JsonExtractError::NoJsonFound => write!(f, "no JSON object in AI response"),
        }
    }
}

impl std::error::Error for JsonExtractError {}

/// Extract the last valid JSON object from free-form model output.
pub fn extract_json(text: &str) -> Result<Value, JsonExtractError> {
    if text.trim().is_empty() {
        return Err(JsonExtractError::Empty);
    }

    let cleaned = strip_think_blocks(text);
    let cleaned = strip_code_fences(&cleaned);

    let mut last_valid: Option<Value> = None;
    for candidate in balanced_object_spans(&cleaned) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                last_valid = Some(value);
            }
        }
    }

    last_valid.ok_or(JsonExtractError::NoJsonFound)
}

/// Remove `<think>...</think>` reasoning blocks (case-insensitive tags).
fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let lower = rest.to_lowercase();
        let Some(open) = lower.find("<think>") else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..open]);
        let after_open = &rest[open + "<think>".len()..];
        let lower_after = after_open.to_lowercase();
        match lower_after.find("</think>") {
            Some(close) => rest = &after_open[close + "</think>".len()..],
            // Unterminated block: drop everything after the opening tag.
            None => return out,
        }
    }
}

/// Drop markdown fence lines, keeping fenced content.
fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level balanced `{...}` spans, brace-counted outside string literals.
fn balanced_object_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let v = extract_json(r#"{"verdict": "BET", "confidence": 80}"#).unwrap();
        assert_eq!(v["confidence"], 80);
    }

    #[test]
    fn test_surrounding_prose_and_fences() {
        let text = "Here is my analysis:\n```json\n{\"verdict\": \"NO BET\"}\n```\nHope it helps.";
        let v = extract_json(text).unwrap();
        assert_eq!(v["verdict"], "NO BET");
    }

    #[test]
    fn test_last_valid_object_wins() {
        let text = r#"Draft: {"confidence": 10} ... final answer: {"confidence": 90}"#;
        let v = extract_json(text).unwrap();
        assert_eq!(v["confidence"], 90);
    }

    #[test]
    fn test_think_blocks_stripped() {
        let text = "<think>{\"confidence\": 1} internal scratch</think>{\"confidence\": 70}";
        let v = extract_json(text).unwrap();
        assert_eq!(v["confidence"], 70);
    }

    #[test]
    fn test_braces_inside_strings_do_not_split_objects() {
        let text = r#"{"reasoning": "watch the {home} side", "confidence": 55}"#;
        let v = extract_json(text).unwrap();
        assert_eq!(v["confidence"], 55);
    }

    #[test]
    fn test_invalid_candidates_skipped() {
        let text = r#"{not json at all} then {"ok": true}"#;
        let v = extract_json(text).unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn test_no_json_is_typed_error() {
        assert_eq!(extract_json("nothing here"), Err(JsonExtractError::NoJsonFound));
        assert_eq!(extract_json("   "), Err(JsonExtractError::Empty));
    }
}
