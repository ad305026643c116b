//! Fuzzy team-name matching.
//!
//! Odds feeds, news sources and the stats provider rarely agree on spelling
//! ("Man Utd" / "Manchester United" / "Manchester Utd"). Matching runs on
//! diacritic-folded lowercase tokens: exact, then containment, then token
//! overlap with alias expansion, then trigram similarity as the last rung.

/// Common short forms seen in odds feeds, expanded before token comparison.
const TOKEN_ALIASES: &[(&str, &str)] = &[
    ("utd", "united"),
    ("intl", "international"),
    ("st", "saint"),
];

/// Filler tokens carrying no identity.
const STOP_TOKENS: &[&str] = &["fc", "cf", "afc", "ac", "as", "ssc", "club", "de", "the"];

/// Normalize a team name: lowercase, fold common diacritics, drop punctuation.
pub fn normalize_team_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(fold_char)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ş' => 's',
        'ğ' => 'g',
        'ı' => 'i',
        'ł' => 'l',
        _ => c,
    }
}

fn identity_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|t| !STOP_TOKENS.contains(t))
        .map(|t| {
            TOKEN_ALIASES
                .iter()
                .find(|(short, _)| *short == t)
                .map(|(_, long)| normalize_team_name(long))
                .unwrap_or_else(|| t.to_string())
        })
        .collect()
}

/// Best candidate for `name` among `candidates`, or None when nothing clears
/// the similarity floor.
pub fn fuzzy_match_team<'a>(name: &str, candidates: &'a [&'a str]) -> Option<&'a str> {
    let target = normalize_team_name(name);
    if target.is_empty() {
        return None;
    }

    // Pass 1: exact normalized match.
    for c in candidates {
        if normalize_team_name(c) == target {
            return Some(c);
        }
    }

    // Pass 2: containment either way ("porto" in "fc porto").
    for c in candidates {
        let cn = normalize_team_name(c);
        if cn.contains(&target) || target.contains(&cn) {
            return Some(c);
        }
    }

    // Pass 3: alias-expanded token overlap. Every identity token of the
    // shorter name must appear (possibly as a prefix) in the candidate.
    let target_tokens = identity_tokens(&target);
    let mut best: Option<(&str, usize)> = None;
    for c in candidates {
        let cand_tokens = identity_tokens(&normalize_team_name(c));
        let hits = target_tokens
            .iter()
            .filter(|t| {
                cand_tokens
                    .iter()
                    .any(|ct| ct == *t || ct.starts_with(t.as_str()) || t.starts_with(ct.as_str()))
            })
            .count();
        if !target_tokens.is_empty() && hits == target_tokens.len() {
            match best {
                Some((_, prev)) if prev >= hits => {}
                _ => best = Some((c, hits)),
            }
        }
    }
    if let Some((c, _)) = best {
        return Some(c);
    }

    // Pass 4: trigram similarity.
    let mut best_sim: Option<(&str, f64)> = None;
    for c in candidates {
        let sim = trigram_similarity(&target, &normalize_team_name(c));
        if sim >= 0.55 {
            match best_sim {
                Some((_, prev)) if prev >= sim => {}
                _ => best_sim = Some((c, sim)),
            }
        }
    }
    best_sim.map(|(c, _)| c)
}

/// Dice coefficient over character trigrams of the padded strings.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let mut shared = 0usize;
    let mut tb_pool = tb.clone();
    for t in &ta {
        if let Some(pos) = tb_pool.iter().position(|x| x == t) {
            tb_pool.swap_remove(pos);
            shared += 1;
        }
    }
    (2.0 * shared as f64) / (ta.len() + tb.len()) as f64
}

fn trigrams(s: &str) -> Vec<String> {
    let padded: Vec<char> = format!("  {s} ").chars().collect();
    padded.windows(3).map(|w| w.iter().collect()).collect()
}
