//! History Matcher
//!
//! Token-overlap search over the interaction log for a reusable prior answer.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::store::InteractionLogEntry;

/// Minimum similarity for a prior exchange to be reused
pub const DEFAULT_THRESHOLD: f64 = 0.42;

pub(crate) static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\w+").unwrap()
});

/// Lower-cased word set of a message
pub fn tokenize(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Shared-word ratio in `[0, 1]`: `|A ∩ B| / max(|A|, |B|)`.
///
/// Divides by the larger set rather than the union. Empty on either side is 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = tokenize(a);
    let b = tokenize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let shared = a.intersection(&b).count();
    shared as f64 / a.len().max(b.len()) as f64
}

/// Best prior entry whose user text scores at least `threshold` against `query`.
///
/// Linear scan; a later entry replaces the current best only on a strictly
/// greater score, so ties keep the earliest.
pub fn find_similar<'a>(
    query: &str,
    log: &'a [InteractionLogEntry],
    threshold: f64,
) -> Option<(&'a InteractionLogEntry, f64)> {
    let mut best: Option<&InteractionLogEntry> = None;
    let mut best_score = 0.0;

    for entry in log {
        let score = similarity(query, &entry.user_text);
        if score > best_score {
            best_score = score;
            best = Some(entry);
        }
    }

    match best {
        Some(entry) if best_score >= threshold => Some((entry, best_score)),
        _ => None,
    }
}
