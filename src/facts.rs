//! Fact Extractor
//!
//! Pattern-based parsing of free text into a key/value fact or a user
//! identity assertion. Rules are tried in a fixed order and the first match
//! wins. Patterns are greedy, so `remember a: b: c` splits on the last colon.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::store::FactValue;

/// Key reported for "I am ..." assertions
pub const USER_IDENTITY_KEY: &str = "user_identity";

static RE_REMEMBER_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*remember (.+):(.+)").unwrap()
});

static RE_REMEMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*remember (.+)").unwrap()
});

static RE_MY_IS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*my (.+) is (.+)").unwrap()
});

static RE_IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*(?:i am|i'm) (.+)").unwrap()
});

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A fact to upsert; the key is already case-folded
    Fact { key: String, value: FactValue },
    /// The user told us who they are
    Identity(String),
}

impl Extracted {
    /// Key this extraction would be stored under
    pub fn key(&self) -> &str {
        match self {
            Extracted::Fact { key, .. } => key,
            Extracted::Identity(_) => USER_IDENTITY_KEY,
        }
    }
}

/// Parse `text` against the fact rules.
///
/// Matching is case-insensitive on the trimmed input. Keys are lower-cased;
/// values keep the casing the user typed so names survive ("I am Dana").
pub fn extract(text: &str) -> Option<Extracted> {
    let text = text.trim();

    if let Some(caps) = RE_REMEMBER_PAIR.captures(text) {
        return fact(&caps[1], FactValue::Text(caps[2].trim().to_string()));
    }

    if let Some(caps) = RE_REMEMBER.captures(text) {
        return fact(&caps[1], FactValue::Present);
    }

    if let Some(caps) = RE_MY_IS.captures(text) {
        return fact(&caps[1], FactValue::Text(caps[2].trim().to_string()));
    }

    if let Some(caps) = RE_IDENTITY.captures(text) {
        let name = caps[1].trim();
        if !name.is_empty() {
            return Some(Extracted::Identity(name.to_string()));
        }
    }

    None
}

fn fact(raw_key: &str, value: FactValue) -> Option<Extracted> {
    let key = raw_key.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    Some(Extracted::Fact { key, value })
}
