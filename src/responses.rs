//! Canned response table and reply wording

use crate::store::{FactValue, Personality};

/// Fixed ordered reply table; the scorer has one output per entry
pub const RESPONSES: [&str; 7] = [
    "Hello! How can I help you today?",
    "My name is Genetic. What would you like me to learn?",
    "That's interesting, tell me more.",
    "I am still learning. Could you explain that?",
    "I don't know that yet. Please teach me by saying 'remember ...'.",
    "Got it. I'll remember that.",
    "I might be mistaken, please correct me if I'm wrong.",
];

/// Response index logged for fact-recall turns
pub const RECALL_INDEX: usize = 4;

pub fn response_count() -> usize {
    RESPONSES.len()
}

/// Canned reply for `index`, embellished for the personality
pub fn canned(index: usize, personality: Personality) -> Option<String> {
    let base = RESPONSES.get(index)?;

    let text = match (personality, index) {
        (Personality::Curious, 0) => format!("{} I'm curious what's on your mind.", base),
        (Personality::Curious, 2) => format!("{} What got you thinking about that?", base),
        (Personality::Curious, 3) => "I'm still learning and I love new things. Could you explain that?".to_string(),
        _ => base.to_string(),
    };
    Some(text)
}

pub fn fact_recall(key: &str, value: &FactValue) -> String {
    match value {
        FactValue::Text(text) => format!("{} is {}", key, text),
        FactValue::Present => format!("I remember {}.", key),
    }
}

pub fn fact_learned(key: &str, value: &FactValue) -> String {
    match value {
        FactValue::Text(text) => format!("I will remember that {} is {}", key, text),
        FactValue::Present => format!("I will remember {}.", key),
    }
}

pub fn identity_learned(name: &str) -> String {
    format!("Nice meeting you {}, I will remember you.", name)
}

pub fn reused(previous: &str) -> String {
    format!("As I said earlier: {}", previous)
}

/// Marker prefixed to the logged bot text of a history-reuse turn
pub const REUSED_PREFIX: &str = "reused:";

/// Unprompted line: a pending reminder first, then a greeting, then an invitation
pub fn proactive_line(user_name: Option<&str>, reminder: Option<&str>) -> String {
    match (reminder, user_name) {
        (Some(key), _) => format!("Don't forget: {}.", key),
        (None, Some(name)) => format!("Hey {}, is there anything new you'd like me to learn?", name),
        (None, None) => "I'm here if you want to teach me something. Just say 'remember ...'.".to_string(),
    }
}
