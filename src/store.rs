//! Persistent Store
//!
//! Agent state and the interaction log, kept as two JSON documents on disk.
//! Loading never fails: a missing or corrupt state document yields fresh
//! defaults and a corrupt log reads as empty.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::scorer::ScorerWeights;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the agent may use unprompted speech
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Passive,
    Proactive,
    Restricted,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Passive => "passive",
            Mode::Proactive => "proactive",
            Mode::Restricted => "restricted",
        }
    }

    /// Parse a mode name as typed in a `set mode` command
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "passive" => Some(Mode::Passive),
            "proactive" => Some(Mode::Proactive),
            "restricted" => Some(Mode::Restricted),
            _ => None,
        }
    }
}

/// Cosmetic personality; only changes reply embellishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Curious,
    Plain,
}

/// A learned fact's value: literal text, or just "known" with no content.
///
/// Persisted as a JSON string or the literal `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactValue {
    Text(String),
    Present,
}

impl Serialize for FactValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FactValue::Text(text) => serializer.serialize_str(text),
            FactValue::Present => serializer.serialize_bool(true),
        }
    }
}

impl<'de> Deserialize<'de> for FactValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Flag(bool),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => FactValue::Text(text),
            Raw::Flag(_) => FactValue::Present,
        })
    }
}

/// Speech policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    /// `(start_hour, end_hour)`, half-open, wraps past midnight when `start >= end`
    pub quiet_hours: (u32, u32),
    pub rate_limit_per_hour: u32,
    pub muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Passive,
            quiet_hours: (22, 7),
            rate_limit_per_hour: 6,
            muted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub created_at: DateTime<Utc>,
}

/// The single persisted aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentState {
    pub name: String,
    pub personality: Personality,
    #[serde(deserialize_with = "non_empty_name")]
    pub user_name: Option<String>,
    /// Insertion-ordered; recall and reminders take the earliest learned match
    pub learned_facts: IndexMap<String, FactValue>,
    pub response_fitness: BTreeMap<usize, f64>,
    /// Scorer parameters; unreadable weights load as `None` without failing the document
    #[serde(deserialize_with = "lenient_weights")]
    pub weights: Option<ScorerWeights>,
    pub meta: Meta,
    pub settings: Settings,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            name: "Genetic".to_string(),
            personality: Personality::Curious,
            user_name: None,
            learned_facts: IndexMap::new(),
            response_fitness: BTreeMap::new(),
            weights: None,
            meta: Meta {
                created_at: Utc::now(),
            },
            settings: Settings::default(),
        }
    }
}

impl AgentState {
    /// Give every response index below `count` a fitness, defaulting to 1.0
    pub fn ensure_fitness(&mut self, count: usize) {
        for index in 0..count {
            self.response_fitness.entry(index).or_insert(1.0);
        }
    }

    pub fn fitness(&self, index: usize) -> f64 {
        self.response_fitness.get(&index).copied().unwrap_or(1.0)
    }

    /// Insert or replace a fact; keys are case-folded. Replacing keeps the
    /// key's original position.
    pub fn learn_fact(&mut self, key: &str, value: FactValue) {
        self.learned_facts.insert(key.trim().to_lowercase(), value);
    }
}

fn non_empty_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.filter(|n| !n.trim().is_empty()))
}

fn lenient_weights<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<ScorerWeights>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(weights) => Ok(Some(weights)),
        Err(e) => {
            warn!("Discarding unreadable scorer weights: {}", e);
            Ok(None)
        }
    }
}

/// One exchange in the append-only interaction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "bot")]
    pub bot_text: String,
    /// Absent for command and fact-learning turns
    pub response_index: Option<usize>,
}

impl InteractionLogEntry {
    pub fn new(user_text: &str, bot_text: &str, response_index: Option<usize>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_text: user_text.to_string(),
            bot_text: bot_text.to_string(),
            response_index,
        }
    }
}

/// File-backed store for the agent state document and the interaction log
#[derive(Debug, Clone)]
pub struct StateStore {
    memory_path: PathBuf,
    log_path: PathBuf,
}

impl StateStore {
    /// Open the store, creating parent directories and an empty log if needed
    pub fn open(memory_path: &Path, log_path: &Path) -> Result<Self, StoreError> {
        for path in [memory_path, log_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let store = Self {
            memory_path: memory_path.to_path_buf(),
            log_path: log_path.to_path_buf(),
        };

        if !store.log_path.exists() {
            write_atomic(&store.log_path, b"[]")?;
        }

        info!(
            "State store opened: {} (log: {})",
            store.memory_path.display(),
            store.log_path.display()
        );
        Ok(store)
    }

    pub fn memory_path(&self) -> &Path {
        &self.memory_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Load the persisted state, or defaults with a fresh creation time
    pub fn load(&self) -> AgentState {
        if !self.memory_path.exists() {
            info!("No saved state at {}, starting fresh", self.memory_path.display());
            return AgentState::default();
        }

        let parsed = std::fs::read_to_string(&self.memory_path)
            .map_err(StoreError::from)
            .and_then(|data| serde_json::from_str::<AgentState>(&data).map_err(StoreError::from));

        match parsed {
            Ok(state) => {
                debug!(
                    "Loaded state: {} facts, {} fitness entries",
                    state.learned_facts.len(),
                    state.response_fitness.len()
                );
                state
            }
            Err(e) => {
                warn!("Saved state is corrupt ({}), starting fresh", e);
                AgentState::default()
            }
        }
    }

    /// Overwrite the full state document
    pub fn save(&self, state: &AgentState) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.memory_path, &data)?;
        debug!("State saved to {}", self.memory_path.display());
        Ok(())
    }

    /// Read the whole interaction log; missing or corrupt reads as empty
    pub fn read_log(&self) -> Vec<InteractionLogEntry> {
        let data = match std::fs::read_to_string(&self.log_path) {
            Ok(data) => data,
            Err(e) => {
                debug!("Interaction log unreadable ({}), treating as empty", e);
                return Vec::new();
            }
        };

        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("Interaction log is corrupt ({}), treating as empty", e);
            Vec::new()
        })
    }

    /// Append one entry by rewriting the whole log
    pub fn append_log(&self, entry: InteractionLogEntry) -> Result<(), StoreError> {
        let mut log = self.read_log();
        log.push(entry);
        let data = serde_json::to_vec_pretty(&log)?;
        write_atomic(&self.log_path, &data)?;
        debug!("Interaction log now has {} entries", log.len());
        Ok(())
    }
}

/// Write to a temporary sibling and rename it over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
