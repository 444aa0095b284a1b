//! Configuration management

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the state document and interaction log
    pub data_dir: PathBuf,

    /// Agent state document (facts, settings, fitness, weights)
    pub memory_path: PathBuf,

    /// Append-only interaction log
    pub log_path: PathBuf,

    /// Interval between proactive speech attempts
    pub proactive_interval: Duration,

    /// Text-to-speech webhook (optional - console output otherwise)
    pub voice_url: Option<String>,

    /// Voice webhook timeout
    pub voice_timeout: Duration,

    /// Fixed scorer RNG seed (optional)
    pub seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("GENETICBOT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let mut config = Self::with_data_dir(&data_dir);

        if let Ok(path) = std::env::var("GENETICBOT_MEMORY_FILE") {
            config.memory_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("GENETICBOT_LOG_FILE") {
            config.log_path = PathBuf::from(path);
        }

        if let Ok(secs) = std::env::var("GENETICBOT_PROACTIVE_INTERVAL") {
            let secs: u64 = secs
                .parse()
                .context("GENETICBOT_PROACTIVE_INTERVAL must be a number of seconds")?;
            config.proactive_interval = Duration::from_secs(secs.max(1));
        }

        config.voice_url = std::env::var("GENETICBOT_VOICE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        config.voice_timeout = std::env::var("GENETICBOT_VOICE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.voice_timeout);

        if let Ok(seed) = std::env::var("GENETICBOT_SEED") {
            config.seed = Some(seed.parse().context("GENETICBOT_SEED must be an unsigned integer")?);
        }

        Ok(config)
    }

    /// Defaults rooted at `data_dir`
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            memory_path: data_dir.join("memory.json"),
            log_path: data_dir.join("conversations.json"),
            proactive_interval: Duration::from_secs(60),
            voice_url: None,
            voice_timeout: Duration::from_secs(10),
            seed: None,
        }
    }
}

/// Platform local data directory (e.g. `~/.local/share/geneticbot`), or `./geneticbot`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geneticbot")
}

/// Log filter from `RUST_LOG`-style directives; missing or invalid means `info`
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
