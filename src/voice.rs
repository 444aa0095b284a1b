//! Voice Delivery
//!
//! The speech side of the agent is an external collaborator. The agent only
//! needs `speak(text)`; failures are reported here and swallowed by the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Delivery errors
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Voice endpoint returned {0}")]
    Status(u16),
    #[error("Voice unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can deliver a reply to the user
#[async_trait]
pub trait Voice: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn speak(&self, text: &str) -> Result<(), VoiceError>;
}

/// Prints replies to stdout
#[derive(Debug, Default)]
pub struct ConsoleVoice;

#[async_trait]
impl Voice for ConsoleVoice {
    fn name(&self) -> &str {
        "console"
    }

    async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        println!("Genetic: {}", text);
        Ok(())
    }
}

/// Accepts and discards; callers read the reply from the returned turn instead
#[derive(Debug, Default)]
pub struct SilentVoice;

#[async_trait]
impl Voice for SilentVoice {
    fn name(&self) -> &str {
        "silent"
    }

    async fn speak(&self, _text: &str) -> Result<(), VoiceError> {
        Ok(())
    }
}

/// Keeps every delivered line in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingVoice {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines delivered so far
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Voice for RecordingVoice {
    fn name(&self) -> &str {
        "recording"
    }

    async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let mut lines = self
            .spoken
            .lock()
            .map_err(|e| VoiceError::Unavailable(format!("Lock error: {}", e)))?;
        lines.push(text.to_string());
        Ok(())
    }
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Posts replies to a text-to-speech webhook as `{"text": ...}`
pub struct WebhookVoice {
    url: String,
    client: reqwest::Client,
}

impl WebhookVoice {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Voice for WebhookVoice {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn speak(&self, text: &str) -> Result<(), VoiceError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SpeakRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::Status(response.status().as_u16()));
        }

        debug!("Voice webhook accepted {} chars", text.len());
        Ok(())
    }
}
