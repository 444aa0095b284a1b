//! Genetic
//!
//! A small conversational agent that learns facts, reuses past answers and
//! picks among canned replies with a self-mutating scorer.
//!
//! # Features
//!
//! - **Fact Memory**: "remember x: y", "my x is y", "I am ..." parsing and recall
//! - **History Reuse**: token-overlap lookup of earlier answers
//! - **Scored Replies**: two-layer perceptron weighted by per-response fitness
//! - **Weight Drift**: Gaussian perturbation + renormalization after every scored turn
//! - **Behavior Gate**: mute, quiet hours and an hourly limit on proactive speech
//! - **Persistence**: JSON state document plus an append-only interaction log
//!
//! # Architecture
//!
//! ```text
//! transcribed text ──► Agent::process ──► Command / Facts / History / Scorer
//!                            │                         │
//!                            │                         └── BehaviorGate (proactive)
//!                            ├── StateStore (memory.json + conversations.json)
//!                            └── Voice (console / webhook)
//! ```

pub mod agent;
pub mod config;
pub mod facts;
pub mod gate;
pub mod history;
pub mod proactive;
pub mod responses;
pub mod scorer;
pub mod store;
pub mod voice;

pub use agent::{Agent, Clock, Delivery, Turn, TurnStage};
pub use config::Config;
pub use facts::Extracted;
pub use gate::{BehaviorGate, GateDecision};
pub use proactive::{ProactiveLoop, ProactiveStats};
pub use scorer::{Scorer, ScorerWeights};
pub use store::{AgentState, FactValue, InteractionLogEntry, Mode, Personality, Settings, StateStore, StoreError};
pub use voice::{ConsoleVoice, RecordingVoice, SilentVoice, Voice, VoiceError, WebhookVoice};
