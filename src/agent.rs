//! Dialogue Orchestrator
//!
//! Runs one turn per input through an ordered cascade:
//!
//! ```text
//! input ──► command ──► fact learning ──► fact recall ──► history reuse ──► scored reply
//! ```
//!
//! The first stage that matches speaks, logs the exchange, persists the state
//! and ends the turn. Each turn (and each proactive tick) holds the state lock
//! from start to finish, since fitness updates and scorer mutation are
//! read-modify-write on shared arrays.

use chrono::{DateTime, FixedOffset, Local};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::facts::{self, Extracted};
use crate::gate::{BehaviorGate, GateDecision};
use crate::history::{self, DEFAULT_THRESHOLD};
use crate::responses::{self, RECALL_INDEX, REUSED_PREFIX};
use crate::scorer::{self, Scorer};
use crate::store::{AgentState, FactValue, InteractionLogEntry, Mode, StateStore};
use crate::voice::Voice;

/// Fitness added to a response each time the scorer picks it
pub const FITNESS_INCREMENT: f64 = 0.03;

/// Default reward for [`Agent::reinforce`]
pub const DEFAULT_REINFORCE_REWARD: f64 = 0.05;

/// Default noise std-dev for [`Agent::mutate_scorer`]
pub const DEFAULT_MUTATION_STRENGTH: f64 = 0.05;

/// Source of "now" for quiet hours and the proactive rate window
pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// Which stage of the cascade handled a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Command,
    Learned,
    Recalled,
    Reused,
    Scored,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Command => "command",
            TurnStage::Learned => "learned",
            TurnStage::Recalled => "recalled",
            TurnStage::Reused => "reused",
            TurnStage::Scored => "scored",
        }
    }
}

/// What happened when the agent tried to say something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The voice collaborator accepted the text
    Voiced,
    /// The voice failed; the text only went to the local log
    Fallback,
    /// Muted, nothing was said
    Muted,
    /// Proactive speech refused by the gate
    Suppressed(GateDecision),
}

/// Outcome of one processed input
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub stage: TurnStage,
    /// Reply text as spoken (or as it would have been, when muted)
    pub reply: String,
    /// Response index written to the interaction log
    pub response_index: Option<usize>,
    pub delivery: Delivery,
}

struct Inner {
    state: AgentState,
    scorer: Scorer,
    gate: BehaviorGate,
    rng: ChaCha8Rng,
}

/// The conversational agent
pub struct Agent {
    inner: Mutex<Inner>,
    store: StateStore,
    voice: Arc<dyn Voice>,
    clock: Clock,
}

impl Agent {
    /// Load state from `store` and get ready to talk.
    ///
    /// `seed` fixes the scorer RNG so fresh weights and mutations are
    /// reproducible; `None` seeds from the OS.
    pub fn new(store: StateStore, voice: Arc<dyn Voice>, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut state = store.load();
        let outputs = responses::response_count();
        let scorer = Scorer::load_or_initialize(state.weights.take(), outputs, &mut rng);
        state.weights = Some(scorer.weights().clone());
        state.ensure_fitness(outputs);
        if let Err(e) = store.save(&state) {
            warn!("Failed to save initial agent state: {}", e);
        }

        let agent = Self {
            inner: Mutex::new(Inner {
                state,
                scorer,
                gate: BehaviorGate::new(),
                rng,
            }),
            store,
            voice,
            clock: Arc::new(|| Local::now().fixed_offset()),
        };

        info!("Agent ready (voice: {})", agent.voice.name());
        agent
    }

    /// Replace the wall clock (tests, simulations)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Copy of the current state with the live scorer weights
    pub async fn snapshot(&self) -> AgentState {
        let inner = self.inner.lock().await;
        let mut state = inner.state.clone();
        state.weights = Some(inner.scorer.weights().clone());
        state
    }

    /// Full interaction log
    pub fn history(&self) -> Vec<InteractionLogEntry> {
        self.store.read_log()
    }

    /// Handle one transcribed user message. Empty input is a no-op.
    pub async fn process(&self, input: &str) -> Option<Turn> {
        let user = input.trim();
        if user.is_empty() {
            return None;
        }

        let mut inner = self.inner.lock().await;

        if let Some(turn) = self.handle_command(&mut inner, user).await {
            return Some(turn);
        }
        if let Some(turn) = self.learn_fact(&mut inner, user).await {
            return Some(turn);
        }
        if let Some(turn) = self.recall_fact(&mut inner, user).await {
            return Some(turn);
        }
        if let Some(turn) = self.reuse_history(&mut inner, user).await {
            return Some(turn);
        }
        Some(self.scored_reply(&mut inner, user).await)
    }

    /// One unprompted utterance, if the gate allows it right now
    pub async fn proactive_tick(&self) -> Delivery {
        let mut inner = self.inner.lock().await;

        let reminder = inner
            .state
            .learned_facts
            .iter()
            .find(|(_, value)| **value == FactValue::Present)
            .map(|(key, _)| key.clone());
        let text = responses::proactive_line(inner.state.user_name.as_deref(), reminder.as_deref());

        let delivery = self.speak(&mut inner, &text, true).await;
        debug!("Proactive tick: {:?}", delivery);
        delivery
    }

    /// Add `reward` to a response's fitness. Returns false for an unknown index.
    pub async fn reinforce(&self, index: usize, reward: f64) -> bool {
        let mut inner = self.inner.lock().await;
        if index >= inner.scorer.outputs() {
            warn!("Ignoring reinforcement for unknown response {}", index);
            return false;
        }

        *inner.state.response_fitness.entry(index).or_insert(1.0) += reward;
        debug!("Reinforced response {} by {}", index, reward);
        self.persist(&inner);
        true
    }

    /// Perturb the scorer with unscaled noise of std-dev `strength`, then renormalize
    pub async fn mutate_scorer(&self, strength: f64) {
        let mut inner = self.inner.lock().await;
        let Inner { scorer, rng, .. } = &mut *inner;
        scorer.mutate_with(rng, 1.0, strength);
        self.persist(&inner);
    }

    async fn handle_command(&self, inner: &mut Inner, user: &str) -> Option<Turn> {
        let cmd = user.to_lowercase();

        let reply = if let Some(rest) = cmd.strip_prefix("set mode ") {
            let mode = Mode::from_name(rest)?;
            inner.state.settings.mode = mode;
            info!("Mode set to {}", mode.as_str());
            format!("Mode set to {}", mode.as_str())
        } else if cmd == "mute" || cmd == "pause" {
            inner.state.settings.muted = true;
            info!("Voice muted");
            "Voice disabled.".to_string()
        } else if cmd == "unmute" || cmd == "resume" {
            inner.state.settings.muted = false;
            info!("Voice unmuted");
            "Voice enabled.".to_string()
        } else {
            return None;
        };

        let delivery = self.speak(inner, &reply, false).await;
        Some(self.finish(inner, user, TurnStage::Command, reply, None, delivery))
    }

    async fn learn_fact(&self, inner: &mut Inner, user: &str) -> Option<Turn> {
        let extracted = facts::extract(user)?;
        debug!("Learning '{}'", extracted.key());

        let reply = match extracted {
            Extracted::Identity(name) => {
                let reply = responses::identity_learned(&name);
                info!("Learned user identity");
                inner.state.user_name = Some(name);
                reply
            }
            Extracted::Fact { key, value } => {
                let reply = responses::fact_learned(&key, &value);
                inner.state.learn_fact(&key, value);
                reply
            }
        };

        let delivery = self.speak(inner, &reply, false).await;
        Some(self.finish(inner, user, TurnStage::Learned, reply, None, delivery))
    }

    async fn recall_fact(&self, inner: &mut Inner, user: &str) -> Option<Turn> {
        let lower = user.to_lowercase();
        let reply = inner
            .state
            .learned_facts
            .iter()
            .find(|(key, _)| !key.is_empty() && lower.contains(key.as_str()))
            .map(|(key, value)| responses::fact_recall(key, value))?;

        let delivery = self.speak(inner, &reply, false).await;
        Some(self.finish(inner, user, TurnStage::Recalled, reply, Some(RECALL_INDEX), delivery))
    }

    async fn reuse_history(&self, inner: &mut Inner, user: &str) -> Option<Turn> {
        let log = self.store.read_log();
        let (entry, score) = history::find_similar(user, &log, DEFAULT_THRESHOLD)?;
        debug!("Reusing earlier answer (similarity {:.2})", score);

        let previous = entry
            .bot_text
            .strip_prefix(REUSED_PREFIX)
            .unwrap_or(&entry.bot_text)
            .to_string();
        let response_index = entry.response_index;

        let reply = responses::reused(&previous);
        let delivery = self.speak(inner, &reply, false).await;

        self.log_turn(user, &format!("{}{}", REUSED_PREFIX, previous), response_index);
        self.persist(inner);
        debug!("Turn handled: {}", TurnStage::Reused.as_str());

        Some(Turn {
            stage: TurnStage::Reused,
            reply,
            response_index,
            delivery,
        })
    }

    async fn scored_reply(&self, inner: &mut Inner, user: &str) -> Turn {
        let scores = inner.scorer.forward(scorer::features(user));
        let combined: Vec<f64> = scores
            .iter()
            .enumerate()
            .map(|(i, score)| score * inner.state.fitness(i))
            .collect();
        let choice = scorer::argmax(&combined).unwrap_or(0);

        let reply = responses::canned(choice, inner.state.personality)
            .unwrap_or_else(|| responses::RESPONSES[0].to_string());
        let delivery = self.speak(inner, &reply, false).await;

        *inner.state.response_fitness.entry(choice).or_insert(1.0) += FITNESS_INCREMENT;
        self.log_turn(user, &reply, Some(choice));

        let reward = scorer::reward_scale(user);
        let Inner { scorer, rng, .. } = &mut *inner;
        scorer.mutate(rng, reward);

        self.persist(inner);
        debug!("Turn handled: scored (response {})", choice);

        Turn {
            stage: TurnStage::Scored,
            reply,
            response_index: Some(choice),
            delivery,
        }
    }

    /// Deliver `text`, honoring mute and (for proactive speech) the gate.
    /// Voice failures fall back to the local log and never propagate.
    async fn speak(&self, inner: &mut Inner, text: &str, proactive: bool) -> Delivery {
        if inner.state.settings.muted {
            debug!("Muted, not speaking");
            return Delivery::Muted;
        }

        if proactive {
            let now = (self.clock)();
            let decision = inner.gate.check(&inner.state.settings, &now);
            if !decision.is_allowed() {
                debug!("Proactive speech suppressed: {}", decision.as_str());
                return Delivery::Suppressed(decision);
            }
            inner.gate.record(&now);
        }

        match self.voice.speak(text).await {
            Ok(()) => Delivery::Voiced,
            Err(e) => {
                warn!("Voice '{}' failed: {}", self.voice.name(), e);
                info!("SPEAK: {}", text);
                Delivery::Fallback
            }
        }
    }

    fn finish(
        &self,
        inner: &Inner,
        user: &str,
        stage: TurnStage,
        reply: String,
        response_index: Option<usize>,
        delivery: Delivery,
    ) -> Turn {
        self.log_turn(user, &reply, response_index);
        self.persist(inner);
        debug!("Turn handled: {}", stage.as_str());

        Turn {
            stage,
            reply,
            response_index,
            delivery,
        }
    }

    fn log_turn(&self, user: &str, bot: &str, response_index: Option<usize>) {
        if let Err(e) = self
            .store
            .append_log(InteractionLogEntry::new(user, bot, response_index))
        {
            warn!("Failed to append interaction log: {}", e);
        }
    }

    fn persist(&self, inner: &Inner) {
        let mut state = inner.state.clone();
        state.weights = Some(inner.scorer.weights().clone());
        if let Err(e) = self.store.save(&state) {
            warn!("Failed to save agent state: {}", e);
        }
    }
}
