//! Agent Integration Tests
//!
//! End-to-end turns through the full cascade against on-disk storage.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone};
use geneticbot::agent::FITNESS_INCREMENT;
use geneticbot::gate::GateDecision;
use geneticbot::responses::{RECALL_INDEX, RESPONSES};
use geneticbot::{
    Agent, Clock, Delivery, FactValue, Mode, RecordingVoice, StateStore, TurnStage, Voice, VoiceError,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> StateStore {
    StateStore::open(
        &dir.path().join("memory.json"),
        &dir.path().join("conversations.json"),
    )
    .expect("Failed to open store")
}

fn create_agent(seed: u64) -> (Agent, RecordingVoice, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let voice = RecordingVoice::new();
    let agent = Agent::new(open_store(&temp_dir), Arc::new(voice.clone()), Some(seed));
    (agent, voice, temp_dir)
}

/// Clock pinned to a settable instant
fn manual_clock(start: DateTime<FixedOffset>) -> (Clock, Arc<Mutex<DateTime<FixedOffset>>>) {
    let now = Arc::new(Mutex::new(start));
    let handle = now.clone();
    let clock: Clock = Arc::new(move || *handle.lock().unwrap());
    (clock, now)
}

fn noon() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
        .unwrap()
}

struct BrokenVoice;

#[async_trait]
impl Voice for BrokenVoice {
    fn name(&self) -> &str {
        "broken"
    }

    async fn speak(&self, _text: &str) -> Result<(), VoiceError> {
        Err(VoiceError::Unavailable("speaker unplugged".to_string()))
    }
}

#[tokio::test]
async fn test_identity_then_scored_reply() {
    let (agent, voice, _temp) = create_agent(42);

    let turn = agent.process("I am Dana").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Learned);
    assert!(turn.reply.contains("Dana"));
    assert_eq!(turn.response_index, None);
    assert_eq!(agent.snapshot().await.user_name.as_deref(), Some("Dana"));

    let turn = agent.process("hello").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Scored);
    let index = turn.response_index.unwrap();
    assert!(index < RESPONSES.len());

    assert_eq!(voice.spoken().len(), 2);
    let log = agent.history();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].response_index, None);
    assert_eq!(log[1].response_index, Some(index));
}

#[tokio::test]
async fn test_scored_reply_reproducible_with_seed() {
    let (first, _, _t1) = create_agent(2024);
    let (second, _, _t2) = create_agent(2024);

    for input in ["I am Dana", "hello", "tell me something surprising"] {
        let a = first.process(input).await.unwrap();
        let b = second.process(input).await.unwrap();
        assert_eq!(a.stage, b.stage);
        assert_eq!(a.reply, b.reply);
        assert_eq!(a.response_index, b.response_index);
    }

    assert_eq!(first.snapshot().await.weights, second.snapshot().await.weights);
}

#[tokio::test]
async fn test_fact_round_trip() {
    let (agent, _, _temp) = create_agent(1);

    let turn = agent.process("remember budget:500").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Learned);
    assert_eq!(turn.reply, "I will remember that budget is 500");

    let turn = agent.process("what is my budget").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Recalled);
    assert_eq!(turn.reply, "budget is 500");
    assert_eq!(turn.response_index, Some(RECALL_INDEX));
}

#[tokio::test]
async fn test_sentinel_fact_recall() {
    let (agent, _, _temp) = create_agent(1);

    agent.process("remember call mom").await.unwrap();
    assert_eq!(
        agent.snapshot().await.learned_facts.get("call mom"),
        Some(&FactValue::Present)
    );

    let turn = agent.process("did you call mom yet").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Recalled);
    assert_eq!(turn.reply, "I remember call mom.");
}

#[tokio::test]
async fn test_fact_keys_case_folded() {
    let (agent, _, _temp) = create_agent(1);

    agent.process("My Favourite Color is Teal").await.unwrap();
    let turn = agent.process("Which FAVOURITE COLOR do I like").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Recalled);
    assert_eq!(turn.reply, "favourite color is Teal");
}

#[tokio::test]
async fn test_recall_prefers_earliest_learned_fact() {
    let (agent, _, _temp) = create_agent(1);

    agent.process("remember zebra: striped").await.unwrap();
    agent.process("remember z: letter").await.unwrap();

    // Both "zebra" and "z" occur in the question
    let turn = agent.process("tell me about the zebra").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Recalled);
    assert_eq!(turn.reply, "zebra is striped");

    // Relearning a key keeps its place
    agent.process("remember zebra: black and white").await.unwrap();
    let turn = agent.process("what about the zebra").await.unwrap();
    assert_eq!(turn.reply, "zebra is black and white");
}

#[tokio::test]
async fn test_reminder_follows_learning_order() {
    let (agent, voice, _temp) = create_agent(1);
    let (clock, _now) = manual_clock(noon());
    let agent = agent.with_clock(clock);

    agent.process("set mode proactive").await.unwrap();
    agent.process("remember water plants").await.unwrap();
    agent.process("remember buy milk").await.unwrap();

    assert_eq!(agent.proactive_tick().await, Delivery::Voiced);
    assert_eq!(voice.spoken().last().unwrap(), "Don't forget: water plants.");
}

#[tokio::test]
async fn test_repeated_question_reuses_answer() {
    let (agent, _, _temp) = create_agent(5);

    let first = agent.process("what is the weather like").await.unwrap();
    assert_eq!(first.stage, TurnStage::Scored);

    let second = agent.process("what is the weather like").await.unwrap();
    assert_eq!(second.stage, TurnStage::Reused);
    assert_eq!(second.reply, format!("As I said earlier: {}", first.reply));
    assert_eq!(second.response_index, first.response_index);

    let log = agent.history();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].bot_text, format!("reused:{}", first.reply));

    // Reusing again does not stack prefixes
    let third = agent.process("What is the weather like?").await.unwrap();
    assert_eq!(third.reply, second.reply);
}

#[tokio::test]
async fn test_fitness_increment_on_scored_turn() {
    let (agent, _, _temp) = create_agent(11);
    let before = agent.snapshot().await.response_fitness;

    let turn = agent.process("tell me something interesting").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Scored);
    let chosen = turn.response_index.unwrap();

    let after = agent.snapshot().await.response_fitness;
    assert!((after[&chosen] - before[&chosen] - FITNESS_INCREMENT).abs() < 1e-12);
    for (index, fitness) in &after {
        if *index != chosen {
            assert_eq!(*fitness, before[index]);
        }
    }
}

#[tokio::test]
async fn test_scored_turn_leaves_unit_norm_weights() {
    let (agent, _, _temp) = create_agent(3);
    agent.process("a reasonably long message to drift the weights").await.unwrap();

    let weights = agent.snapshot().await.weights.unwrap();
    for norm in weights.norms() {
        assert!((norm - 1.0).abs() < 1e-9, "norm was {}", norm);
    }
}

#[tokio::test]
async fn test_non_scored_turns_do_not_mutate() {
    let (agent, _, _temp) = create_agent(3);
    let before = agent.snapshot().await.weights;

    agent.process("remember budget:500").await.unwrap();
    agent.process("budget?").await.unwrap();
    agent.process("mute").await.unwrap();

    assert_eq!(agent.snapshot().await.weights, before);
}

#[tokio::test]
async fn test_voice_failure_does_not_abort_turn() {
    let temp_dir = TempDir::new().unwrap();
    let agent = Agent::new(open_store(&temp_dir), Arc::new(BrokenVoice), Some(1));

    let turn = agent.process("remember budget:500").await.unwrap();
    assert_eq!(turn.delivery, Delivery::Fallback);
    assert_eq!(agent.history().len(), 1);
    assert!(agent.store().load().learned_facts.contains_key("budget"));
}

#[tokio::test]
async fn test_muted_agent_still_learns() {
    let (agent, voice, _temp) = create_agent(1);

    agent.process("pause").await.unwrap();
    let turn = agent.process("remember budget:500").await.unwrap();
    assert_eq!(turn.delivery, Delivery::Muted);
    assert!(voice.spoken().is_empty());
    assert_eq!(agent.history().len(), 2);

    agent.process("unmute").await.unwrap();
    assert_eq!(voice.spoken(), vec!["Voice enabled.".to_string()]);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let (created_at, weights) = {
        let agent = Agent::new(open_store(&temp_dir), Arc::new(RecordingVoice::new()), Some(8));
        agent.process("remember budget:500").await.unwrap();
        agent.process("set mode proactive").await.unwrap();
        agent.process("hello there").await.unwrap();
        let snapshot = agent.snapshot().await;
        (snapshot.meta.created_at, snapshot.weights)
    };

    let agent = Agent::new(open_store(&temp_dir), Arc::new(RecordingVoice::new()), Some(99));
    let snapshot = agent.snapshot().await;
    assert_eq!(snapshot.meta.created_at, created_at);
    assert_eq!(snapshot.weights, weights);
    assert_eq!(snapshot.settings.mode, Mode::Proactive);

    let turn = agent.process("how big is the budget").await.unwrap();
    assert_eq!(turn.reply, "budget is 500");
    assert_eq!(agent.history().len(), 4);
}

#[tokio::test]
async fn test_corrupt_files_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("memory.json"), "{{{{").unwrap();
    std::fs::write(temp_dir.path().join("conversations.json"), "not a log").unwrap();

    let agent = Agent::new(open_store(&temp_dir), Arc::new(RecordingVoice::new()), Some(1));
    let snapshot = agent.snapshot().await;
    assert_eq!(snapshot.name, "Genetic");
    assert_eq!(snapshot.response_fitness.len(), RESPONSES.len());

    let turn = agent.process("hello").await.unwrap();
    assert_eq!(turn.stage, TurnStage::Scored);
    assert_eq!(agent.history().len(), 1);
}

#[tokio::test]
async fn test_mismatched_weights_regenerated() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("memory.json"),
        r#"{"name": "Genetic", "weights": {"w1": [[1.0]], "b1": [1.0], "w2": [[1.0]], "b2": [1.0]}}"#,
    )
    .unwrap();

    let agent = Agent::new(open_store(&temp_dir), Arc::new(RecordingVoice::new()), Some(1));
    let weights = agent.snapshot().await.weights.unwrap();
    assert!(weights.matches_shape(RESPONSES.len()));
    assert!(agent.store().load().weights.unwrap().matches_shape(RESPONSES.len()));
}

#[tokio::test]
async fn test_proactive_rate_limit() {
    let (agent, voice, _temp) = create_agent(1);
    let (clock, now) = manual_clock(noon());
    let agent = agent.with_clock(clock);

    assert_eq!(
        agent.proactive_tick().await,
        Delivery::Suppressed(GateDecision::NotProactive)
    );

    agent.process("set mode proactive").await.unwrap();
    let limit = agent.snapshot().await.settings.rate_limit_per_hour;

    for i in 0..limit {
        *now.lock().unwrap() = noon() + ChronoDuration::minutes(i as i64);
        assert_eq!(agent.proactive_tick().await, Delivery::Voiced);
    }
    assert_eq!(
        agent.proactive_tick().await,
        Delivery::Suppressed(GateDecision::RateLimited)
    );

    // The first utterance ages out, freeing exactly one slot
    *now.lock().unwrap() = noon() + ChronoDuration::minutes(60) + ChronoDuration::seconds(30);
    assert_eq!(agent.proactive_tick().await, Delivery::Voiced);
    assert_eq!(
        agent.proactive_tick().await,
        Delivery::Suppressed(GateDecision::RateLimited)
    );

    // "Mode set to proactive" plus every voiced proactive line
    assert_eq!(voice.spoken().len(), 1 + limit as usize + 1);
}

#[tokio::test]
async fn test_proactive_respects_mute_and_quiet_hours() {
    let (agent, _, _temp) = create_agent(1);
    let (clock, now) = manual_clock(noon());
    let agent = agent.with_clock(clock);

    agent.process("set mode proactive").await.unwrap();
    agent.process("mute").await.unwrap();
    assert_eq!(agent.proactive_tick().await, Delivery::Muted);

    agent.process("unmute").await.unwrap();
    *now.lock().unwrap() = noon() + ChronoDuration::hours(11);
    assert_eq!(
        agent.proactive_tick().await,
        Delivery::Suppressed(GateDecision::QuietHours)
    );
}

#[tokio::test]
async fn test_proactive_line_reminds_sentinel_facts() {
    let (agent, voice, _temp) = create_agent(1);
    let (clock, _now) = manual_clock(noon());
    let agent = agent.with_clock(clock);

    agent.process("set mode proactive").await.unwrap();
    agent.process("remember buy milk").await.unwrap();
    assert_eq!(agent.proactive_tick().await, Delivery::Voiced);
    assert_eq!(voice.spoken().last().unwrap(), "Don't forget: buy milk.");

    // Proactive lines are not interaction log entries
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_turns_are_serialized() {
    let (agent, _, _temp) = create_agent(17);
    let agent = Arc::new(agent);

    let mut handles = Vec::new();
    for i in 0..12 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent.process(&format!("remember item{}:{}", i, i * 10)).await
        }));
    }
    for _ in 0..4 {
        let agent = agent.clone();
        handles.push(tokio::spawn(async move {
            agent.proactive_tick().await;
            None
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(agent.history().len(), 12);
    assert_eq!(agent.store().load().learned_facts.len(), 12);
}
