//! Genetic - Entry Point
//!
//! Reads transcribed lines from stdin and answers them. A background loop
//! tries proactive speech on a fixed interval.

use geneticbot::config::log_filter;
use geneticbot::{Agent, AgentState, Config, ConsoleVoice, ProactiveLoop, StateStore, Voice, WebhookVoice};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let json_logs = args.iter().any(|a| a == "--json-logs");
    let no_proactive = args.iter().any(|a| a == "--no-proactive");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Genetic v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: geneticbot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --json-logs        Log to stderr as JSON");
        println!("  --no-proactive     Disable the proactive speech loop");
        println!("  --help, -h         Show this help");
        println!();
        println!("Type a message per line. /status shows state, /quit exits.");
        println!("Commands: set mode <passive|proactive|restricted>, mute, unmute");
        println!();
        println!("Environment variables:");
        println!("  GENETICBOT_DATA_DIR            State directory");
        println!("  GENETICBOT_MEMORY_FILE         State document path");
        println!("  GENETICBOT_LOG_FILE            Interaction log path");
        println!("  GENETICBOT_PROACTIVE_INTERVAL  Seconds between proactive ticks (default: 60)");
        println!("  GENETICBOT_VOICE_URL           Text-to-speech webhook");
        println!("  GENETICBOT_VOICE_TIMEOUT       Webhook timeout in seconds (default: 10)");
        println!("  GENETICBOT_SEED                Fixed scorer seed");
        return Ok(());
    }

    // Setup logging (RUST_LOG directives, e.g. "geneticbot=debug")
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filter = || log_filter(rust_log.as_deref());

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Genetic v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = StateStore::open(&config.memory_path, &config.log_path)?;

    let voice: Arc<dyn Voice> = match &config.voice_url {
        Some(url) => match WebhookVoice::new(url, config.voice_timeout) {
            Ok(voice) => Arc::new(voice),
            Err(e) => {
                warn!("Voice webhook unusable ({}), using console", e);
                Arc::new(ConsoleVoice)
            }
        },
        None => Arc::new(ConsoleVoice),
    };

    let agent = Arc::new(Agent::new(store, voice, config.seed));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let proactive = if no_proactive {
        None
    } else {
        let task = ProactiveLoop::new(config.proactive_interval);
        Some(tokio::spawn(task.run(agent.clone(), shutdown_rx)))
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match line.trim() {
                        "/quit" | "/exit" => break,
                        "/status" => print_status(&agent.snapshot().await, agent.history().len()),
                        text => {
                            agent.process(text).await;
                        }
                    },
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = proactive {
        let _ = handle.await;
    }

    info!("Goodbye");
    Ok(())
}

fn print_status(state: &AgentState, log_len: usize) {
    let settings = &state.settings;
    println!("Name:        {} ({:?})", state.name, state.personality);
    println!("User:        {}", state.user_name.as_deref().unwrap_or("unknown"));
    println!("Mode:        {}{}", settings.mode.as_str(), if settings.muted { " (muted)" } else { "" });
    println!("Quiet hours: {}:00-{}:00", settings.quiet_hours.0, settings.quiet_hours.1);
    println!("Rate limit:  {}/hour", settings.rate_limit_per_hour);
    println!("Facts:       {}", state.learned_facts.len());
    println!("Exchanges:   {}", log_len);
    println!("Since:       {}", state.meta.created_at.format("%Y-%m-%d %H:%M"));
    let fitness: Vec<String> = state
        .response_fitness
        .iter()
        .map(|(i, f)| format!("{}={:.2}", i, f))
        .collect();
    println!("Fitness:     {}", fitness.join(" "));
}
