//! Proactive Speech Loop
//!
//! Periodically asks the agent to say something unprompted. The agent
//! re-checks mode, mute, quiet hours and the hourly limit on every tick, so
//! commands issued between ticks take effect on the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

use crate::agent::{Agent, Delivery};

/// Counters for the proactive loop
#[derive(Debug, Default)]
pub struct ProactiveStats {
    pub ticks: AtomicU64,
    pub spoken: AtomicU64,
    pub suppressed: AtomicU64,
}

impl ProactiveStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn spoken(&self) -> u64 {
        self.spoken.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// Background task driving [`Agent::proactive_tick`]
pub struct ProactiveLoop {
    period: Duration,
    stats: Arc<ProactiveStats>,
}

impl ProactiveLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            stats: Arc::new(ProactiveStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ProactiveStats> {
        self.stats.clone()
    }

    /// Run a single tick and update the counters
    pub async fn tick_once(&self, agent: &Agent) -> Delivery {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let delivery = agent.proactive_tick().await;
        match delivery {
            Delivery::Voiced | Delivery::Fallback => {
                self.stats.spoken.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Muted | Delivery::Suppressed(_) => {
                self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            }
        }
        delivery
    }

    /// Tick every `period` until `shutdown` turns true
    pub async fn run(self, agent: Arc<Agent>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting proactive loop (every {}s)", self.period.as_secs());
        let mut ticker = interval(self.period);
        // The first tick fires immediately; skip it so we don't talk over startup
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let delivery = self.tick_once(&agent).await;
                    debug!("Proactive loop tick: {:?}", delivery);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Proactive loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}
