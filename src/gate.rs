//! Behavior Gate
//!
//! Decides whether the agent may speak unprompted: mode, mute, quiet hours
//! and a sliding one-hour rate limit over successful proactive utterances.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use tracing::debug;

use crate::store::{Mode, Settings};

/// Sliding window for the proactive rate limit
pub const RATE_WINDOW_SECS: i64 = 3600;

/// True when `hour` falls in the quiet window `(start, end)`.
///
/// `start < end` is the half-open range `[start, end)`. Otherwise the window
/// wraps midnight and covers `hour >= start || hour < end`.
pub fn in_quiet_hours(quiet_hours: (u32, u32), hour: u32) -> bool {
    let (start, end) = quiet_hours;
    if start < end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Why a proactive utterance was or wasn't allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    NotProactive,
    Muted,
    QuietHours,
    RateLimited,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Allowed => "allowed",
            GateDecision::NotProactive => "mode is not proactive",
            GateDecision::Muted => "muted",
            GateDecision::QuietHours => "quiet hours",
            GateDecision::RateLimited => "hourly limit reached",
        }
    }
}

/// Rolling record of recent proactive utterances
#[derive(Debug, Default)]
pub struct BehaviorGate {
    recent: Vec<DateTime<Utc>>,
}

impl BehaviorGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Proactive utterances still inside the window as of the last check
    pub fn recent_count(&self) -> usize {
        self.recent.len()
    }

    /// Evaluate the gate at `now`. Quiet hours use `now`'s own clock hour.
    ///
    /// Prunes timestamps older than the window as a side effect.
    pub fn check<Tz: TimeZone>(&mut self, settings: &Settings, now: &DateTime<Tz>) -> GateDecision {
        if settings.mode != Mode::Proactive {
            return GateDecision::NotProactive;
        }
        if settings.muted {
            return GateDecision::Muted;
        }
        if in_quiet_hours(settings.quiet_hours, now.hour()) {
            return GateDecision::QuietHours;
        }

        let cutoff = now.with_timezone(&Utc) - Duration::seconds(RATE_WINDOW_SECS);
        self.recent.retain(|&t| t > cutoff);

        if self.recent.len() < settings.rate_limit_per_hour as usize {
            GateDecision::Allowed
        } else {
            debug!(
                "Proactive speech rate limited ({} in the last hour)",
                self.recent.len()
            );
            GateDecision::RateLimited
        }
    }

    pub fn can_speak_proactively<Tz: TimeZone>(&mut self, settings: &Settings, now: &DateTime<Tz>) -> bool {
        self.check(settings, now).is_allowed()
    }

    /// Count a successful proactive utterance
    pub fn record<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) {
        self.recent.push(now.with_timezone(&Utc));
    }
}
