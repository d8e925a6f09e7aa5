// src/batcher/policy.rs
//! When a buffered thread should be processed.
//!
//! A thread flushes on the first of: an urgent message, the size cap, the
//! accumulation cap (oldest message age), or the quiet period (newest message age).

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::BatchingConfig;
use crate::store::PendingSummary;

static URGENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // opt-out
        r"(?i)\b(stop|unsubscribe|opt.?out|remove me|do not (contact|text|call))\b",
        // ready to commit
        r"(?i)\b(sign.?up|enroll|register|i('?m| am) in|let('?s| us) do it|ready to start)\b",
        // scheduling
        r"(?i)\b(schedule|book|appointment|visit|come (by|in|over)|tour)\b",
        r"(?i)\b(emergency|urgent|asap|right now|immediately)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// True when the body should bypass batching.
pub fn scan_for_urgency(body: &str) -> bool {
    URGENT_PATTERNS.iter().any(|re| re.is_match(body))
}

/// Why a thread was flushed; also the `trigger` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Urgent,
    MaxMessages,
    MaxAccumulation,
    QuietPeriod,
    Stale,
    Manual,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Urgent => "urgent",
            FlushTrigger::MaxMessages => "max_messages",
            FlushTrigger::MaxAccumulation => "max_accumulation",
            FlushTrigger::QuietPeriod => "quiet_period",
            FlushTrigger::Stale => "stale",
            FlushTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    Flush(FlushTrigger),
    /// Re-check no later than this instant.
    Wait { recheck_at: DateTime<Utc> },
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub quiet_period: Duration,
    pub max_accumulation: Duration,
    pub max_messages: usize,
}

impl From<&BatchingConfig> for FlushPolicy {
    fn from(cfg: &BatchingConfig) -> Self {
        Self {
            quiet_period: cfg.quiet_period(),
            max_accumulation: cfg.max_accumulation(),
            max_messages: cfg.max_buffered_messages,
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from(&BatchingConfig::default())
    }
}

impl FlushPolicy {
    pub fn decide(&self, pending: Option<PendingSummary>, now: DateTime<Utc>) -> FlushDecision {
        let Some(p) = pending else {
            return FlushDecision::Empty;
        };
        if p.count >= self.max_messages {
            return FlushDecision::Flush(FlushTrigger::MaxMessages);
        }
        if now - p.oldest >= self.max_accumulation {
            return FlushDecision::Flush(FlushTrigger::MaxAccumulation);
        }
        if now - p.newest >= self.quiet_period {
            return FlushDecision::Flush(FlushTrigger::QuietPeriod);
        }
        let recheck_at = (p.newest + self.quiet_period).min(p.oldest + self.max_accumulation);
        FlushDecision::Wait { recheck_at }
    }

    /// Messages received at or before this are overdue regardless of activity.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_accumulation
    }
}
