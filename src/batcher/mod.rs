//! Message-thread batcher.
//!
//! Inbound texts arrive in bursts. Each message is stored for display right away,
//! but the decision pipeline runs once per thread on the combined transcript,
//! anchored on the last buffered message's interaction.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, NbaError, Stage, StageExt};
use crate::model::{BufferedMessage, Channel, Direction, InteractionStatus, NewInteraction};
use crate::pipeline::ProcessOutcome;
use crate::store::Store;

pub mod policy;
pub mod scheduler;

pub use policy::{scan_for_urgency, FlushDecision, FlushPolicy, FlushTrigger};

/// The narrow slice of the pipeline the batcher depends on.
#[async_trait::async_trait]
pub trait ThreadProcessor: Send + Sync {
    async fn process_thread(
        &self,
        anchor_interaction_id: Uuid,
        transcript: String,
    ) -> Result<ProcessOutcome, NbaError>;
}

/// Result of buffering one message.
#[derive(Debug, Clone, Serialize)]
pub struct Received {
    pub interaction_id: Uuid,
    pub buffer_id: Uuid,
    pub lead_id: Uuid,
    pub is_urgent: bool,
    /// Set when this message caused the thread to flush.
    pub flushed: Option<ProcessOutcome>,
}

pub struct Batcher {
    store: Arc<dyn Store>,
    processor: Arc<dyn ThreadProcessor>,
    policy: FlushPolicy,
    /// Leads with a live re-check task.
    watching: Mutex<HashSet<Uuid>>,
}

impl Batcher {
    pub fn new(
        store: Arc<dyn Store>,
        processor: Arc<dyn ThreadProcessor>,
        policy: FlushPolicy,
    ) -> Self {
        Self {
            store,
            processor,
            policy,
            watching: Mutex::new(HashSet::new()),
        }
    }

    /// Stores one message (display interaction + buffer row) and flushes the
    /// thread at once if the message is urgent or the size cap is reached.
    pub async fn receive(
        &self,
        lead_id: Uuid,
        direction: Direction,
        body: &str,
        sender: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Received, NbaError> {
        if body.trim().is_empty() {
            return Err(NbaError::invalid(Stage::RecordInteraction, "message body is empty").for_lead(lead_id));
        }
        self.store
            .lead(lead_id)
            .at(Stage::LoadLead, lead_id)?
            .ok_or_else(|| NbaError::not_found(Stage::LoadLead, lead_id, "lead"))?;

        let interaction = self
            .store
            .insert_interaction(
                NewInteraction::new(Channel::Sms, direction, InteractionStatus::Completed)
                    .transcript(body)
                    .at(now)
                    .into_interaction(lead_id, now),
            )
            .at(Stage::RecordInteraction, lead_id)?;

        let is_urgent = direction == Direction::Inbound && scan_for_urgency(body);
        let message = BufferedMessage {
            id: Uuid::new_v4(),
            lead_id,
            direction,
            body: body.to_string(),
            sender,
            received_at: now,
            is_urgent,
            flushed: false,
            interaction_id: Some(interaction.id),
        };
        let buffer_id = message.id;
        self.store
            .insert_buffered(message)
            .at(Stage::Flush, lead_id)?;
        debug!(target: "batcher", lead_id = %lead_id, urgent = is_urgent, "message buffered");

        let flushed = if is_urgent {
            self.flush(lead_id, FlushTrigger::Urgent).await?
        } else {
            match self.check_thread(lead_id, now).await? {
                CheckOutcome::Flushed(out) => out,
                _ => None,
            }
        };
        self.report_pending();

        Ok(Received {
            interaction_id: interaction.id,
            buffer_id,
            lead_id,
            is_urgent,
            flushed,
        })
    }

    /// Evaluates the flush policy for one lead and flushes if it says so.
    pub async fn check_thread(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CheckOutcome, NbaError> {
        let pending = self
            .store
            .pending_summary(lead_id)
            .at(Stage::Flush, lead_id)?;
        match self.policy.decide(pending, now) {
            FlushDecision::Flush(trigger) => {
                Ok(CheckOutcome::Flushed(self.flush(lead_id, trigger).await?))
            }
            FlushDecision::Wait { recheck_at } => Ok(CheckOutcome::Waiting { recheck_at }),
            FlushDecision::Empty => Ok(CheckOutcome::Empty),
        }
    }

    /// Drains the lead's unflushed messages and processes them as one thread.
    /// `None` when another flush already took them.
    pub async fn flush(
        &self,
        lead_id: Uuid,
        trigger: FlushTrigger,
    ) -> Result<Option<ProcessOutcome>, NbaError> {
        let messages = self
            .store
            .take_unflushed(lead_id)
            .at(Stage::Flush, lead_id)?;
        let Some(last) = messages.last() else {
            return Ok(None);
        };
        let anchor = last.interaction_id.ok_or_else(|| {
            NbaError::new(
                ErrorKind::InvalidInput,
                Stage::Flush,
                "buffered message has no interaction",
            )
            .for_lead(lead_id)
        })?;

        let transcript = thread_transcript(&messages);
        counter!("batcher_flushes_total", "trigger" => trigger.as_str()).increment(1);
        info!(
            target: "batcher",
            lead_id = %lead_id,
            messages = messages.len(),
            anchor = %anchor,
            trigger = trigger.as_str(),
            "flushing thread"
        );

        let out = self
            .processor
            .process_thread(anchor, transcript)
            .await
            .map_err(|e| e.or_lead(lead_id))?;
        self.report_pending();
        Ok(Some(out))
    }

    /// Flushes every thread holding a message older than the accumulation cap.
    /// Failures are logged and do not stop the sweep. Returns how many flushed.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<usize, NbaError> {
        let cutoff = self.policy.stale_cutoff(now);
        let leads = self
            .store
            .leads_with_stale_messages(cutoff)
            .map_err(|e| NbaError::new(ErrorKind::Store, Stage::Flush, e.to_string()))?;

        let mut flushed = 0;
        for lead_id in leads {
            match self.flush(lead_id, FlushTrigger::Stale).await {
                Ok(Some(_)) => flushed += 1,
                Ok(None) => {}
                Err(e) => warn!(target: "batcher", lead_id = %lead_id, error = %e, "stale flush failed"),
            }
        }
        if flushed > 0 {
            info!(target: "batcher", flushed, "stale sweep");
        }
        Ok(flushed)
    }

    fn report_pending(&self) {
        if let Ok(n) = self.store.leads_with_pending_messages() {
            gauge!("batcher_pending_threads").set(n as f64);
        }
    }

    /// Registers a re-check watcher; false when one is already running.
    fn watch(&self, lead_id: Uuid) -> bool {
        match self.watching.lock() {
            Ok(mut set) => set.insert(lead_id),
            Err(poisoned) => poisoned.into_inner().insert(lead_id),
        }
    }

    /// Drops the watcher only if nothing is pending. The check runs under the
    /// same lock `watch` takes, so a message buffered before its `watch` call
    /// is either seen here or gets a fresh watcher.
    fn release_if_idle(&self, lead_id: Uuid) -> bool {
        let mut set = match self.watching.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        match self.store.pending_summary(lead_id) {
            Ok(Some(_)) => false,
            _ => {
                set.remove(&lead_id);
                true
            }
        }
    }

    fn unwatch(&self, lead_id: Uuid) {
        match self.watching.lock() {
            Ok(mut set) => set.remove(&lead_id),
            Err(poisoned) => poisoned.into_inner().remove(&lead_id),
        };
    }
}

#[derive(Debug, Clone)]
pub enum CheckOutcome {
    Flushed(Option<ProcessOutcome>),
    Waiting { recheck_at: DateTime<Utc> },
    Empty,
}

/// `[YYYY-MM-DD HH:MM:SS | Customer] body` per message, arrival order.
pub fn thread_transcript(messages: &[BufferedMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let who = match m.direction {
                Direction::Inbound => "Customer",
                Direction::Outbound => "Academy",
            };
            format!(
                "[{} | {}] {}",
                m.received_at.format("%Y-%m-%d %H:%M:%S"),
                who,
                m.body
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transcript_lines_are_labelled_and_ordered() {
        let at = |s: u32| Utc.with_ymd_and_hms(2025, 3, 4, 18, 30, s).unwrap();
        let msg = |d: Direction, body: &str, s: u32| BufferedMessage {
            id: Uuid::new_v4(),
            lead_id: Uuid::nil(),
            direction: d,
            body: body.to_string(),
            sender: None,
            received_at: at(s),
            is_urgent: false,
            flushed: false,
            interaction_id: None,
        };
        let t = thread_transcript(&[
            msg(Direction::Inbound, "hi", 1),
            msg(Direction::Outbound, "hello!", 9),
        ]);
        assert_eq!(
            t,
            "[2025-03-04 18:30:01 | Customer] hi\n[2025-03-04 18:30:09 | Academy] hello!"
        );
    }
}
