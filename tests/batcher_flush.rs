// tests/batcher_flush.rs
//
// Message-thread batching against a real pipeline:
// - non-urgent messages wait, then flush once the quiet period passes
// - urgent inbound text flushes immediately; outbound text never counts as urgent
// - the size cap flushes on the sixth message
// - the stale sweep picks up forgotten threads
// - a thread drains once, anchored on its last message
// - the background re-check and sweep tasks flush without a caller

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lead_nba_engine::batcher::{CheckOutcome, FlushTrigger};
use lead_nba_engine::error::ErrorKind;
use lead_nba_engine::model::{Direction, NewLead};
use lead_nba_engine::rl::LearningParams;
use lead_nba_engine::signals::MockExtractor;
use lead_nba_engine::{
    Batcher, FlushPolicy, MemoryStore, NbaError, Pipeline, ProcessOutcome, Stage, Store,
    ThreadProcessor,
};
use uuid::Uuid;

/// Delegates to the pipeline and keeps what it was asked to process.
/// `delay` stands in for a slow extractor.
struct Recording {
    inner: Pipeline,
    seen: Mutex<Vec<(Uuid, String)>>,
    delay: StdDuration,
}

#[async_trait::async_trait]
impl ThreadProcessor for Recording {
    async fn process_thread(
        &self,
        anchor_interaction_id: Uuid,
        transcript: String,
    ) -> Result<ProcessOutcome, NbaError> {
        self.seen
            .lock()
            .expect("recording lock")
            .push((anchor_interaction_id, transcript.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner
            .process_thread(anchor_interaction_id, transcript)
            .await
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    recording: Arc<Recording>,
    batcher: Arc<Batcher>,
    lead_id: Uuid,
}

impl Fixture {
    fn new() -> Self {
        Self::with(FlushPolicy::default(), StdDuration::ZERO)
    }

    fn with(policy: FlushPolicy, delay: StdDuration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let recording = Arc::new(Recording {
            inner: Pipeline::new(
                store.clone(),
                Arc::new(MockExtractor),
                LearningParams::default(),
            ),
            seen: Mutex::new(Vec::new()),
            delay,
        });
        let batcher = Arc::new(Batcher::new(store.clone(), recording.clone(), policy));
        let mut lead = NewLead::named("Morgan");
        lead.phone = Some("555-0123".into());
        let lead_id = store
            .insert_lead(lead.into_lead(Utc::now()))
            .expect("insert lead")
            .id;
        Self {
            store,
            recording,
            batcher,
            lead_id,
        }
    }

    fn processed(&self) -> Vec<(Uuid, String)> {
        self.recording.seen.lock().expect("recording lock").clone()
    }
}

/// Second-scale windows for the background task tests.
fn fast_policy(quiet_secs: i64, max_accumulation_secs: i64) -> FlushPolicy {
    FlushPolicy {
        quiet_period: Duration::seconds(quiet_secs),
        max_accumulation: Duration::seconds(max_accumulation_secs),
        max_messages: 6,
    }
}

fn t(min: i64, sec: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 17, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::minutes(min)
        + Duration::seconds(sec)
}

#[tokio::test]
async fn quiet_thread_flushes_after_the_quiet_period() {
    let f = Fixture::new();
    let first = f
        .batcher
        .receive(f.lead_id, Direction::Inbound, "hey there", None, t(0, 0))
        .await
        .expect("first message");
    let last = f
        .batcher
        .receive(f.lead_id, Direction::Inbound, "is practice on tuesdays?", None, t(1, 0))
        .await
        .expect("second message");
    assert!(first.flushed.is_none());
    assert!(last.flushed.is_none());

    match f.batcher.check_thread(f.lead_id, t(5, 59)).await.expect("check") {
        CheckOutcome::Waiting { recheck_at } => assert_eq!(recheck_at, t(6, 0)),
        other => panic!("expected waiting, got {other:?}"),
    }

    let out = match f.batcher.check_thread(f.lead_id, t(6, 0)).await.expect("check") {
        CheckOutcome::Flushed(Some(out)) => out,
        other => panic!("expected flush, got {other:?}"),
    };
    assert_eq!(out.interaction_id, last.interaction_id);

    let seen = f.processed();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, last.interaction_id);
    assert_eq!(
        seen[0].1,
        "[2025-05-20 17:00:00 | Customer] hey there\n[2025-05-20 17:01:00 | Customer] is practice on tuesdays?"
    );

    assert!(matches!(
        f.batcher.check_thread(f.lead_id, t(7, 0)).await.expect("check"),
        CheckOutcome::Empty
    ));
}

#[tokio::test]
async fn urgent_inbound_flushes_at_once() {
    let f = Fixture::new();
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "thanks for the call", None, t(0, 0))
        .await
        .expect("buffered");
    let urgent = f
        .batcher
        .receive(f.lead_id, Direction::Inbound, "Please STOP texting me", None, t(0, 20))
        .await
        .expect("urgent");
    assert!(urgent.is_urgent);
    let out = urgent.flushed.expect("flushed on arrival");
    assert_eq!(out.decision.interaction_id, Some(urgent.interaction_id));
    assert_eq!(f.processed().len(), 1);
    assert!(f
        .store
        .pending_summary(f.lead_id)
        .expect("summary")
        .is_none());
}

#[tokio::test]
async fn outbound_text_is_never_urgent() {
    let f = Fixture::new();
    let r = f
        .batcher
        .receive(
            f.lead_id,
            Direction::Outbound,
            "Want to book a tour this week?",
            Some("coach".into()),
            t(0, 0),
        )
        .await
        .expect("outbound");
    assert!(!r.is_urgent);
    assert!(r.flushed.is_none());
    assert!(f.processed().is_empty());
}

#[tokio::test]
async fn sixth_message_hits_the_size_cap() {
    let f = Fixture::new();
    for i in 0..5 {
        let r = f
            .batcher
            .receive(f.lead_id, Direction::Inbound, &format!("msg {i}"), None, t(0, i))
            .await
            .expect("buffered");
        assert!(r.flushed.is_none(), "message {i} should wait");
    }
    let sixth = f
        .batcher
        .receive(f.lead_id, Direction::Inbound, "msg 5", None, t(0, 5))
        .await
        .expect("sixth");
    assert!(sixth.flushed.is_some());

    let seen = f.processed();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1.lines().count(), 6);
}

#[tokio::test]
async fn sweep_flushes_stale_threads_once() {
    let f = Fixture::new();
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "hello?", None, t(0, 0))
        .await
        .expect("buffered");

    assert_eq!(f.batcher.sweep_stale(t(14, 59)).await.expect("sweep"), 0);
    assert_eq!(f.batcher.sweep_stale(t(15, 0)).await.expect("sweep"), 1);
    assert_eq!(f.batcher.sweep_stale(t(30, 0)).await.expect("sweep"), 0);
    assert_eq!(f.processed().len(), 1);
}

#[tokio::test]
async fn second_flush_finds_nothing() {
    let f = Fixture::new();
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "one", None, t(0, 0))
        .await
        .expect("buffered");
    let first = f
        .batcher
        .flush(f.lead_id, FlushTrigger::Manual)
        .await
        .expect("flush");
    let second = f
        .batcher
        .flush(f.lead_id, FlushTrigger::Manual)
        .await
        .expect("flush again");
    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(
        f.store.buffered_for_lead(f.lead_id).expect("buffer").len(),
        1,
        "rows are kept, only marked flushed"
    );
}

#[tokio::test]
async fn unknown_lead_is_rejected_before_buffering() {
    let f = Fixture::new();
    let err = f
        .batcher
        .receive(Uuid::new_v4(), Direction::Inbound, "hi", None, t(0, 0))
        .await
        .expect_err("unknown lead");
    assert!(err.is_not_found());
    assert_eq!(f.store.leads_with_pending_messages().expect("count"), 0);
}

#[tokio::test]
async fn steady_trickle_waits_for_quiet_after_the_last_message() {
    let f = Fixture::new();
    for min in 0..4 {
        let r = f
            .batcher
            .receive(f.lead_id, Direction::Inbound, &format!("msg {min}"), None, t(min, 0))
            .await
            .expect("buffered");
        assert!(r.flushed.is_none(), "message at minute {min} flushed");
    }
    for now in [t(4, 0), t(5, 0), t(7, 59)] {
        match f.batcher.check_thread(f.lead_id, now).await.expect("check") {
            CheckOutcome::Waiting { recheck_at } => assert_eq!(recheck_at, t(8, 0)),
            other => panic!("expected waiting at {now}, got {other:?}"),
        }
    }
    assert!(f.processed().is_empty());

    assert!(matches!(
        f.batcher.check_thread(f.lead_id, t(8, 0)).await.expect("check"),
        CheckOutcome::Flushed(Some(_))
    ));
    let seen = f.processed();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1.lines().count(), 4);
}

#[tokio::test]
async fn recheck_task_flushes_after_quiet_period_and_releases_the_lead() {
    let f = Fixture::with(fast_policy(1, 60), StdDuration::ZERO);
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "hi, quick question", None, Utc::now())
        .await
        .expect("buffered");

    let handle = f.batcher.spawn_recheck(f.lead_id).expect("first watcher");
    assert!(f.batcher.spawn_recheck(f.lead_id).is_none(), "one watcher per lead");

    tokio::time::timeout(StdDuration::from_secs(10), handle)
        .await
        .expect("watcher finished")
        .expect("watcher did not panic");
    assert_eq!(f.processed().len(), 1);
    assert!(f
        .store
        .pending_summary(f.lead_id)
        .expect("summary")
        .is_none());

    // released: a later arrival gets a watcher of its own
    let again = f.batcher.spawn_recheck(f.lead_id).expect("watcher after release");
    tokio::time::timeout(StdDuration::from_secs(5), again)
        .await
        .expect("idle watcher exits")
        .expect("watcher did not panic");
}

#[tokio::test]
async fn message_arriving_mid_flush_is_picked_up_by_the_running_watcher() {
    let f = Fixture::with(fast_policy(1, 60), StdDuration::from_secs(2));
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "first", None, Utc::now())
        .await
        .expect("first");
    let handle = f.batcher.spawn_recheck(f.lead_id).expect("watcher");

    // the watcher flushes at ~1s and stays inside the slow processor until ~3s
    tokio::time::sleep(StdDuration::from_secs(2)).await;
    assert_eq!(f.processed().len(), 1, "first flush is in flight");
    f.batcher
        .receive(f.lead_id, Direction::Inbound, "second", None, Utc::now())
        .await
        .expect("second");
    assert!(f.batcher.spawn_recheck(f.lead_id).is_none());

    tokio::time::timeout(StdDuration::from_secs(10), handle)
        .await
        .expect("watcher finished")
        .expect("watcher did not panic");
    assert!(f
        .store
        .pending_summary(f.lead_id)
        .expect("summary")
        .is_none());
    let seen = f.processed();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].1.ends_with("] second"));
}

#[tokio::test]
async fn sweep_task_flushes_overdue_threads() {
    let f = Fixture::with(fast_policy(1, 2), StdDuration::ZERO);
    f.batcher
        .receive(
            f.lead_id,
            Direction::Inbound,
            "anyone there?",
            None,
            Utc::now() - Duration::seconds(30),
        )
        .await
        .expect("buffered");
    assert!(f.processed().is_empty(), "receive itself never sweeps");

    let sweep = f.batcher.spawn_sweep(StdDuration::from_millis(100));
    let drained = tokio::time::timeout(StdDuration::from_secs(5), async {
        while f.processed().is_empty() {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
        }
    })
    .await;
    sweep.abort();
    assert!(drained.is_ok(), "sweep never flushed the thread");
    assert_eq!(f.processed().len(), 1);
}

/// Fails every thread without naming a lead.
struct Failing;

#[async_trait::async_trait]
impl ThreadProcessor for Failing {
    async fn process_thread(
        &self,
        _anchor_interaction_id: Uuid,
        _transcript: String,
    ) -> Result<ProcessOutcome, NbaError> {
        Err(NbaError::new(
            ErrorKind::Store,
            Stage::RecordInteraction,
            "backend unavailable",
        ))
    }
}

#[tokio::test]
async fn processing_errors_name_the_flushed_lead() {
    let f = Fixture::new();
    let batcher = Batcher::new(f.store.clone(), Arc::new(Failing), FlushPolicy::default());
    batcher
        .receive(f.lead_id, Direction::Inbound, "hello", None, t(0, 0))
        .await
        .expect("buffered");
    let err = batcher
        .flush(f.lead_id, FlushTrigger::Manual)
        .await
        .expect_err("processor fails");
    assert_eq!(err.lead_id, Some(f.lead_id));
    assert_eq!(err.kind, ErrorKind::Store);
}

#[tokio::test]
async fn empty_body_is_a_record_error() {
    let f = Fixture::new();
    let err = f
        .batcher
        .receive(f.lead_id, Direction::Inbound, "  ", None, t(0, 0))
        .await
        .expect_err("empty body");
    assert_eq!(err.stage, Stage::RecordInteraction);
    assert_eq!(err.lead_id, Some(f.lead_id));
}
