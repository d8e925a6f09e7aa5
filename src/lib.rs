// src/lib.rs
// Public library surface for the binary and the integration tests.

pub mod api;
pub mod batcher;
pub mod brief;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod rl;
pub mod signals;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::batcher::{Batcher, FlushPolicy, ThreadProcessor};
pub use crate::config::NbaConfig;
pub use crate::error::{NbaError, Stage};
pub use crate::pipeline::{Pipeline, ProcessOutcome};
pub use crate::store::{MemoryStore, Store};

use std::sync::Arc;

/// Wires store, extractor, pipeline and batcher from config. The caller owns
/// background tasks (sweep) and the listener.
pub fn build_state(cfg: &NbaConfig, store: Arc<dyn Store>) -> AppState {
    let extractor = signals::build_extractor(&cfg.extractor);
    let pipeline = Arc::new(Pipeline::new(store.clone(), extractor, cfg.learning));
    let batcher = Arc::new(Batcher::new(
        store.clone(),
        pipeline.clone(),
        FlushPolicy::from(&cfg.batching),
    ));
    AppState {
        store,
        pipeline,
        batcher,
    }
}
