//! Lead NBA service entrypoint.
//! Boots the Axum HTTP server: config, tracing, metrics, shared state, sweep task.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lead_nba_engine::rl::{seed_q_table, QSeed};
use lead_nba_engine::{build_state, create_router, metrics::Metrics, MemoryStore, NbaConfig, Store};

/// `RUST_LOG` wins; otherwise info for our targets. `NBA_LOG_FORMAT=json` switches
/// to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("nba=info,rl=info,batcher=info,signals=info,api=info,tower_http=info,warn")
    });

    let json = std::env::var("NBA_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = NbaConfig::load()?;
    let metrics = Metrics::init()?;

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    if let Some(path) = &cfg.seed.path {
        let seed = QSeed::load_from_file(path)?;
        seed_q_table(store.as_ref(), &seed, Utc::now()).context("seeding q-table")?;
    }

    let state = build_state(&cfg, store);
    let _sweep = state
        .batcher
        .spawn_sweep(cfg.batching.sweep_interval());

    let app = create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(
        target: "api",
        bind = %cfg.server.bind,
        extractor = %cfg.extractor.provider,
        "lead-nba-engine listening"
    );
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
