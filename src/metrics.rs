use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("nba_decisions_total", "Decisions persisted, by action");
        describe_counter!(
            "nba_compliance_overrides_total",
            "Decisions forced to stop by compliance"
        );
        describe_counter!("rl_q_updates_total", "Bellman updates applied");
        describe_counter!("batcher_flushes_total", "Message threads flushed, by trigger");
        describe_counter!(
            "signal_extraction_failures_total",
            "Extractor errors absorbed into a minimal record"
        );
        describe_gauge!("batcher_pending_threads", "Leads with unflushed messages");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
