use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use shuttle_axum::axum::{routing::get, Router};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_runs_total",
            "Articles that reached a terminal state, by outcome."
        );
        describe_counter!(
            "pipeline_duplicates_total",
            "Articles stopped at the dedup check."
        );
        describe_counter!("judgment_calls_total", "External judgment calls, by stage.");
        describe_counter!(
            "judgment_retries_total",
            "Judgment calls retried after a transient failure."
        );
        describe_counter!(
            "judgment_failures_total",
            "Judgment calls that surfaced a failure, by kind."
        );
        describe_histogram!("judgment_call_ms", "Judgment call latency in milliseconds.");
        describe_counter!("persist_total", "Persistence attempts, by result.");
        describe_counter!("ingest_events_total", "Items parsed from feeds.");
        describe_counter!("ingest_kept_total", "Items handed to the pipeline.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!(
            "ingest_filtered_total",
            "Items dropped by age/photo/empty filters."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Feed fetch/parse errors."
        );
        describe_counter!("curator_cycles_total", "Scheduled curation cycles run.");
        describe_gauge!("curator_last_run_ts", "Unix ts when the curation cycle last ran.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
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
