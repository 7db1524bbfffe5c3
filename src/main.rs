//! News curator service entrypoint.
//! Boots the curation scheduler and serves the ops router (health, metrics, run history).

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use news_curator::api::{self, AppState};
use news_curator::config::{AiConfig, CuratorConfig};
use news_curator::ingest::config::load_feeds_default;
use news_curator::ingest::scheduler::spawn_scheduler;
use news_curator::metrics::Metrics;
use news_curator::runtime::CuratorRuntime;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    news_curator::init_tracing();

    let metrics = Metrics::init()?;

    let cfg = CuratorConfig::load_default().context("loading curator config")?;
    let ai = AiConfig::load_default().context("loading ai config")?;
    let feeds = load_feeds_default().context("loading feeds")?;
    let interval = cfg.interval();

    let runtime = Arc::new(CuratorRuntime::build(cfg, &ai, feeds).await?);
    let history = runtime.history();

    // Background curation loop; runs for the lifetime of the service.
    spawn_scheduler(runtime, interval);

    let router = api::create_router(AppState { history }).merge(metrics.router());

    Ok(router.into())
}
