// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::runtime::CuratorRuntime;

/// Spawn the background loop: ingest, then run the batch, every `interval`.
/// The first cycle starts immediately. A slow cycle delays the next tick
/// instead of stacking runs.
pub fn spawn_scheduler(runtime: Arc<CuratorRuntime>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = runtime.run_cycle().await;
            counter!("curator_cycles_total").increment(1);

            tracing::info!(
                target: "ingest",
                kept = report.batch.records.len(),
                stored = report.batch.stored,
                discarded = report.batch.discarded,
                duplicates = report.batch.duplicates,
                failed = report.batch.failed,
                "curation tick"
            );
        }
    })
}
