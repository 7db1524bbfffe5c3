// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod article;
pub mod config;
pub mod decision;
pub mod dedup;
pub mod error;
pub mod evaluate;
pub mod history;
pub mod ingest;
pub mod judgment;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod runtime;
pub mod score;

// ---- Re-exports for stable public API ----
pub use crate::article::{Article, Fingerprint};
pub use crate::decision::{decide, Decision, DecisionPolicy, Recommendation};
pub use crate::pipeline::{Orchestrator, ProcessingRecord, ProcessingState};
pub use crate::score::{JudgmentScore, Stage};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A subscriber installed earlier
/// (e.g. by the hosting runtime) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_curator=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
