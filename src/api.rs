//! Ops router: liveness plus read-only views of archived processing records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::history::RunHistory;
use crate::pipeline::ProcessingRecord;

const DEFAULT_HISTORY_N: usize = 20;
const MAX_HISTORY_N: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<RunHistory>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/debug/history", get(debug_history))
        .route("/debug/failed", get(debug_failed))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    n: Option<usize>,
}

async fn debug_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<ProcessingRecord>> {
    let n = q.n.unwrap_or(DEFAULT_HISTORY_N).clamp(1, MAX_HISTORY_N);
    Json(state.history.snapshot_last_n(n))
}

#[derive(Serialize)]
struct FailedOut {
    count: usize,
    records: Vec<ProcessingRecord>,
}

async fn debug_failed(State(state): State<AppState>) -> Json<FailedOut> {
    let records = state.history.failed();
    Json(FailedOut {
        count: records.len(),
        records,
    })
}
