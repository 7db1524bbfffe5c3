// tests/persist_http.rs
//
// HttpArticleStore against a local news backend on an ephemeral port:
// POST /news keyed by fingerprint (409 on repeat), GET /news/check?fingerprint=.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use news_curator::article::Article;
use news_curator::decision::decide;
use news_curator::persist::{ArticleStore, HttpArticleStore, StoreOutcome, StoredArticle};
use news_curator::score::JudgmentScore;

#[derive(Default)]
struct Backend {
    keys: Mutex<HashSet<String>>,
    checks: Mutex<Vec<String>>,
}

#[derive(Deserialize)]
struct CheckQuery {
    fingerprint: String,
}

async fn create(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let key = body["fingerprint"].as_str().unwrap_or_default().to_string();
    if b.keys.lock().insert(key) {
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (StatusCode::CONFLICT, Json(json!({ "success": false })))
    }
}

async fn check(State(b): State<Arc<Backend>>, Query(q): Query<CheckQuery>) -> Json<Value> {
    b.checks.lock().push(q.fingerprint.clone());
    let exists = b.keys.lock().contains(&q.fingerprint);
    Json(json!({ "exists": exists }))
}

async fn spawn_backend() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/news", post(create))
        .route("/news/check", get(check))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/"), backend)
}

fn record() -> StoredArticle {
    let a = Article::new("Rate cut expected", "Officials said.", "yna-economy", Utc::now())
        .with_url("https://news.example.com/economy/1001");
    StoredArticle::new(&a, &decide(&JudgmentScore::new(9, 8, 9, 4).unwrap()))
}

#[tokio::test]
async fn upsert_then_conflict_is_already_stored() {
    let (base, backend) = spawn_backend().await;
    let store = HttpArticleStore::new(base, Duration::from_secs(5)).unwrap();
    let rec = record();

    assert_eq!(store.upsert(&rec).await.unwrap(), StoreOutcome::Stored);
    assert_eq!(store.upsert(&rec).await.unwrap(), StoreOutcome::AlreadyStored);
    assert_eq!(backend.keys.lock().len(), 1);
}

#[tokio::test]
async fn exists_queries_by_fingerprint() {
    let (base, backend) = spawn_backend().await;
    let store = HttpArticleStore::new(base, Duration::from_secs(5)).unwrap();
    let rec = record();

    assert!(!store.exists(&rec.fingerprint).await.unwrap());
    store.upsert(&rec).await.unwrap();
    assert!(store.exists(&rec.fingerprint).await.unwrap());

    let checks = backend.checks.lock().clone();
    assert_eq!(checks, vec![rec.fingerprint.to_string(); 2]);
}
