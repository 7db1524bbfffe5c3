// tests/common/mod.rs
//
// Shared fixtures: fast retry policy, counting stores, orchestrator harness.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use news_curator::article::{Article, Fingerprint};
use news_curator::decision::DecisionPolicy;
use news_curator::dedup::{DedupStore, MemoryDedupStore};
use news_curator::error::{DedupError, PersistError};
use news_curator::history::RunHistory;
use news_curator::judgment::{JudgmentClient, PromptSet, RetryPolicy, ScriptedBackend};
use news_curator::persist::{
    ArticleStore, MemoryArticleStore, PersistenceGateway, StoreOutcome, StoredArticle,
};
use news_curator::pipeline::Orchestrator;

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(2),
        success_delay: Duration::ZERO,
    }
}

pub fn article(title: &str) -> Article {
    Article::new(title, "Body text for the model.", "test-feed", Utc::now())
        .with_url(format!("https://news.example.com/{}", title.replace(' ', "-")))
        .with_category("economy")
}

/// Memory store that counts upserts and can fail the first `n` of them,
/// either before writing or after (a write whose response got lost).
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryArticleStore,
    pub upserts: AtomicUsize,
    fail_first: Mutex<usize>,
    lose_ack: Mutex<usize>,
}

impl CountingStore {
    pub fn failing(n: usize) -> Self {
        Self {
            fail_first: Mutex::new(n),
            ..Self::default()
        }
    }

    pub fn losing_acks(n: usize) -> Self {
        Self {
            lose_ack: Mutex::new(n),
            ..Self::default()
        }
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleStore for CountingStore {
    async fn upsert(&self, record: &StoredArticle) -> Result<StoreOutcome, PersistError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        {
            let mut left = self.fail_first.lock();
            if *left > 0 {
                *left -= 1;
                return Err(PersistError::Storage("connection reset".into()));
            }
        }
        let outcome = self.inner.upsert(record).await?;
        let mut lost = self.lose_ack.lock();
        if *lost > 0 {
            *lost -= 1;
            return Err(PersistError::Storage("response timed out".into()));
        }
        Ok(outcome)
    }

    async fn exists(&self, fp: &Fingerprint) -> Result<bool, PersistError> {
        self.inner.exists(fp).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Dedup store whose backend is down.
pub struct DownDedup;

#[async_trait]
impl DedupStore for DownDedup {
    async fn seen(&self, _fp: &Fingerprint) -> Result<bool, DedupError> {
        Err(DedupError::Unavailable("connection refused".into()))
    }

    async fn check_and_mark(&self, _fp: &Fingerprint) -> Result<bool, DedupError> {
        Err(DedupError::Unavailable("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "down"
    }
}

pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub dedup: Arc<dyn DedupStore>,
    pub store: Arc<CountingStore>,
    pub history: Arc<RunHistory>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with_parts(backend, Arc::new(MemoryDedupStore::new()), CountingStore::default())
    }

    pub fn with_parts(
        backend: ScriptedBackend,
        dedup: Arc<dyn DedupStore>,
        store: CountingStore,
    ) -> Self {
        Self::with_history(backend, dedup, store, RunHistory::with_capacity(100))
    }

    pub fn with_history(
        backend: ScriptedBackend,
        dedup: Arc<dyn DedupStore>,
        store: CountingStore,
        history: RunHistory,
    ) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(store);
        let history = Arc::new(history);
        let client = Arc::new(JudgmentClient::new(backend.clone(), fast_policy()));
        let orchestrator = Arc::new(
            Orchestrator::new(
                dedup.clone(),
                client,
                &PromptSet::default(),
                DecisionPolicy::default(),
                PersistenceGateway::new(store.clone()),
            )
            .with_persist_retry(3, Duration::from_millis(1))
            .with_history(history.clone()),
        );
        Self {
            backend,
            dedup,
            store,
            history,
            orchestrator,
        }
    }
}
