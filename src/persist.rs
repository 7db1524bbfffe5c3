//! Persistence gateway: idempotent upsert of accepted articles, keyed by fingerprint.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::article::{Article, Fingerprint};
use crate::decision::{Decision, Recommendation};
use crate::error::PersistError;
use crate::score::JudgmentScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored,
    /// Same fingerprint already present; nothing was written.
    AlreadyStored,
}

/// Row written to the curated store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub fingerprint: Fingerprint,
    pub title: String,
    pub content: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub category: Option<String>,
    pub company: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub total_score: u8,
    pub credibility: u8,
    pub recommendation: Recommendation,
    pub score: JudgmentScore,
    pub stored_at: DateTime<Utc>,
}

impl StoredArticle {
    pub fn new(article: &Article, decision: &Decision) -> Self {
        Self {
            fingerprint: article.fingerprint(),
            title: article.title.clone(),
            content: article.body.clone(),
            source_id: article.source_id.clone(),
            source_url: article.url.clone(),
            category: article.category.clone(),
            company: article.company.clone(),
            published_at: article.published_at,
            fetched_at: article.fetched_at,
            total_score: decision.total,
            credibility: decision.credibility,
            recommendation: decision.recommendation,
            score: decision.score,
            stored_at: Utc::now(),
        }
    }
}

/// Storage engine capability: atomic upsert-by-unique-key.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn upsert(&self, record: &StoredArticle) -> Result<StoreOutcome, PersistError>;
    async fn exists(&self, fp: &Fingerprint) -> Result<bool, PersistError>;
    fn name(&self) -> &'static str;
}

pub struct PersistenceGateway {
    store: Arc<dyn ArticleStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Only `high` decisions are accepted; anything else is refused without I/O.
    pub async fn store(
        &self,
        article: &Article,
        decision: &Decision,
    ) -> Result<StoreOutcome, PersistError> {
        if !decision.is_high() {
            return Err(PersistError::NotRecommended(
                article.fingerprint(),
                decision.recommendation,
            ));
        }

        let record = StoredArticle::new(article, decision);
        match self.store.upsert(&record).await {
            Ok(StoreOutcome::Stored) => {
                counter!("persist_total", "result" => "stored").increment(1);
                info!(
                    target: "persist",
                    fingerprint = %record.fingerprint,
                    title = %article.short_title(),
                    total = record.total_score,
                    "article stored"
                );
                Ok(StoreOutcome::Stored)
            }
            Ok(StoreOutcome::AlreadyStored) => {
                counter!("persist_total", "result" => "already_stored").increment(1);
                debug!(target: "persist", fingerprint = %record.fingerprint, "already stored");
                Ok(StoreOutcome::AlreadyStored)
            }
            Err(e) => {
                counter!("persist_total", "result" => "error").increment(1);
                Err(e)
            }
        }
    }

    /// Key-existence check against the store.
    pub async fn is_stored(&self, fp: &Fingerprint) -> Result<bool, PersistError> {
        let found = self.store.exists(fp).await;
        if let Err(e) = &found {
            debug!(target: "persist", fingerprint = %fp, error = %e, "existence check failed");
        }
        found
    }
}

// ------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    records: Mutex<BTreeMap<Fingerprint, StoredArticle>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<StoredArticle> {
        self.records.lock().ok()?.get(fp).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn upsert(&self, record: &StoredArticle) -> Result<StoreOutcome, PersistError> {
        let mut g = self
            .records
            .lock()
            .map_err(|_| PersistError::Storage("store mutex poisoned".into()))?;
        if g.contains_key(&record.fingerprint) {
            return Ok(StoreOutcome::AlreadyStored);
        }
        g.insert(record.fingerprint.clone(), record.clone());
        Ok(StoreOutcome::Stored)
    }

    async fn exists(&self, fp: &Fingerprint) -> Result<bool, PersistError> {
        let g = self
            .records
            .lock()
            .map_err(|_| PersistError::Storage("store mutex poisoned".into()))?;
        Ok(g.contains_key(fp))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ------------------------------------------------------------
// File store: `<dir>/<fp>.json`, published via hard_link
// ------------------------------------------------------------

/// The record is written to a private temp file and then hard-linked to its
/// final name. `hard_link` fails with `AlreadyExists` if the key is taken, which
/// gives a unique-constraint upsert without any application lock.
#[derive(Debug)]
pub struct FileArticleStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileArticleStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fp}.json"))
    }

    pub async fn get(&self, fp: &Fingerprint) -> Result<Option<StoredArticle>, PersistError> {
        match tokio::fs::read_to_string(self.record_path(fp)).await {
            Ok(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| PersistError::Storage(format!("decode record: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Storage(format!("read record: {e}"))),
        }
    }
}

#[async_trait]
impl ArticleStore for FileArticleStore {
    async fn upsert(&self, record: &StoredArticle) -> Result<StoreOutcome, PersistError> {
        let path = self.record_path(&record.fingerprint);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            record.fingerprint,
            std::process::id(),
            seq
        ));

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| PersistError::Storage(format!("encode record: {e}")))?;
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| PersistError::Storage(format!("write temp record: {e}")))?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match linked {
            Ok(()) => Ok(StoreOutcome::Stored),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(StoreOutcome::AlreadyStored),
            Err(e) => Err(PersistError::Storage(format!("publish record: {e}"))),
        }
    }

    async fn exists(&self, fp: &Fingerprint) -> Result<bool, PersistError> {
        tokio::fs::try_exists(self.record_path(fp))
            .await
            .map_err(|e| PersistError::Storage(format!("stat record: {e}")))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ------------------------------------------------------------
// HTTP store: news backend REST API
// ------------------------------------------------------------

/// `POST {base}/news` creates; the backend answers 409 for a known fingerprint.
/// `GET {base}/news/check?fingerprint=` answers `{"exists": bool}`.
///
/// The backend keys news by fingerprint, not by source URL: items without a
/// link still get a stable key, and the check matches the upsert's unique key.
pub struct HttpArticleStore {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct NewsPayload<'a> {
    fingerprint: &'a str,
    category: &'a str,
    title: &'a str,
    content: &'a str,
    company: &'a str,
    source_url: Option<&'a str>,
    published_date: String,
    total_score: u8,
    credibility: u8,
    recommendation: Recommendation,
}

#[derive(Deserialize)]
struct ApiAck {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct ExistsResp {
    #[serde(default)]
    exists: bool,
}

impl HttpArticleStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("news-curator/0.1")
            .timeout(timeout)
            .build()
            .context("building storage http client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ArticleStore for HttpArticleStore {
    async fn upsert(&self, record: &StoredArticle) -> Result<StoreOutcome, PersistError> {
        let payload = NewsPayload {
            fingerprint: record.fingerprint.as_str(),
            category: record.category.as_deref().unwrap_or_default(),
            title: &record.title,
            content: &record.content,
            company: record.company.as_deref().unwrap_or_default(),
            source_url: record.source_url.as_deref(),
            published_date: record.published_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            total_score: record.total_score,
            credibility: record.credibility,
            recommendation: record.recommendation,
        };

        let resp = self
            .client
            .post(format!("{}/news", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PersistError::Storage(format!("news post: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Ok(StoreOutcome::AlreadyStored);
        }
        if !status.is_success() {
            return Err(PersistError::Storage(format!("news post returned {status}")));
        }
        let ack: ApiAck = resp
            .json()
            .await
            .map_err(|e| PersistError::Storage(format!("news post body: {e}")))?;
        if ack.success {
            Ok(StoreOutcome::Stored)
        } else {
            Err(PersistError::Storage("news post: success=false".into()))
        }
    }

    async fn exists(&self, fp: &Fingerprint) -> Result<bool, PersistError> {
        let resp = self
            .client
            .get(format!("{}/news/check", self.base_url))
            .query(&[("fingerprint", fp.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PersistError::Storage(format!("news check: {e}")))?;
        let body: ExistsResp = resp
            .json()
            .await
            .map_err(|e| PersistError::Storage(format!("news check body: {e}")))?;
        Ok(body.exists)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
