//! Wires config into a ready-to-run curator: stores, judgment client,
//! orchestrator, history and feed providers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::curator::StorageKind;
use crate::config::{AiConfig, CuratorConfig};
use crate::dedup::{DedupStore, FileDedupStore};
use crate::history::RunHistory;
use crate::ingest::config::fetch_remote_feeds;
use crate::ingest::providers::RssProvider;
use crate::ingest::types::{FeedSpec, SourceProvider};
use crate::ingest::{self, IngestReport};
use crate::judgment::{JudgmentClient, PromptSet};
use crate::persist::{ArticleStore, FileArticleStore, HttpArticleStore, PersistenceGateway};
use crate::pipeline::{carry_map, BatchItem, BatchSummary, Orchestrator};

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub ingest: IngestReport,
    pub batch: BatchSummary,
}

pub struct CuratorRuntime {
    cfg: CuratorConfig,
    orchestrator: Arc<Orchestrator>,
    history: Arc<RunHistory>,
    providers: Vec<Box<dyn SourceProvider>>,
}

impl CuratorRuntime {
    pub fn new(
        cfg: CuratorConfig,
        orchestrator: Arc<Orchestrator>,
        history: Arc<RunHistory>,
        providers: Vec<Box<dyn SourceProvider>>,
    ) -> Self {
        Self {
            cfg,
            orchestrator,
            history,
            providers,
        }
    }

    /// Build everything from loaded config. With no local feeds and an HTTP
    /// storage backend, the active feed list is fetched from that backend.
    pub async fn build(
        cfg: CuratorConfig,
        ai: &AiConfig,
        mut feeds: Vec<FeedSpec>,
    ) -> anyhow::Result<Self> {
        let judgment = &cfg.judgment;
        let backend = ai
            .build_backend(Duration::from_secs(judgment.timeout_secs))
            .context("building judgment backend")?;
        let prompts = PromptSet::load(judgment.prompt_dir.as_deref());
        let client = Arc::new(
            JudgmentClient::new(backend, judgment.retry_policy())
                .with_system_prompt(prompts.system.clone()),
        );

        let dedup: Arc<dyn DedupStore> = Arc::new(
            FileDedupStore::open(cfg.storage.dedup_dir()).context("opening dedup store")?,
        );
        let http_timeout = Duration::from_secs(cfg.storage.http_timeout_secs);
        let store: Arc<dyn ArticleStore> = match cfg.storage.kind {
            StorageKind::File => Arc::new(
                FileArticleStore::open(cfg.storage.articles_dir())
                    .context("opening article store")?,
            ),
            StorageKind::Http => {
                let base = cfg.storage.base_url.clone().unwrap_or_default();
                Arc::new(HttpArticleStore::new(base, http_timeout)?)
            }
        };

        let history = Arc::new(match &cfg.pipeline.journal_path {
            Some(p) => RunHistory::with_journal(cfg.pipeline.history_capacity, p)?,
            None => RunHistory::with_capacity(cfg.pipeline.history_capacity),
        });

        let orchestrator = Arc::new(
            Orchestrator::new(
                dedup,
                client.clone(),
                &prompts,
                cfg.policy,
                PersistenceGateway::new(store.clone()),
            )
            .with_persist_retry(cfg.pipeline.persist_attempts, cfg.persist_backoff())
            .with_history(history.clone()),
        );

        let http = reqwest::Client::builder()
            .user_agent("news-curator/0.1")
            .timeout(http_timeout)
            .build()
            .context("building feed http client")?;

        if feeds.is_empty() && cfg.storage.kind == StorageKind::Http {
            if let Some(base) = cfg.storage.base_url.as_deref() {
                match fetch_remote_feeds(&http, base).await {
                    Ok(remote) => feeds = remote,
                    Err(e) => warn!(target: "curator", error = ?e, "remote feed list unavailable"),
                }
            }
        }

        info!(
            target: "curator",
            provider = client.provider_name(),
            storage = store.name(),
            feeds = feeds.len(),
            floor = cfg.policy.discard_floor,
            high = cfg.policy.high_threshold,
            "curator runtime ready"
        );

        let providers: Vec<Box<dyn SourceProvider>> = feeds
            .into_iter()
            .map(|f| Box::new(RssProvider::from_feed(f, http.clone())) as Box<dyn SourceProvider>)
            .collect();

        Ok(Self::new(cfg, orchestrator, history, providers))
    }

    /// Replace the feed providers, e.g. with a fixed document.
    pub fn with_providers(mut self, providers: Vec<Box<dyn SourceProvider>>) -> Self {
        self.providers = providers;
        self
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.cfg
    }

    pub fn history(&self) -> Arc<RunHistory> {
        self.history.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// One ingest + pipeline pass. Articles whose earlier run failed are
    /// resumed from their archived record instead of hitting dedup again.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut ingest = ingest::run_once(&self.providers, self.cfg.max_age()).await;

        let mut carried = carry_map(self.history.resumable());
        let items: Vec<BatchItem> = std::mem::take(&mut ingest.kept)
            .into_iter()
            .map(|article| {
                let carried = carried.remove(&article.fingerprint());
                BatchItem { article, carried }
            })
            .collect();
        let resumed = items.iter().filter(|i| i.carried.is_some()).count();
        if resumed > 0 {
            info!(target: "curator", resumed, "resuming unresolved records");
        }

        let batch = self
            .orchestrator
            .run_batch(items, self.cfg.batch_options())
            .await;

        CycleReport { ingest, batch }
    }
}
