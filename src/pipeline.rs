//! Per-article state machine and the concurrent batch driver.
//!
//! Dedup → Stage-1 → Stage-2 → Decide → Persist. Every run ends `stored`,
//! `discarded` or `failed`; a failed record carries the state it resumes from,
//! so a retry re-enters at the failed step without redoing completed ones.
//!
//! Once the dedup mark is taken, every state change is checkpointed to the run
//! history. A run abandoned mid-way (shutdown, aborted task) leaves an open
//! record behind, and the next cycle resumes it instead of seeing a duplicate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::article::{Article, Fingerprint};
use crate::decision::{Decision, DecisionPolicy, Recommendation};
use crate::dedup::DedupStore;
use crate::error::{FailureKind, PersistError, StepError};
use crate::evaluate::{Stage1Evaluator, Stage2Evaluator, Verdict};
use crate::history::RunHistory;
use crate::judgment::{JudgmentClient, PromptSet};
use crate::persist::{PersistenceGateway, StoreOutcome};
use crate::score::JudgmentScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Stage1Done,
    Stage2Done,
    Decided,
    Stored,
    Discarded,
    Failed,
}

impl ProcessingState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Stage1Done => "stage1_done",
            ProcessingState::Stage2Done => "stage2_done",
            ProcessingState::Decided => "decided",
            ProcessingState::Stored => "stored",
            ProcessingState::Discarded => "discarded",
            ProcessingState::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Dedup,
    Stage1,
    Stage2,
    Decide,
    Persist,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Dedup => "dedup",
            Step::Stage1 => "stage1",
            Step::Stage2 => "stage2",
            Step::Decide => "decide",
            Step::Persist => "persist",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Fingerprint was already marked by an earlier or concurrent run.
    Duplicate,
    /// Stage-1 total under the discard floor; Stage-2 never ran.
    BelowFloor,
    /// Decision came out `mid` or `low`.
    NotRecommended(Recommendation),
}

/// A step failure with the step it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: StepError,
}

impl PipelineError {
    pub fn new(step: Step, source: impl Into<StepError>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("record {record} does not belong to article {article}")]
    FingerprintMismatch {
        record: Fingerprint,
        article: Fingerprint,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub step: Step,
    /// Set for judgment failures.
    pub kind: Option<FailureKind>,
    pub reason: String,
    /// State the record returns to on retry.
    pub resume_from: ProcessingState,
}

/// Lifecycle of one article. Owned by the run that drives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub fingerprint: Fingerprint,
    pub title: String,
    pub state: ProcessingState,
    /// The dedup mark belongs to this record; a retry must not re-check it.
    pub dedup_marked: bool,
    pub stage1: Option<JudgmentScore>,
    pub stage2: Option<JudgmentScore>,
    pub model_label: Option<Recommendation>,
    pub reason: Option<String>,
    pub decision: Option<Decision>,
    pub discard: Option<DiscardReason>,
    pub failure: Option<Failure>,
    pub store_outcome: Option<StoreOutcome>,
    /// Number of times the record has been driven.
    pub attempts: u32,
    /// Retry budget spent; the record is archived as failed.
    pub exhausted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingRecord {
    pub fn new(article: &Article) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: article.fingerprint(),
            title: article.short_title(),
            state: ProcessingState::Pending,
            dedup_marked: false,
            stage1: None,
            stage2: None,
            model_label: None,
            reason: None,
            decision: None,
            discard: None,
            failure: None,
            store_outcome: None,
            attempts: 0,
            exhausted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ProcessingState::Stored | ProcessingState::Discarded | ProcessingState::Failed
        )
    }

    /// Next step to run from the current state; `None` once terminal.
    pub fn next_step(&self) -> Option<Step> {
        match self.state {
            ProcessingState::Pending if !self.dedup_marked => Some(Step::Dedup),
            ProcessingState::Pending => Some(Step::Stage1),
            ProcessingState::Stage1Done => Some(Step::Stage2),
            ProcessingState::Stage2Done => Some(Step::Decide),
            ProcessingState::Decided => Some(Step::Persist),
            ProcessingState::Stored | ProcessingState::Discarded | ProcessingState::Failed => None,
        }
    }

    pub fn fail(&mut self, err: PipelineError) {
        let resume_from = match err.step {
            Step::Dedup | Step::Stage1 => ProcessingState::Pending,
            Step::Stage2 => ProcessingState::Stage1Done,
            Step::Decide => ProcessingState::Stage2Done,
            Step::Persist => ProcessingState::Decided,
        };
        self.failure = Some(Failure {
            step: err.step,
            kind: err.source.evaluation_kind(),
            reason: err.source.to_string(),
            resume_from,
        });
        self.advance(ProcessingState::Failed);
    }

    /// Restore a failed record to the state preceding its failed step.
    fn reopen(&mut self) {
        if self.state == ProcessingState::Failed {
            let back = self
                .failure
                .as_ref()
                .map(|f| f.resume_from)
                .unwrap_or(ProcessingState::Pending);
            self.advance(back);
        }
    }

    fn discard(&mut self, reason: DiscardReason) {
        self.discard = Some(reason);
        self.advance(ProcessingState::Discarded);
    }

    fn advance(&mut self, state: ProcessingState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Drives articles through the pipeline. Holds no per-article state.
pub struct Orchestrator {
    dedup: Arc<dyn DedupStore>,
    stage1: Stage1Evaluator,
    stage2: Stage2Evaluator,
    policy: DecisionPolicy,
    gateway: PersistenceGateway,
    persist_attempts: u32,
    persist_backoff: Duration,
    history: Option<Arc<RunHistory>>,
}

impl Orchestrator {
    pub fn new(
        dedup: Arc<dyn DedupStore>,
        client: Arc<JudgmentClient>,
        prompts: &PromptSet,
        policy: DecisionPolicy,
        gateway: PersistenceGateway,
    ) -> Self {
        let policy = policy.sanitized();
        Self {
            dedup,
            stage1: Stage1Evaluator::new(client.clone(), prompts, policy),
            stage2: Stage2Evaluator::new(client, prompts),
            policy,
            gateway,
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(200),
            history: None,
        }
    }

    pub fn with_persist_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.persist_attempts = attempts.max(1);
        self.persist_backoff = backoff;
        self
    }

    pub fn with_history(mut self, history: Arc<RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Fresh run for an article. Stored and discarded records are archived;
    /// duplicates are only counted.
    pub async fn run(&self, article: &Article) -> ProcessingRecord {
        let record = self.drive(article, ProcessingRecord::new(article)).await;
        self.archive_if_final(&record);
        record
    }

    /// Continue a record produced by an earlier run of the same article.
    /// Failed records re-enter at the failed step; completed steps are skipped.
    pub async fn resume(
        &self,
        article: &Article,
        mut record: ProcessingRecord,
    ) -> Result<ProcessingRecord, ResumeError> {
        let fp = article.fingerprint();
        if fp != record.fingerprint {
            return Err(ResumeError::FingerprintMismatch {
                record: record.fingerprint,
                article: fp,
            });
        }
        if matches!(
            record.state,
            ProcessingState::Stored | ProcessingState::Discarded
        ) {
            return Ok(record);
        }
        record.reopen();
        record.exhausted = false;
        let record = self.drive(article, record).await;
        self.archive_if_final(&record);
        Ok(record)
    }

    /// Mark a failed record as out of retries and archive it.
    pub fn give_up(&self, mut record: ProcessingRecord) -> ProcessingRecord {
        if record.state == ProcessingState::Failed {
            record.exhausted = true;
            warn!(
                target: "pipeline",
                fingerprint = %record.fingerprint,
                title = %record.title,
                attempts = record.attempts,
                step = ?record.failure.as_ref().map(|f| f.step),
                "retries exhausted; archived as failed"
            );
            if let Some(h) = &self.history {
                h.push(&record);
            }
        }
        record
    }

    fn archive_if_final(&self, record: &ProcessingRecord) {
        // A duplicate never held the mark; the record that did owns the history entry.
        if record.dedup_marked
            && matches!(
                record.state,
                ProcessingState::Stored | ProcessingState::Discarded
            )
        {
            if let Some(h) = &self.history {
                h.push(record);
            }
        }
    }

    fn checkpoint(&self, record: &ProcessingRecord) {
        if let Some(h) = &self.history {
            h.push(record);
        }
    }

    async fn drive(&self, article: &Article, mut record: ProcessingRecord) -> ProcessingRecord {
        record.attempts += 1;

        while let Some(step) = record.next_step() {
            debug!(target: "pipeline", fingerprint = %record.fingerprint, %step, "step");
            match step {
                Step::Dedup => match self.dedup.check_and_mark(&record.fingerprint).await {
                    Ok(true) => {
                        record.dedup_marked = true;
                        record.updated_at = Utc::now();
                    }
                    Ok(false) => {
                        counter!("pipeline_duplicates_total").increment(1);
                        record.discard(DiscardReason::Duplicate);
                    }
                    Err(e) => record.fail(PipelineError::new(step, e)),
                },
                Step::Stage1 => match self.stage1.assess(article).await {
                    Ok(a) => {
                        record.stage1 = Some(a.score);
                        record.reason = a.reason;
                        match a.verdict {
                            Verdict::Continue => record.advance(ProcessingState::Stage1Done),
                            Verdict::Discard => record.discard(DiscardReason::BelowFloor),
                        }
                    }
                    Err(e) => record.fail(PipelineError::new(step, e)),
                },
                Step::Stage2 => {
                    let Some(s1) = record.stage1 else {
                        record.advance(ProcessingState::Pending);
                        continue;
                    };
                    match self.stage2.assess(article, &s1).await {
                        Ok(a) => {
                            record.stage2 = Some(a.score);
                            record.model_label = a.model_label;
                            if a.reason.is_some() {
                                record.reason = a.reason;
                            }
                            record.advance(ProcessingState::Stage2Done);
                        }
                        Err(e) => record.fail(PipelineError::new(step, e)),
                    }
                }
                Step::Decide => {
                    let Some(s1) = record.stage1 else {
                        record.advance(ProcessingState::Pending);
                        continue;
                    };
                    let decision = self.policy.aggregate(&s1, record.stage2.as_ref());
                    record.decision = Some(decision);
                    if decision.is_high() {
                        record.advance(ProcessingState::Decided);
                    } else {
                        record.discard(DiscardReason::NotRecommended(decision.recommendation));
                    }
                }
                Step::Persist => {
                    let Some(decision) = record.decision else {
                        record.advance(ProcessingState::Stage2Done);
                        continue;
                    };
                    match self.persist(article, &decision).await {
                        Ok(outcome) => {
                            record.store_outcome = Some(outcome);
                            record.advance(ProcessingState::Stored);
                        }
                        Err(e) => record.fail(PipelineError::new(step, e)),
                    }
                }
            }

            if record.dedup_marked
                && !matches!(
                    record.state,
                    ProcessingState::Stored | ProcessingState::Discarded
                )
            {
                self.checkpoint(&record);
            }
        }

        self.report(&record);
        record
    }

    async fn persist(
        &self,
        article: &Article,
        decision: &Decision,
    ) -> Result<StoreOutcome, PersistError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.gateway.store(article, decision).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < self.persist_attempts => {
                    let wait = self.persist_backoff.saturating_mul(attempt);
                    warn!(
                        target: "pipeline",
                        fingerprint = %article.fingerprint(),
                        attempt,
                        error = %e,
                        "persist failed; retrying"
                    );
                    tokio::time::sleep(wait).await;
                    // The failed write may still have landed (e.g. a lost response).
                    if let Ok(true) = self.gateway.is_stored(&article.fingerprint()).await {
                        return Ok(StoreOutcome::AlreadyStored);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn report(&self, record: &ProcessingRecord) {
        let outcome = match (record.state, record.discard) {
            (ProcessingState::Discarded, Some(DiscardReason::Duplicate)) => "duplicate",
            (state, _) => state.as_str(),
        };
        counter!("pipeline_runs_total", "outcome" => outcome).increment(1);

        match record.state {
            ProcessingState::Failed => {
                let f = record.failure.as_ref();
                warn!(
                    target: "pipeline",
                    fingerprint = %record.fingerprint,
                    title = %record.title,
                    step = ?f.map(|f| f.step),
                    kind = ?f.and_then(|f| f.kind),
                    reason = f.map(|f| f.reason.as_str()).unwrap_or_default(),
                    attempt = record.attempts,
                    "article failed"
                );
            }
            _ => info!(
                target: "pipeline",
                fingerprint = %record.fingerprint,
                title = %record.title,
                state = %record.state,
                discard = ?record.discard,
                total = record.decision.map(|d| d.total),
                "article finished"
            ),
        }
    }
}

// ------------------------------------------------------------
// Batch driver
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Articles in flight at once.
    pub concurrency: usize,
    /// Drives per article, the first run included.
    pub run_attempts: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_attempts: 3,
        }
    }
}

/// An article plus the record of an earlier run, if one exists.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub article: Article,
    pub carried: Option<ProcessingRecord>,
}

impl From<Article> for BatchItem {
    fn from(article: Article) -> Self {
        Self {
            article,
            carried: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub stored: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub records: Vec<ProcessingRecord>,
}

impl BatchSummary {
    fn tally(&mut self, record: ProcessingRecord) {
        match (record.state, record.discard) {
            (ProcessingState::Stored, _) => self.stored += 1,
            (ProcessingState::Discarded, Some(DiscardReason::Duplicate)) => self.duplicates += 1,
            (ProcessingState::Discarded, _) => self.discarded += 1,
            _ => self.failed += 1,
        }
        self.records.push(record);
    }
}

impl Orchestrator {
    /// Run a batch concurrently. Failed records are re-entered up to
    /// `run_attempts` drives, then archived as exhausted.
    pub async fn run_batch<I, T>(self: &Arc<Self>, items: I, opts: BatchOptions) -> BatchSummary
    where
        I: IntoIterator<Item = T>,
        T: Into<BatchItem>,
    {
        let permits = Arc::new(Semaphore::new(opts.concurrency.max(1)));
        let run_attempts = opts.run_attempts.max(1);
        let mut handles: Vec<(Fingerprint, JoinHandle<ProcessingRecord>)> = Vec::new();

        for item in items {
            let item: BatchItem = item.into();
            let fp = item.article.fingerprint();
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                this.run_item(item, run_attempts).await
            });
            handles.push((fp, handle));
        }

        let mut summary = BatchSummary::default();
        for (fp, handle) in handles {
            match handle.await {
                Ok(record) => summary.tally(record),
                Err(e) => {
                    error!(target: "pipeline", fingerprint = %fp, error = %e, "article task aborted");
                    counter!("pipeline_runs_total", "outcome" => "aborted").increment(1);
                    summary.failed += 1;
                }
            }
        }

        info!(
            target: "pipeline",
            stored = summary.stored,
            discarded = summary.discarded,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "batch finished"
        );
        summary
    }

    async fn run_item(&self, item: BatchItem, run_attempts: u32) -> ProcessingRecord {
        let BatchItem { article, carried } = item;
        let mut record = match carried {
            Some(prev) => match self.resume(&article, prev).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(target: "pipeline", error = %e, "dropping carried record");
                    self.run(&article).await
                }
            },
            None => self.run(&article).await,
        };

        let mut drives = 1u32;
        while record.state == ProcessingState::Failed && drives < run_attempts {
            drives += 1;
            record = match self.resume(&article, record.clone()).await {
                Ok(r) => r,
                Err(_) => break,
            };
        }

        if record.state == ProcessingState::Failed {
            record = self.give_up(record);
        }
        record
    }
}

/// Index unresolved records (failed or abandoned mid-run) by fingerprint for
/// the next batch.
pub fn carry_map(records: Vec<ProcessingRecord>) -> HashMap<Fingerprint, ProcessingRecord> {
    records
        .into_iter()
        .filter(|r| {
            !matches!(
                r.state,
                ProcessingState::Stored | ProcessingState::Discarded
            )
        })
        .map(|r| (r.fingerprint.clone(), r))
        .collect()
}
