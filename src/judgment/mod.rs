//! Judgment client: one logical evaluation = up to `max_attempts` backend calls.
//!
//! Transient failures (timeout, rate limit, 5xx) are retried here with
//! exponential backoff; a payload that does not parse into the score fields
//! surfaces immediately as `MalformedResponse`.

pub mod backend;
pub mod criteria;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod parse;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decision::Recommendation;
use crate::error::{EvaluationFailure, FailureKind};
use crate::score::JudgmentScore;

pub use backend::{BackendError, DisabledBackend, JudgmentBackend, JudgmentRequest};
pub use criteria::{Criteria, PromptSet};
pub use mock::{MockBackend, Scripted, ScriptedBackend};

/// Parsed model output. `recommendation` and `reason` are kept for audit only;
/// the decision is always recomputed from `score`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub score: JudgmentScore,
    pub recommendation: Option<Recommendation>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Backoff before retry n is `base_backoff * 2^(n-1)`.
    pub base_backoff: Duration,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Courtesy pause after a successful call.
    pub success_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(20),
            success_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << shift)
    }
}

pub struct JudgmentClient {
    backend: Arc<dyn JudgmentBackend>,
    system: String,
    policy: RetryPolicy,
}

impl JudgmentClient {
    pub fn new(backend: Arc<dyn JudgmentBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            system: criteria::SYSTEM_PROMPT.to_string(),
            policy,
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn evaluate(
        &self,
        article_text: &str,
        criteria: &Criteria,
    ) -> Result<Judgment, EvaluationFailure> {
        let request = JudgmentRequest {
            stage: criteria.stage,
            system: self.system.clone(),
            criteria: criteria.prompt.clone(),
            article_text: article_text.to_string(),
        };
        let stage = criteria.stage.as_str();
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("judgment_calls_total", "stage" => stage).increment(1);

            let t0 = Instant::now();
            let outcome = match tokio::time::timeout(self.policy.timeout, self.backend.call(&request))
                .await
            {
                Ok(res) => res,
                Err(_) => Err(BackendError::Timeout),
            };
            histogram!("judgment_call_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let err = match outcome {
                Ok(raw) => {
                    return match parse::parse_judgment(&raw) {
                        Ok(judgment) => {
                            debug!(
                                target: "judgment",
                                stage, attempt,
                                total = judgment.score.total(),
                                "judgment parsed"
                            );
                            if !self.policy.success_delay.is_zero() {
                                tokio::time::sleep(self.policy.success_delay).await;
                            }
                            Ok(judgment)
                        }
                        Err(detail) => Err(self.surface(stage, EvaluationFailure::malformed(detail))),
                    };
                }
                Err(e) => e,
            };

            let kind = err.kind();
            if kind.is_transient() && attempt < max_attempts {
                let wait = self.policy.backoff_for(attempt);
                warn!(
                    target: "judgment",
                    stage, attempt, max_attempts,
                    kind = kind.as_str(),
                    wait_ms = wait.as_millis() as u64,
                    "transient judgment failure; retrying"
                );
                counter!("judgment_retries_total", "stage" => stage).increment(1);
                tokio::time::sleep(wait).await;
                continue;
            }

            if kind.is_transient() {
                warn!(target: "judgment", stage, attempts = attempt, "judgment retries exhausted");
            }
            return Err(self.surface(stage, EvaluationFailure::new(kind, err.to_string())));
        }
    }

    fn surface(&self, stage: &'static str, failure: EvaluationFailure) -> EvaluationFailure {
        if failure.kind == FailureKind::MalformedResponse {
            warn!(target: "judgment", stage, detail = %failure.detail, "malformed judgment response");
        }
        counter!("judgment_failures_total", "kind" => failure.kind.as_str()).increment(1);
        failure
    }
}
