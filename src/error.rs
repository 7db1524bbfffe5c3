//! Error taxonomy of the curation pipeline.
//!
//! `AlreadyStored` is deliberately absent: a repeated store is an outcome
//! (`persist::StoreOutcome`), not an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::article::Fingerprint;
use crate::decision::Recommendation;

/// Dedup storage could not answer; the run must not proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    #[error("dedup store unavailable: {0}")]
    Unavailable(String),
}

/// Classification of a failed judgment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    /// 5xx-equivalent or transport failure.
    Unavailable,
    /// Provider refused the request (auth, bad request, disabled).
    Rejected,
    MalformedResponse,
}

impl FailureKind {
    /// Retried with backoff inside the judgment client.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::RateLimited | FailureKind::Unavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Rejected => "rejected",
            FailureKind::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("evaluation failed ({kind}): {detail}")]
pub struct EvaluationFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl EvaluationFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// Storage-layer write/read failure; retryable by the orchestrator.
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("refusing to store {0}: recommendation is {1}")]
    NotRecommended(Fingerprint, Recommendation),
}

impl PersistError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistError::Storage(_))
    }
}

/// Any failure a pipeline step can hand to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error(transparent)]
    Dedup(#[from] DedupError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationFailure),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl StepError {
    pub fn evaluation_kind(&self) -> Option<FailureKind> {
        match self {
            StepError::Evaluation(e) => Some(e.kind),
            _ => None,
        }
    }
}
