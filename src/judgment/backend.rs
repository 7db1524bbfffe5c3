//! Low-level judgment backend: does exactly one remote call and classifies
//! transport failures. Parsing and retry live one layer up, in `JudgmentClient`.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::FailureKind;
use crate::score::Stage;

/// Typed request: the criteria prompt and the article text travel separately
/// so providers can place them in their own message slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentRequest {
    pub stage: Stage,
    pub system: String,
    pub criteria: String,
    pub article_text: String,
}

impl JudgmentRequest {
    /// Single-message rendering: criteria template, blank line, `key: value` input.
    pub fn user_prompt(&self) -> String {
        format!("{}\n\n{}", self.criteria, self.article_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The provider answered but its envelope could not be read.
    #[error("malformed provider envelope: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Timeout => FailureKind::Timeout,
            BackendError::RateLimited(_) => FailureKind::RateLimited,
            BackendError::Unavailable(_) => FailureKind::Unavailable,
            BackendError::Rejected(_) => FailureKind::Rejected,
            BackendError::Malformed(_) => FailureKind::MalformedResponse,
        }
    }

    /// Map a non-2xx HTTP status to a failure class.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let msg = format!("{status}: {snippet}");
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            BackendError::RateLimited(msg)
        } else if status.is_server_error() {
            BackendError::Unavailable(msg)
        } else {
            BackendError::Rejected(msg)
        }
    }

    pub fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
pub trait JudgmentBackend: Send + Sync {
    /// One external call; returns the model's raw text payload.
    async fn call(&self, request: &JudgmentRequest) -> Result<String, BackendError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Used when judgment is disabled in config; every call is refused so the run
/// is reported as failed instead of silently skipped.
pub struct DisabledBackend;

#[async_trait]
impl JudgmentBackend for DisabledBackend {
    async fn call(&self, _request: &JudgmentRequest) -> Result<String, BackendError> {
        Err(BackendError::Rejected("judgment disabled in config".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
