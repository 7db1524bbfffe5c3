// src/config/curator.rs
//! Runtime knobs for the pipeline, judgment client, decision policy and storage.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decision::DecisionPolicy;
use crate::judgment::RetryPolicy;
use crate::pipeline::BatchOptions;

pub const ENV_CURATOR_CONFIG_PATH: &str = "CURATOR_CONFIG_PATH";
pub const DEFAULT_CURATOR_CONFIG_PATH: &str = "config/curator.toml";

/// Upper bound for `max_age_hours` (100 years); keeps the duration representable.
const MAX_AGE_HOURS_CAP: u64 = 876_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub pipeline: PipelineSection,
    pub judgment: JudgmentSection,
    pub policy: DecisionPolicy,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub concurrency: usize,
    /// Drives per article within one batch, first run included.
    pub run_attempts: u32,
    pub persist_attempts: u32,
    pub persist_backoff_ms: u64,
    pub interval_secs: u64,
    pub max_age_hours: u64,
    pub history_capacity: usize,
    pub journal_path: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_attempts: 3,
            persist_attempts: 3,
            persist_backoff_ms: 200,
            interval_secs: 1800,
            max_age_hours: 24,
            history_capacity: 500,
            journal_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentSection {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub success_delay_ms: u64,
    pub prompt_dir: Option<PathBuf>,
}

impl Default for JudgmentSection {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            max_attempts: 3,
            backoff_ms: 5_000,
            success_delay_ms: 0,
            prompt_dir: None,
        }
    }
}

impl JudgmentSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.backoff_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            success_delay: Duration::from_millis(self.success_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub kind: StorageKind,
    /// Dedup markers and (for `file`) stored articles live under here.
    pub data_dir: PathBuf,
    pub base_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            data_dir: PathBuf::from("data"),
            base_url: None,
            http_timeout_secs: 10,
        }
    }
}

impl StorageSection {
    pub fn dedup_dir(&self) -> PathBuf {
        self.data_dir.join("seen")
    }

    pub fn articles_dir(&self) -> PathBuf {
        self.data_dir.join("articles")
    }
}

impl CuratorConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading curator config from {}", path.display()))?;
        let cfg: CuratorConfig = toml::from_str(&content)
            .with_context(|| format!("parsing curator config {}", path.display()))?;
        cfg.sanitized().validated()
    }

    /// Load using env var + fallbacks:
    /// 1) $CURATOR_CONFIG_PATH
    /// 2) config/curator.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CURATOR_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("CURATOR_CONFIG_PATH points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_CURATOR_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }

    /// Clamp numeric knobs into workable ranges.
    pub fn sanitized(mut self) -> Self {
        let p = &mut self.pipeline;
        p.concurrency = p.concurrency.clamp(1, 64);
        p.run_attempts = p.run_attempts.max(1);
        p.persist_attempts = p.persist_attempts.max(1);
        p.interval_secs = p.interval_secs.max(1);
        p.max_age_hours = p.max_age_hours.clamp(1, MAX_AGE_HOURS_CAP);
        p.history_capacity = p.history_capacity.max(1);

        let j = &mut self.judgment;
        j.timeout_secs = j.timeout_secs.max(1);
        j.max_attempts = j.max_attempts.clamp(1, 10);

        self.policy = self.policy.sanitized();
        self
    }

    fn validated(self) -> Result<Self> {
        if self.storage.kind == StorageKind::Http
            && self.storage.base_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(anyhow!("storage.kind = \"http\" requires storage.base_url"));
        }
        Ok(self)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.pipeline.concurrency,
            run_attempts: self.pipeline.run_attempts,
        }
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.pipeline.persist_backoff_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.interval_secs)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pipeline.max_age_hours.min(MAX_AGE_HOURS_CAP) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: CuratorConfig = toml::from_str(
            r#"
            [policy]
            high_threshold = 27

            [judgment]
            max_attempts = 0
            "#,
        )
        .unwrap();
        let cfg = cfg.sanitized();
        assert_eq!(cfg.policy.high_threshold, 27);
        assert_eq!(cfg.policy.discard_floor, 10);
        assert_eq!(cfg.judgment.max_attempts, 1);
        assert_eq!(cfg.pipeline.concurrency, 4);
        assert_eq!(cfg.storage.kind, StorageKind::File);
    }

    #[test]
    fn http_storage_requires_base_url() {
        let cfg: CuratorConfig = toml::from_str("[storage]\nkind = \"http\"\n").unwrap();
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn retry_policy_maps_millis() {
        let j = JudgmentSection {
            backoff_ms: 250,
            ..JudgmentSection::default()
        };
        let p = j.retry_policy();
        assert_eq!(p.base_backoff, Duration::from_millis(250));
        assert_eq!(p.timeout, Duration::from_secs(20));
        assert_eq!(p.max_attempts, 3);
    }
}
