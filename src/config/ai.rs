// src/config/ai.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs, path::Path};

use crate::judgment::gemini::GeminiBackend;
use crate::judgment::openai::OpenAiBackend;
use crate::judgment::{DisabledBackend, JudgmentBackend, MockBackend};

pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";
pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
/// `AI_TEST_MODE=mock` swaps in the deterministic backend regardless of config.
pub const ENV_AI_TEST_MODE: &str = "AI_TEST_MODE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" | "deepseek" | "gemini" (case-insensitive)
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY / DEEPSEEK_API_KEY / GOOGLE_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".into(),
            model: default_model("openai").into(),
            base_url: None,
            api_key: "ENV".into(),
        }
    }
}

fn default_model(provider: &str) -> &'static str {
    match provider {
        "deepseek" => "deepseek-chat",
        "gemini" => "gemini-1.5-flash",
        _ => "gpt-4o-mini",
    }
}

fn key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        "gemini" => Some("GOOGLE_API_KEY"),
        _ => None,
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading ai config {}", path.display()))?;
        let cfg: AiConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing ai config {}", path.display()))?;
        cfg.normalized()
    }

    /// `$AI_CONFIG_PATH`, then `config/ai.json`; no file means AI disabled.
    pub fn load_default() -> anyhow::Result<Self> {
        if let Ok(p) = env::var(ENV_AI_CONFIG_PATH) {
            return Self::load_from_file(p);
        }
        if Path::new(DEFAULT_AI_CONFIG_PATH).exists() {
            return Self::load_from_file(DEFAULT_AI_CONFIG_PATH);
        }
        Ok(Self::default())
    }

    fn normalized(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();
        let Some(var) = key_env(&self.provider) else {
            anyhow::bail!("Unsupported provider in config: {}", self.provider);
        };
        if self.model.trim().is_empty() {
            self.model = default_model(&self.provider).to_string();
        }
        // Key is only needed when calls will actually be made.
        if self.enabled && self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key =
                env::var(var).map_err(|_| anyhow::anyhow!("Missing {var} env var"))?;
        }
        Ok(self)
    }

    pub fn mock_mode() -> bool {
        env::var(ENV_AI_TEST_MODE)
            .map(|v| v.eq_ignore_ascii_case("mock"))
            .unwrap_or(false)
    }

    /// Backend for this config. Disabled config yields a backend that refuses
    /// every call, so runs fail visibly instead of storing nothing silently.
    pub fn build_backend(&self, timeout: Duration) -> anyhow::Result<Arc<dyn JudgmentBackend>> {
        if Self::mock_mode() {
            return Ok(Arc::new(MockBackend::default()));
        }
        if !self.enabled {
            return Ok(Arc::new(DisabledBackend));
        }
        let base = self.base_url.as_deref();
        let backend: Arc<dyn JudgmentBackend> = match self.provider.as_str() {
            "openai" => Arc::new(OpenAiBackend::new(&self.api_key, &self.model, base, timeout)?),
            "deepseek" => Arc::new(OpenAiBackend::deepseek(
                &self.api_key,
                &self.model,
                base,
                timeout,
            )?),
            "gemini" => Arc::new(GeminiBackend::new(&self.api_key, &self.model, base, timeout)?),
            other => anyhow::bail!("Unsupported provider in config: {other}"),
        };
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_needs_no_key() {
        let cfg: AiConfig =
            serde_json::from_str(r#"{"enabled":false,"provider":"Gemini","api_key":"ENV"}"#)
                .unwrap();
        let cfg = cfg.normalized().unwrap();
        assert_eq!(cfg.provider, "gemini");
        assert_eq!(cfg.model, "gemini-1.5-flash");
        assert_eq!(cfg.api_key, "ENV");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let cfg: AiConfig =
            serde_json::from_str(r#"{"enabled":true,"provider":"claude","api_key":"x"}"#).unwrap();
        assert!(cfg.normalized().is_err());
    }
}
