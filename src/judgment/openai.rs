//! OpenAI-compatible Chat Completions backend (OpenAI, DeepSeek via base_url).

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::backend::{BackendError, JudgmentBackend, JudgmentRequest};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: &'static str,
}

impl OpenAiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-curator/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building judgment http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            name: "openai",
        })
    }

    /// DeepSeek speaks the same protocol; only the name and default base URL differ.
    pub fn deepseek(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut b = Self::new(api_key, model, Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)), timeout)?;
        b.name = "deepseek";
        Ok(b)
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

#[async_trait]
impl JudgmentBackend for OpenAiBackend {
    async fn call(&self, request: &JudgmentRequest) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Rejected("missing API key".into()));
        }

        let user = request.user_prompt();
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &request.system,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, &body));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BackendError::Malformed("empty choices".into()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
