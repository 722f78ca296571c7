use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use replyflow_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for the configured completion provider.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build llm http client")?;
        Ok(Self { http, config })
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let base_url =
            self.config.base_url.as_deref().unwrap_or("https://api.openai.com").trim_end_matches('/');
        let api_key =
            self.config.api_key.as_ref().ok_or_else(|| anyhow!("openai api key missing"))?;

        let response = self
            .http
            .post(format!("{base_url}/v1/chat/completions"))
            .bearer_auth(api_key.expose_secret())
            .json(&json!({
                "model": self.config.model,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .context("openai completion request")?
            .error_for_status()
            .context("openai completion status")?;

        let body: Value = response.json().await.context("openai completion body")?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("openai response missing message content"))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com")
            .trim_end_matches('/');
        let api_key =
            self.config.api_key.as_ref().ok_or_else(|| anyhow!("anthropic api key missing"))?;

        let response = self
            .http
            .post(format!("{base_url}/v1/messages"))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.config.model,
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .context("anthropic completion request")?
            .error_for_status()
            .context("anthropic completion status")?;

        let body: Value = response.json().await.context("anthropic completion body")?;
        body["content"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("anthropic response missing text content"))
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');

        let response = self
            .http
            .post(format!("{base_url}/api/generate"))
            .json(&json!({
                "model": self.config.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .context("ollama completion request")?
            .error_for_status()
            .context("ollama completion status")?;

        let body: Value = response.json().await.context("ollama completion body")?;
        body["response"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("ollama response missing response field"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.config.provider {
            LlmProvider::OpenAi => self.complete_openai(prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }
}
