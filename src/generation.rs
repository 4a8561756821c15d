//! Text generation backends for the `generate` fallback.
//!
//! One prompt in, one completion out. No streaming; the output length is
//! capped by `[generation].max_tokens`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produces a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Builds the generator named by `config.provider`; `None` when disabled.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Arc<dyn Generator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "ollama" => Ok(Some(Arc::new(OllamaGenerator::new(config)?))),
        "openai" => Ok(Some(Arc::new(OpenAIGenerator::new(config)?))),
        other => bail!("Unknown generation provider: {}", other),
    }
}

fn model_from(config: &GenerationConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generation.model must be specified"))
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ─── Ollama ──────────────────────────────────────────────

pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    max_tokens: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: model_from(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let req = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: self.max_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&req)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Ollama at {}", self.url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Ollama generate API returned {status}: {body}");
        }

        let parsed: OllamaGenerateResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama generate response")?;
        Ok(parsed.response.trim().to_string())
    }
}

// ─── OpenAI ──────────────────────────────────────────────

pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config)?,
            model: model_from(config)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("Failed to connect to OpenAI")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("OpenAI chat API returned {status}: {body}");
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;
        parse_choice(parsed)
    }
}

fn parse_choice(parsed: ChatResponse) -> Result<String> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("OpenAI chat response contained no content"))
}
