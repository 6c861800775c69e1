//! Analysis service clients.
//!
//! Supports two chat APIs:
//! - Anthropic Messages API (`/v1/messages`)
//! - Ollama chat API (`/api/chat`)
//!
//! A client sends one prompt and returns the raw response text. Interpreting
//! that text is the analyzer's job.

use crate::config::{ModelConfig, Provider};
use crate::error::AnalysisError;
use crate::retry::retry_after_header;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One prompt in, raw text out.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AnalysisError>;
}

/// Build the client selected by `config.provider`.
pub fn from_config(config: &ModelConfig, api_key: Option<&str>) -> Result<Arc<dyn AnalysisService>> {
    match config.provider {
        Provider::Anthropic => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .context("ANTHROPIC_API_KEY is required for the anthropic provider")?;
            Ok(Arc::new(AnthropicClient::new(config, key)?))
        }
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(config)?)),
    }
}

/// Map a transport error to the analysis taxonomy.
fn classify_transport(err: reqwest::Error, timeout_seconds: u64) -> AnalysisError {
    if err.is_timeout() {
        AnalysisError::transient(format!("request timed out after {}s", timeout_seconds))
    } else if err.is_connect() {
        AnalysisError::transient(format!("cannot connect to analysis service: {}", err))
    } else {
        AnalysisError::Unavailable(format!("failed to send request: {}", err))
    }
}

/// Map a non-success status to the analysis taxonomy.
async fn classify_status(response: reqwest::Response) -> AnalysisError {
    let status = response.status();
    let retry_after = retry_after_header(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = format!("API error {}: {}", status, body.trim());
    // 529 is Anthropic's "overloaded".
    if status.is_server_error() || status.as_u16() == 429 || status.as_u16() == 529 {
        AnalysisError::Transient {
            message,
            retry_after,
        }
    } else {
        AnalysisError::Unavailable(message)
    }
}

// ============================================================================
// Anthropic
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_seconds: u64,
}

impl AnthropicClient {
    pub fn new(config: &ModelConfig, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: config.effective_api_url(),
            api_key: api_key.to_string(),
            model: config.name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl AnalysisService for AnthropicClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AnalysisError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("Sending analysis request to {} ({})", self.api_url, self.model);

        let response = self
            .http
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout_seconds))?;

        if !response.status().is_success() {
            return Err(classify_status(response).await);
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Unavailable(format!("failed to parse response: {}", e)))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(AnalysisError::Unavailable(
                "empty response from analysis service".to_string(),
            ));
        }
        Ok(text)
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Ollama chat API client.
pub struct OllamaClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_seconds: u64,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: config.effective_api_url(),
            model: config.name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl AnalysisService for OllamaClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/api/chat", self.api_url);

        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.timeout_seconds))?;

        if !response.status().is_success() {
            return Err(classify_status(response).await);
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Unavailable(format!("failed to parse Ollama response: {}", e)))?;

        Ok(chat_response.message.content)
    }
}
