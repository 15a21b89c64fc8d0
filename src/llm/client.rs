//! Chat-completions client with structured (JSON) responses.
//!
//! Works against any OpenAI-compatible endpoint, which covers the
//! hosted providers as well as local inference servers.

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration for one model handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL (up to but excluding `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier passed through to the endpoint.
    pub model: String,
    /// Bearer token, when the endpoint requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Input budget in tokens; prompts are truncated to fit.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_max_input_tokens() -> usize {
    32_000
}
fn default_timeout_secs() -> u64 {
    300
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            max_input_tokens: default_max_input_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("request timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

impl From<LlmError> for crate::models::StageError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(msg) => Self::Timeout(msg),
            LlmError::Parse(msg) => Self::Parse(msg),
            other => Self::External(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'r> {
    model: &'r str,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Content,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Content {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client bound to one model.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn max_input_tokens(&self) -> usize {
        self.config.max_input_tokens
    }

    /// Ask for a JSON response matching `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<T, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: Content::Text(system_prompt.to_string()),
                },
                Message {
                    role: "user",
                    content: Content::Text(user_prompt.to_string()),
                },
            ],
            temperature,
            max_tokens,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let content = self.call(&request).await?;
        let cleaned = strip_code_fences(&content);
        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(format!("{e}: {cleaned}")))
    }

    /// Describe an image, returning the model's plain-text answer.
    pub async fn describe_image(
        &self,
        user_prompt: &str,
        image: &[u8],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(image));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![Message {
                role: "user",
                content: Content::Parts(vec![
                    Part::Text {
                        text: user_prompt.to_string(),
                    },
                    Part::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ]),
            }],
            temperature,
            max_tokens,
            response_format: None,
        };
        let content = self.call(&request).await?;
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            return Err(LlmError::Parse("empty image description".to_string()));
        }
        Ok(trimmed)
    }

    async fn call(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(model = %self.config.model, %url, "llm request");

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::Parse("empty completion".to_string()))
    }
}

/// Models wrap JSON in markdown fences more often than not.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}
