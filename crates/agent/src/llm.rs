use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netpilot_core::config::LlmConfig;
use netpilot_core::domain::conversation::{Message, Role};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        match message.role {
            Role::Tool => Self {
                role: "user".to_string(),
                content: format!(
                    "Output from tool `{}`:\n{}",
                    message.name.as_deref().unwrap_or("unknown"),
                    message.content
                ),
            },
            role => Self { role: role.as_str().to_string(), content: message.content.clone() },
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm response contained no message content")]
    EmptyResponse,
    #[error("llm client is not configured: {0}")]
    NotConfigured(String),
    #[error("all models failed after {attempts} attempts; last error: {last}")]
    Exhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }

    /// Operator-facing explanation of the failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Exhausted { last, .. } => last.user_message(),
            Self::Http { status: 429, .. } => {
                "Rate limit reached. Please wait a moment.".to_string()
            }
            Self::Http { status: 401 | 403, .. } => {
                "Authentication failed. Check GROQ_API_KEY.".to_string()
            }
            Self::Transport(_) => {
                "Could not reach the LLM provider. Check network connectivity.".to_string()
            }
            _ => "An internal error occurred processing your request.".to_string(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Same as [`LlmClient::chat`] but asks the provider for a JSON object reply.
    async fn chat_json(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.chat(messages).await
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    models: Vec<String>,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::NotConfigured("llm.api_key is missing".to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::NotConfigured(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            models: config.model_chain(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(500),
        })
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json: bool,
    ) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http { status: status.as_u16(), body: truncate(&body, 500) });
        }

        let body: ChatCompletionResponse =
            response.json().await.map_err(|error| LlmError::Decode(error.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    async fn complete(&self, messages: &[ChatMessage], json: bool) -> Result<String, LlmError> {
        let mut attempts = 0;
        let mut last_error = LlmError::NotConfigured("no models configured".to_string());

        for model in &self.models {
            for attempt in 0..=self.max_retries {
                attempts += 1;
                tracing::debug!(
                    event_name = "llm.request",
                    model = %model,
                    attempt,
                    messages = messages.len(),
                    json,
                    "sending chat completion"
                );

                match self.send(model, messages, json).await {
                    Ok(content) => return Ok(content),
                    Err(error) if error.is_auth_failure() => return Err(error),
                    Err(error) if error.is_retryable() && attempt < self.max_retries => {
                        tracing::warn!(
                            event_name = "llm.request.retry",
                            model = %model,
                            attempt,
                            error = %error,
                            "transient llm failure, retrying"
                        );
                        tokio::time::sleep(self.retry_backoff * (attempt + 1)).await;
                    }
                    Err(error) => {
                        tracing::warn!(
                            event_name = "llm.request.model_failed",
                            model = %model,
                            error = %error,
                            "model failed, trying next fallback"
                        );
                        last_error = error;
                        break;
                    }
                }
            }
        }

        Err(LlmError::Exhausted { attempts, last: Box::new(last_error) })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.complete(messages, false).await
    }

    async fn chat_json(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.complete(messages, true).await
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for reply in replies {
            client.push(Ok(reply.into()));
        }
        client
    }

    pub fn push(&self, reply: Result<String, LlmError>) {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(messages.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(messages.to_vec()),
        }
        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or(Err(LlmError::EmptyResponse))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
