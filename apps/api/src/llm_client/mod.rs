//! LLM Client: the single point of entry for all Claude API calls in Placard.
//!
//! ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
//! Pipeline code depends on the `TextGenerator` trait, never on `LlmClient` itself.
//!
//! One call per invocation, no internal retries: retry policy lives in
//! `generation::retry` and is applied by the callers that need it.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ServiceError;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for authoring and judging.
pub const MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A request to the generative text service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: MODEL.to_string(),
            messages,
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// The generative text service capability, injected into every pipeline stage.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the text of the completion, or a typed failure.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Concatenates all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Splits role-tagged messages into Anthropic's separate system field and turn list.
fn split_system<'a>(messages: &'a [ChatMessage]) -> (Option<String>, Vec<AnthropicMessage<'a>>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let turns = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(AnthropicMessage {
                role: "user",
                content: &m.content,
            }),
            Role::Assistant => Some(AnthropicMessage {
                role: "assistant",
                content: &m.content,
            }),
        })
        .collect();

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, turns)
}

/// The Anthropic Messages API client. Cheap to clone; the inner HTTP client
/// pools connections across calls.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let (system, messages) = split_system(&request.messages);
        let request_body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("LLM API returned {}: {}", status, message);
            return Err(ServiceError::from_status(status.as_u16(), message));
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        if llm_response.stop_reason.as_deref() == Some("refusal") {
            return Err(ServiceError::ContentPolicy(
                "model refused to complete the request".to_string(),
            ));
        }

        Ok(llm_response.text().trim().to_string())
    }
}

const FENCE: &str = "```";

/// Removes a leading ```lang opening fence and a trailing ``` closing fence.
/// Everything between them is returned byte-for-byte, line endings included.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text;

    let leading = body.trim_start();
    if let Some(after_fence) = leading.strip_prefix(FENCE) {
        let tag_len = after_fence
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
            .unwrap_or(after_fence.len());
        let rest = &after_fence[tag_len..];
        body = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest);
    }

    let trailing = body.trim_end();
    if let Some(before_fence) = trailing.strip_suffix(FENCE) {
        body = before_fence
            .strip_suffix("\r\n")
            .or_else(|| before_fence.strip_suffix('\n'))
            .unwrap_or(before_fence);
    }

    body
}
