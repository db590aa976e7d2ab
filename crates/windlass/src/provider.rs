//! The LLM boundary: a trait the agent loop calls into, plus a concrete
//! HTTP client for OpenAI-compatible chat-completions endpoints.
//!
//! The loop never talks HTTP directly — it sends a conversation and a tool
//! schema list through [`ModelClient`] and gets back a [`ModelTurn`]: text,
//! tool calls, and token usage. Provider failures are a closed taxonomy
//! ([`ProviderError`]) so callers can tell a timeout from a rate limit from
//! a malformed response.

use crate::{Message, ToolCall, ToolDef};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default per-request timeout for model calls.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(300);

/// Default OpenRouter endpoint.
pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

// ── Usage ──────────────────────────────────────────────────────────

/// Token usage reported by the provider for a single call.
///
/// Cache-read tokens are tracked separately from regular input tokens
/// because providers bill them at a discounted rate; cache-write tokens
/// carry a premium. Providers that don't support prompt caching report
/// zeros for both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Provider-level failures, surfaced to the caller as a failed turn.
///
/// The core does not retry; retry policy belongs to the client
/// implementation behind [`ModelClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The call exceeded its timeout.
    Timeout,
    /// The provider rejected the request for rate-limiting reasons.
    RateLimited(String),
    /// The provider returned an error response.
    Api(String),
    /// The response body could not be parsed.
    Malformed(String),
    /// The request could not be sent or the response could not be read.
    Transport(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Timeout => write!(f, "model call timed out"),
            ProviderError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            ProviderError::Api(msg) => write!(f, "API error: {msg}"),
            ProviderError::Malformed(msg) => write!(f, "malformed response: {msg}"),
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ── ModelClient ────────────────────────────────────────────────────

/// A single model response: text, tool calls, and usage.
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

/// The boundary trait between the agent loop and the model provider.
///
/// Implementations must fail with a distinguishable error rather than hang;
/// the loop additionally wraps every call in its own timeout. Uses a boxed
/// future so that the trait is dyn-compatible (object-safe).
pub trait ModelClient: Send + Sync {
    fn send<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDef],
    ) -> BoxFuture<'a, Result<ModelTurn, ProviderError>>;
}

// ── Wire types ─────────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "is_zero_u32")]
    max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    temperature: f32,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDef],
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}
fn no_tools(tools: &&[ToolDef]) -> bool {
    tools.is_empty()
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Usage block across provider dialects. OpenAI-compatible endpoints report
/// cached input inside `prompt_tokens_details`; Anthropic-style endpoints
/// report cache creation/read as top-level fields.
#[derive(Deserialize, Debug, Default)]
struct RawUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    prompt_tokens_details: Option<RawPromptDetails>,
}

#[derive(Deserialize, Debug, Default)]
struct RawPromptDetails {
    cached_tokens: Option<u64>,
}

impl RawUsage {
    fn into_usage(self) -> TokenUsage {
        let cached = self.cache_read_input_tokens.or_else(|| {
            self.prompt_tokens_details
                .as_ref()
                .and_then(|d| d.cached_tokens)
        });
        TokenUsage {
            input_tokens: self.prompt_tokens.unwrap_or(0),
            output_tokens: self.completion_tokens.unwrap_or(0),
            cache_write_tokens: self.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: cached.unwrap_or(0),
        }
    }
}

// ── ChatClient ─────────────────────────────────────────────────────

/// Async HTTP client for OpenAI-compatible chat completions endpoints.
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    /// Create a new client for the given model against the default endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        Self::with_url(api_key, model, OPENROUTER_URL)
    }

    /// Create a new client against a custom endpoint URL.
    pub fn with_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("windlass/0.1")
            .timeout(DEFAULT_LLM_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: url.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.0,
        })
    }

    /// Override the per-response output token limit.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// The model this client targets.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<ModelTurn, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools,
        };

        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}",
            self.model,
            messages.len(),
            tools.len(),
            self.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited(text));
        }
        if !status.is_success() {
            return Err(ProviderError::Api(format!("HTTP {status}: {text}")));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(ProviderError::Api(err.message));
        }

        let usage = parsed.usage.map(RawUsage::into_usage);
        if let Some(ref u) = usage {
            debug!(
                "Token usage: input={}, output={}, cache_write={}, cache_read={}",
                u.input_tokens, u.output_tokens, u.cache_write_tokens, u.cache_read_tokens,
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        match choice {
            Some(c) => Ok(ModelTurn {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                usage,
            }),
            None => Ok(ModelTurn {
                content: None,
                tool_calls: vec![],
                usage,
            }),
        }
    }
}

impl ModelClient for ChatClient {
    fn send<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDef],
    ) -> BoxFuture<'a, Result<ModelTurn, ProviderError>> {
        Box::pin(self.chat(messages, tools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_parses_openai_cached_tokens() {
        let raw: RawUsage = serde_json::from_str(
            r#"{"prompt_tokens": 1000, "completion_tokens": 50,
                "prompt_tokens_details": {"cached_tokens": 800}}"#,
        )
        .unwrap();
        let usage = raw.into_usage();
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.output_tokens, 50);
        assert_eq!(usage.cache_read_tokens, 800);
        assert_eq!(usage.cache_write_tokens, 0);
    }

    #[test]
    fn usage_parses_anthropic_cache_fields() {
        let raw: RawUsage = serde_json::from_str(
            r#"{"prompt_tokens": 1000, "completion_tokens": 50,
                "cache_creation_input_tokens": 200, "cache_read_input_tokens": 700}"#,
        )
        .unwrap();
        let usage = raw.into_usage();
        assert_eq!(usage.cache_write_tokens, 200);
        assert_eq!(usage.cache_read_tokens, 700);
    }

    #[test]
    fn usage_missing_fields_default_to_zero() {
        let raw: RawUsage = serde_json::from_str("{}").unwrap();
        assert_eq!(raw.into_usage(), TokenUsage::default());
    }

    #[test]
    fn provider_error_display_is_distinguishable() {
        assert_eq!(ProviderError::Timeout.to_string(), "model call timed out");
        assert!(
            ProviderError::RateLimited("slow down".into())
                .to_string()
                .contains("rate limited")
        );
        assert!(
            ProviderError::Malformed("bad json".into())
                .to_string()
                .contains("malformed")
        );
    }

    #[test]
    fn request_skips_empty_tools() {
        let messages = vec![Message::user("hi")];
        let req = ChatRequest {
            model: "test-model",
            messages: &messages,
            max_tokens: 100,
            temperature: 0.0,
            tools: &[],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
    }
}
