//! Client for an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::AiConfig;
use crate::error::{Error, Result};

/// Chat-completions request payload.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Chat-completions client for the configured provider.
pub struct ChatClient {
    client: Client,
    api_url: String,
    api_key: String,
    pub model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    /// Build a client from configuration. Missing credentials or model name
    /// are a configuration error raised here, at the point of use, so
    /// endpoints that never touch the LLM work without them.
    pub fn new(config: &AiConfig) -> Result<Self> {
        let api_key = required(&config.api_key, "AI_API_KEY")?;
        let api_url = required(&config.api_url, "AI_API_URL")?;
        let model = required(&config.model, "AI_MODEL_NAME")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Send one chat completion and return the raw response JSON.
    ///
    /// Non-200 responses become `Upstream` errors carrying the start of the
    /// body; nothing is persisted by this layer.
    pub async fn chat_completions(&self, system_prompt: &str, user_content: &str) -> Result<Value> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            stream: false,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "sending chat completion request");
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("AI request failed: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "AI HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 800)
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| Error::Upstream(format!("AI response is not JSON: {e}")))
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("missing {name}")))
}

/// Extract the assistant message content from an OpenAI-style response.
pub fn extract_message_content(response: &Value) -> Result<String> {
    let choices = response
        .get("choices")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Upstream("AI response missing choices".to_string()))?;

    choices[0]
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Upstream("AI response missing message.content".to_string()))
}

/// Locate the JSON portion of a model reply.
///
/// Strips a wrapping markdown code fence, then takes the span from the first
/// `{` to the last `}` (or `[` to `]` when no object brackets pair up).
/// Best-effort: a reply with multiple JSON blocks, or bracket characters
/// inside string literals, can make this grab the wrong span.
pub fn extract_json_text(raw: &str) -> &str {
    let mut s = raw.trim();

    if s.starts_with("```") {
        let lines: Vec<&str> = s.lines().collect();
        if lines.len() >= 3 && lines[lines.len() - 1].trim_start().starts_with("```") {
            let start = s.find('\n').map(|i| i + 1).unwrap_or(0);
            let end = s.rfind('\n').unwrap_or(s.len());
            if start <= end {
                s = s[start..end].trim();
            }
        }
    }

    if let (Some(start), Some(end)) = (s.find('{'), s.rfind('}')) {
        if end > start {
            return &s[start..=end];
        }
    }
    if let (Some(start), Some(end)) = (s.find('['), s.rfind(']')) {
        if end > start {
            return &s[start..=end];
        }
    }
    s
}

/// Truncate to at most `max` bytes at a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
