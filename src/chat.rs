//! Text-generation collaborator.
//!
//! [`ChatModel`] is the capability handle used by metadata inference
//! (non-streamed completion) and answer generation (fragment stream); tests
//! substitute fakes. [`HttpChatModel`] talks to an OpenAI-compatible chat
//! completions endpoint, parsing the `data:` event lines of the streamed
//! response incrementally.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::models::ChatMessage;

/// A stream of generated text fragments, in generation order.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single non-streamed completion.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Streamed completion. Dropping the returned stream abandons the
    /// underlying response body, so no further fragments are requested.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// OpenAI-compatible chat client. The API key comes from `OPENAI_API_KEY`;
/// an unset key omits the Authorization header for keyless local endpoints.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: ChatConfig,
    api_key: Option<String>,
}

impl HttpChatModel {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
        })
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": stream,
        });

        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.request(messages, false).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat API error {}: {}", status, body)));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Chat("empty completion response".to_string()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let response = self.request(messages, true).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Chat(format!("chat API error {}: {}", status, body)));
        }

        // Byte chunks may split event lines anywhere; buffer partial lines
        // across chunks and emit a fragment per complete delta.
        let mut buffer = String::new();
        let stream = response
            .bytes_stream()
            .map(move |result| match result {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    let mut fragments = Vec::new();
                    while let Some(line_end) = buffer.find('\n') {
                        let line = buffer[..line_end].trim().to_string();
                        buffer.drain(..=line_end);
                        if let Some(fragment) = parse_event_line(&line) {
                            fragments.push(Ok(fragment));
                        }
                    }
                    fragments
                }
                Err(e) => vec![Err(Error::Chat(format!("stream error: {}", e)))],
            })
            .flat_map(futures_util::stream::iter);

        Ok(stream.boxed())
    }
}

/// Parse one `data:` event line into a content fragment, if it carries one.
fn parse_event_line(line: &str) -> Option<String> {
    if line.is_empty() || line == "data: [DONE]" {
        return None;
    }
    let data = line.strip_prefix("data: ")?;
    let parsed: StreamResponse = serde_json::from_str(data).ok()?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_line_with_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_event_line(line), Some("Hel".to_string()));
    }

    #[test]
    fn test_parse_event_line_done_marker() {
        assert_eq!(parse_event_line("data: [DONE]"), None);
        assert_eq!(parse_event_line(""), None);
    }

    #[test]
    fn test_parse_event_line_role_only_delta() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_event_line(line), None);
    }

    #[test]
    fn test_parse_event_line_garbage_ignored() {
        assert_eq!(parse_event_line("data: {not json"), None);
        assert_eq!(parse_event_line(": keepalive"), None);
    }
}
