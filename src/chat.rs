//! Chat completion via the OpenAI Responses API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Role of a message sent to the chat completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the completion request sequence
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Produces an assistant reply from a message sequence
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Complete the conversation; returns the trimmed assistant reply,
    /// which may be empty when the model produced no text output
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// OpenAI Responses API client
#[derive(Debug)]
pub struct OpenAiResponses {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiResponses {
    /// Create a new chat completion client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat completion".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    /// Point the client at a different server (used by tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [ChatMessage],
}

/// Response shape of the Responses API, reduced to the fields we read
///
/// Extraction is a tagged fallback: the nested `output[].content[]` shape
/// first, then the flat `output_text` field, then empty.
#[derive(Debug, Default, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    output_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputPart>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputPart {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesReply {
    fn into_text(self) -> String {
        let nested = self
            .output
            .into_iter()
            .flat_map(|item| item.content)
            .find(|part| part.kind == "output_text" && part.text.as_deref().is_some_and(|t| !t.is_empty()))
            .and_then(|part| part.text);

        nested
            .or(self.output_text)
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

#[async_trait]
impl ChatCompleter for OpenAiResponses {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!(messages = messages.len(), model = %self.model, "requesting chat completion");

        let request = ResponsesRequest {
            model: &self.model,
            input: messages,
        };

        let response = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::Chat(format!("OpenAI failed ({status}): {body}")));
        }

        let reply: ResponsesReply = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse chat completion response");
            e
        })?;

        let text = reply.into_text();
        tracing::info!(chars = text.len(), "chat completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> String {
        serde_json::from_str::<ResponsesReply>(json)
            .unwrap()
            .into_text()
    }

    #[test]
    fn extracts_primary_nested_shape() {
        let text = parse(
            r#"{"output": [{"content": [{"type": "output_text", "text": "Hello there."}]}]}"#,
        );
        assert_eq!(text, "Hello there.");
    }

    #[test]
    fn skips_non_text_parts() {
        let text = parse(
            r#"{"output": [
                {"content": [{"type": "reasoning"}]},
                {"content": [{"type": "output_text", "text": " answer "}]}
            ]}"#,
        );
        assert_eq!(text, "answer");
    }

    #[test]
    fn falls_back_to_flat_output_text() {
        let text = parse(r#"{"output": [], "output_text": "flat reply"}"#);
        assert_eq!(text, "flat reply");
    }

    #[test]
    fn defaults_to_empty_when_no_shape_matches() {
        assert_eq!(parse("{}"), "");
        assert_eq!(parse(r#"{"output": [{"content": []}]}"#), "");
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let msg = ChatMessage::new(MessageRole::System, "be brief");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = OpenAiResponses::new(String::new(), "gpt-4.1-nano".to_string()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
