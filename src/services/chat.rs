use super::{ChatClient, ChatMessage};
use crate::{config::ConversationConfig, Error, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Extract the reply text from a Messages API response body
fn reply_text(body: &str) -> Result<String> {
    let response: MessageResponse = serde_json::from_str(body)?;
    let text = response
        .content
        .into_iter()
        .filter(|c| c.content_type == "text")
        .filter_map(|c| c.text)
        .collect::<Vec<_>>()
        .join(" ");

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Service("Empty response from chat API".to_string()));
    }
    Ok(text.to_string())
}

/// Chat client for the Anthropic Messages API
pub struct AnthropicChat {
    client: reqwest::blocking::Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicChat {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built
    pub fn new(api_key: String, config: &ConversationConfig) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::ConfigError("Anthropic API key required for chat".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs_f64(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

impl ChatClient for AnthropicChat {
    fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
        };
        debug!("Chat request with {} messages", messages.len());

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            error!("Chat API error {status}: {body}");
            return Err(Error::Service(format!("Chat API error {status}: {body}")));
        }

        reply_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello!")];
        let request = MessageRequest {
            model: "m",
            max_tokens: 150,
            system: "be brief",
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["system"], "be brief");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["messages"][1]["content"], "Hello!");
    }

    #[test]
    fn test_reply_text() {
        let body = r#"{"id":"msg_1","content":[{"type":"text","text":"Nice to meet you."}],"stop_reason":"end_turn"}"#;
        assert_eq!(reply_text(body).unwrap(), "Nice to meet you.");

        let empty = r#"{"content":[]}"#;
        assert!(matches!(reply_text(empty), Err(Error::Service(_))));
        assert!(reply_text("not json").is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(AnthropicChat::new(String::new(), &ConversationConfig::default()).is_err());
    }
}
