//! Client for the upstream chat-completions gateway

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::RelayError;
use crate::knowledge::system_prompt;
use crate::state::{ChatMessage, ChatRole};

/// Environment variable holding the gateway credential.
pub const API_KEY_VAR: &str = "AI_GATEWAY_API_KEY";

pub const DEFAULT_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
/// Low temperature keeps rule citations consistent between answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    stream: bool,
    temperature: f32,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    api_key: Option<String>,
    url: String,
    model: String,
    temperature: f32,
}

impl GatewayClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start a streamed completion for `messages`, with the system prompt prepended.
    ///
    /// On success the response body has not been read yet; it is an SSE stream.
    pub async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<reqwest::Response, RelayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RelayError::MissingCredential(API_KEY_VAR))?;

        let mut upstream = Vec::with_capacity(messages.len() + 1);
        upstream.push(json!({ "role": "system", "content": system_prompt() }));
        upstream.extend(messages.iter().map(upstream_message));

        let request = CompletionRequest {
            model: &self.model,
            messages: upstream,
            stream: true,
            temperature: self.temperature,
        };

        debug!("Forwarding {} messages to {}", messages.len(), self.model);
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let err = RelayError::from_status(status, text);
            if let RelayError::Upstream { status, body } = &err {
                error!("AI gateway error: {} {}", status, body);
            } else {
                warn!("AI gateway refused request: {}", err);
            }
            return Err(err);
        }

        Ok(response)
    }
}

/// Convert a conversation message to the chat-completions wire shape.
///
/// Plain messages stay `{role, content}`; messages with attachments become a
/// content-part array.
pub fn upstream_message(message: &ChatMessage) -> Value {
    let role = message.role.as_str();
    let attachments: Vec<_> = message
        .attachments
        .iter()
        .filter(|a| {
            if !a.within_limit() {
                warn!("Dropping oversized attachment {} ({} bytes)", a.name, a.size_bytes);
            }
            a.within_limit()
        })
        .collect();

    if attachments.is_empty() || message.role == ChatRole::Assistant {
        return json!({ "role": role, "content": message.content });
    }

    let mut parts = vec![json!({ "type": "text", "text": message.content })];
    for attachment in attachments {
        if attachment.is_image() {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": attachment.data_url() }
            }));
        } else {
            parts.push(json!({
                "type": "file",
                "file": { "filename": attachment.name, "file_data": attachment.data_url() }
            }));
        }
    }

    json!({ "role": role, "content": parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Attachment, MAX_ATTACHMENT_BYTES};

    fn attachment(name: &str, mime_type: &str, size_bytes: u64) -> Attachment {
        Attachment {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            data: "AAAA".to_string(),
            size_bytes,
        }
    }

    #[test]
    fn test_plain_message() {
        let value = upstream_message(&ChatMessage::user("What is a charge?"));
        assert_eq!(value, json!({"role": "user", "content": "What is a charge?"}));
    }

    #[test]
    fn test_message_with_attachments() {
        let mut message = ChatMessage::user("Is this court legal?");
        message.attachments = vec![
            attachment("court.jpg", "image/jpeg", 10),
            attachment("rules.pdf", "application/pdf", 10),
            attachment("huge.png", "image/png", MAX_ATTACHMENT_BYTES + 1),
        ];

        let value = upstream_message(&message);
        let parts = value["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({"type": "text", "text": "Is this court legal?"}));
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
        assert_eq!(parts[2]["file"]["filename"], "rules.pdf");
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let client = GatewayClient::new(Some(""));
        assert!(!client.has_credential());
        let err = client.stream_chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential(API_KEY_VAR)));
    }
}
