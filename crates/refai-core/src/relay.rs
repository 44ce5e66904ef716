//! Client for the RefAI relay endpoint

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::RelayError;
use crate::state::{ChatMessage, MessageUpdate};
use crate::stream::consume_stream;

/// Path of the relay function, relative to the relay base URL.
pub const RELAY_PATH: &str = "/functions/v1/basketball-chat";

/// Body accepted by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// Body of every relay error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
    client_key: String,
}

impl RelayClient {
    pub fn new(base_url: &str, client_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_key: client_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, RELAY_PATH)
    }

    /// Post the conversation and return the still-unread SSE response.
    pub async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, RelayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.client_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            error!("Relay returned {}: {}", status, body);
            return Err(RelayError::from_status(status, body));
        }

        Ok(response)
    }

    /// Send one turn and stream the reply, handing every update to `on_update`.
    ///
    /// Returns the complete assistant text.
    pub async fn stream_turn<F>(&self, request: &ChatRequest, on_update: F) -> Result<String, RelayError>
    where
        F: FnMut(MessageUpdate),
    {
        let response = self.send(request).await?;
        let content = consume_stream(response.bytes_stream(), on_update).await?;
        debug!("Streamed reply of {} chars", content.chars().count());
        Ok(content)
    }
}
