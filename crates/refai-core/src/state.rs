//! UI-agnostic conversation state
//!
//! This module contains the data structures shared between the relay, the
//! stream consumer and any front end. Nothing here is persisted.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::knowledge::GREETING;

/// Attachments larger than this are dropped before sending.
pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A user-selected file sent along with a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded file contents
    pub data: String,
    pub size_bytes: u64,
}

impl Attachment {
    /// Read a file from disk and encode it.
    ///
    /// Oversized files are still loaded; the size ceiling is applied when the
    /// message is submitted so the user gets a warning there.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow!("Failed to read attachment {:?}: {}", path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Attachment path has no file name: {:?}", path))?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            name,
            mime_type,
            size_bytes: bytes.len() as u64,
            data: STANDARD.encode(&bytes),
        })
    }

    pub fn within_limit(&self) -> bool {
        self.size_bytes <= MAX_ATTACHMENT_BYTES
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// `data:` URL form used by chat-completion content parts
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Split attachments into those under the ceiling and the names of those over it.
pub fn partition_attachments(attachments: Vec<Attachment>) -> (Vec<Attachment>, Vec<String>) {
    let (kept, rejected): (Vec<_>, Vec<_>) =
        attachments.into_iter().partition(Attachment::within_limit);
    (kept, rejected.into_iter().map(|a| a.name).collect())
}

/// A change to the conversation produced while a reply streams in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageUpdate {
    /// Insert a new assistant message with this content
    Started(String),
    /// Replace the content of the last message
    Replaced(String),
}

/// An in-memory conversation, seeded with the assistant greeting
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::assistant(GREETING)],
        }
    }

    /// Start over with only the greeting.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop every message from `index` onwards.
    pub fn truncate(&mut self, index: usize) {
        self.messages.truncate(index);
    }

    pub fn apply(&mut self, update: MessageUpdate) {
        match update {
            MessageUpdate::Started(content) => {
                self.messages.push(ChatMessage::assistant(content));
            }
            MessageUpdate::Replaced(content) => {
                // The last message is the in-progress assistant reply
                if let Some(last) = self.messages.last_mut() {
                    last.content = content;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn attachment(size_bytes: u64) -> Attachment {
        Attachment {
            name: format!("{}.png", size_bytes),
            mime_type: "image/png".to_string(),
            data: String::new(),
            size_bytes,
        }
    }

    #[test]
    fn test_attachment_size_ceiling() {
        let (kept, rejected) = partition_attachments(vec![
            attachment(21 * 1024 * 1024),
            attachment(19 * 1024 * 1024),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].size_bytes, 19 * 1024 * 1024);
        assert_eq!(rejected, vec![format!("{}.png", 21 * 1024 * 1024)]);
    }

    #[test]
    fn test_attachment_exactly_at_ceiling_is_kept() {
        assert!(attachment(MAX_ATTACHMENT_BYTES).within_limit());
        assert!(!attachment(MAX_ATTACHMENT_BYTES + 1).within_limit());
    }

    #[test]
    fn test_attachment_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("court.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"hello").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.name, "court.png");
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.size_bytes, 5);
        assert_eq!(attachment.data, "aGVsbG8=");
        assert_eq!(attachment.data_url(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_message_wire_format() {
        let mut msg = ChatMessage::user("What is traveling?");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "What is traveling?"}));

        msg.attachments.push(attachment(3));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["attachments"][0]["mimeType"], "image/png");
        assert_eq!(json["attachments"][0]["sizeBytes"], 3);
    }

    #[test]
    fn test_conversation_starts_with_greeting() {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::user("hi"));
        conversation.reset();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.messages()[0].role, ChatRole::Assistant);
        assert_eq!(conversation.messages()[0].content, GREETING);
    }

    #[test]
    fn test_apply_updates() {
        let mut conversation = Conversation::new();
        conversation.push(ChatMessage::user("What is traveling?"));
        conversation.apply(MessageUpdate::Started("Trav".to_string()));
        conversation.apply(MessageUpdate::Replaced("Traveling".to_string()));

        assert_eq!(conversation.len(), 3);
        let last = conversation.last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Traveling");
    }
}
