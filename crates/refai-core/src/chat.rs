//! Chat turn lifecycle shared by every front end
//!
//! A turn is: submit (push the user message, lock input), stream (apply
//! updates), then either finish or fail. Failing rolls the conversation back
//! to how it was before the submit so the question can simply be asked again.

use tracing::{info, warn};

use crate::error::RelayError;
use crate::relay::ChatRequest;
use crate::state::{partition_attachments, Attachment, ChatMessage, Conversation, MessageUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

/// A toast-style message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: &str, description: &str) -> Self {
        Self::new(NotificationKind::Info, title, description)
    }

    pub fn warning(title: &str, description: &str) -> Self {
        Self::new(NotificationKind::Warning, title, description)
    }

    pub fn error(title: &str, description: &str) -> Self {
        Self::new(NotificationKind::Error, title, description)
    }

    fn new(kind: NotificationKind, title: &str, description: &str) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    /// What the user is told when a turn fails
    pub fn for_relay_error(err: &RelayError) -> Self {
        match err {
            RelayError::RateLimited => Self::error(
                "Rate Limit Exceeded",
                "Too many requests. Please try again in a moment.",
            ),
            RelayError::PaymentRequired => Self::error(
                "Credits Exhausted",
                "AI credits have been exhausted. Please add credits to continue.",
            ),
            _ => Self::error("Error", "Failed to get response. Please try again."),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatSession {
    conversation: Conversation,
    loading: bool,
    /// Index of the user message of the turn in flight
    pending_turn: Option<usize>,
    notifications: Vec<Notification>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    /// Input is disabled while this is true.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Start a fresh conversation. Refused while a reply is streaming.
    pub fn new_chat(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.conversation.reset();
        true
    }

    /// Begin a turn.
    ///
    /// Returns the request to send, or `None` when nothing was submitted:
    /// a turn is already in flight, or there is neither text nor a usable
    /// attachment.
    pub fn submit(&mut self, input: &str, attachments: Vec<Attachment>) -> Option<ChatRequest> {
        if self.loading {
            return None;
        }

        let (attachments, rejected) = partition_attachments(attachments);
        for name in &rejected {
            warn!("Attachment {} exceeds the size limit", name);
            self.notify(Notification::warning(
                "File too large",
                &format!("{} exceeds the 20 MB limit and was not attached.", name),
            ));
        }

        let text = input.trim();
        if text.is_empty() && attachments.is_empty() {
            return None;
        }

        let mut message = ChatMessage::user(text);
        message.attachments = attachments;

        self.pending_turn = Some(self.conversation.len());
        self.conversation.push(message);
        self.loading = true;
        info!("Submitting turn with {} messages", self.conversation.len());

        Some(ChatRequest {
            messages: self.conversation.messages().to_vec(),
        })
    }

    pub fn apply(&mut self, update: MessageUpdate) {
        self.conversation.apply(update);
    }

    /// The reply stream ended normally.
    pub fn finish_turn(&mut self) {
        self.loading = false;
        self.pending_turn = None;
    }

    /// The turn failed: remove the question (and any partial reply) and tell the user.
    pub fn fail_turn(&mut self, err: &RelayError) {
        warn!("Chat turn failed: {}", err);
        if let Some(index) = self.pending_turn.take() {
            self.conversation.truncate(index);
        }
        self.notify(Notification::for_relay_error(err));
        self.loading = false;
    }
}
