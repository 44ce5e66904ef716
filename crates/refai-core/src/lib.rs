pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod knowledge;
pub mod relay;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use backend::{AuthSession, BackendClient, BackendError, SubscriptionStatus};
pub use chat::{ChatSession, Notification, NotificationKind};
pub use config::Config;
pub use error::RelayError;
pub use gate::{Gate, SubscriptionState, SUBSCRIPTION_POLL_INTERVAL};
pub use gateway::GatewayClient;
pub use relay::{ChatRequest, ErrorBody, RelayClient, RELAY_PATH};
pub use state::{Attachment, ChatMessage, ChatRole, Conversation, MessageUpdate, MAX_ATTACHMENT_BYTES};
pub use stream::{consume, consume_stream, Frame, StreamConsumer};
