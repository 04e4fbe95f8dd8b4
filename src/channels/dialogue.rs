//! The dialogue channel contract the engine depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// How the user is talking to the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    Text,
    Voice,
}

impl std::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// The slice of a streaming dialogue transport the engine needs.
///
/// Connecting, sending audio and cancelling responses stay with the
/// transport. The engine only asks whether a response is streaming, waits
/// for it to finish, and checks that sent items were acknowledged.
#[async_trait]
pub trait DialogueChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    fn mode(&self) -> ChannelMode;

    /// Whether an assistant response is currently streaming.
    fn is_response_active(&self) -> bool;

    /// Resolves when the active response completes, or immediately when no
    /// response is active. Each call registers its own one-shot waiter.
    fn on_response_complete(&self) -> oneshot::Receiver<()>;

    /// Whether the transport has confirmed receipt of `item_id`.
    fn is_acknowledged(&self, item_id: &str) -> bool;

    /// Wait until `item_id` is acknowledged. Unbounded; callers apply their
    /// own timeout.
    async fn wait_acknowledged(&self, item_id: &str);
}
