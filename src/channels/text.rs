//! Text channel — typed chat with no streaming responses.

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::dialogue::{ChannelMode, DialogueChannel};

/// Typed chat. Responses are never "active" and every item counts as
/// acknowledged the moment it is sent.
#[derive(Debug, Default)]
pub struct TextChannel;

impl TextChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DialogueChannel for TextChannel {
    fn name(&self) -> &str {
        "text"
    }

    fn mode(&self) -> ChannelMode {
        ChannelMode::Text
    }

    fn is_response_active(&self) -> bool {
        false
    }

    fn on_response_complete(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        rx
    }

    fn is_acknowledged(&self, _item_id: &str) -> bool {
        true
    }

    async fn wait_acknowledged(&self, _item_id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_resolves_immediately() {
        let channel = TextChannel::new();
        assert!(!channel.is_response_active());
        assert!(channel.on_response_complete().await.is_ok());
        channel.wait_acknowledged("anything").await;
        assert!(channel.is_acknowledged("anything"));
    }
}
