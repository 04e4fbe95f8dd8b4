//! Voice channel — in-memory mirror of a realtime voice session.
//!
//! The transport (browser WebRTC, realtime API socket, ...) reports events
//! here: a response started, a response completed, an item was
//! acknowledged. The engine reads the resulting state through
//! [`DialogueChannel`].

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use super::dialogue::{ChannelMode, DialogueChannel};

#[derive(Debug, Default)]
struct VoiceState {
    response_active: bool,
    waiters: Vec<oneshot::Sender<()>>,
    acknowledged: HashSet<String>,
}

/// Voice session state shared between the transport and the engine.
#[derive(Debug)]
pub struct VoiceChannel {
    state: Mutex<VoiceState>,
    /// Bumped on every acknowledgement so waiters re-check.
    acks: watch::Sender<u64>,
}

impl Default for VoiceChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceChannel {
    pub fn new() -> Self {
        let (acks, _) = watch::channel(0);
        Self {
            state: Mutex::new(VoiceState::default()),
            acks,
        }
    }

    /// The assistant began streaming a response.
    pub fn response_started(&self) {
        let mut state = self.lock();
        state.response_active = true;
        debug!("Voice response started");
    }

    /// The active response finished (or was cancelled). Wakes every
    /// registered completion waiter.
    pub fn response_completed(&self) {
        let waiters = {
            let mut state = self.lock();
            state.response_active = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), "Voice response completed");
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// The transport confirmed receipt of `item_id`.
    pub fn acknowledge(&self, item_id: impl Into<String>) {
        let item_id = item_id.into();
        debug!(item_id = %item_id, "Voice item acknowledged");
        self.lock().acknowledged.insert(item_id);
        self.acks.send_modify(|n| *n += 1);
    }

    fn lock(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DialogueChannel for VoiceChannel {
    fn name(&self) -> &str {
        "voice"
    }

    fn mode(&self) -> ChannelMode {
        ChannelMode::Voice
    }

    fn is_response_active(&self) -> bool {
        self.lock().response_active
    }

    fn on_response_complete(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.response_active {
            state.waiters.push(tx);
        } else {
            let _ = tx.send(());
        }
        rx
    }

    fn is_acknowledged(&self, item_id: &str) -> bool {
        self.lock().acknowledged.contains(item_id)
    }

    async fn wait_acknowledged(&self, item_id: &str) {
        let mut changes = self.acks.subscribe();
        loop {
            if self.is_acknowledged(item_id) {
                return;
            }
            // Sender lives as long as `self`.
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}
