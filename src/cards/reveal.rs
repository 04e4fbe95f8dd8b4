//! Card reveal controller — sequences card delivery into the timeline.
//!
//! Cards must not appear in the middle of a streaming voice response, so
//! reveals queue up while one is active and flush when it completes. Text
//! mode flushes after a short delay so the assistant's acknowledgement
//! renders first.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::channels::{ChannelMode, DialogueChannel};

use super::model::SuggestionCard;
use super::timeline::{Anchor, Timeline};

/// Why a batch is being revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealReason {
    /// Newly generated cards.
    Fresh,
    /// Unreviewed cards shown again by the backlog guard.
    Resurface,
}

/// A batch of cards waiting to be inserted at an anchor.
#[derive(Debug, Clone)]
pub struct RevealRequest {
    pub anchor: Anchor,
    pub cards: Vec<SuggestionCard>,
    pub reason: RevealReason,
}

/// What the caller must do after queueing a reveal.
#[derive(Debug)]
pub enum RevealPlan {
    /// Flush right away.
    FlushNow,
    /// Flush once the delay has elapsed.
    FlushAfter(Duration),
    /// Flush when the receiver resolves (the active response completed).
    AwaitCompletion(oneshot::Receiver<()>),
    /// A flush is already scheduled and will pick this request up.
    AlreadyScheduled,
}

/// A batch that landed in the timeline.
#[derive(Debug, Clone)]
pub struct Revealed {
    pub anchor: Anchor,
    pub reason: RevealReason,
    pub cards: Vec<SuggestionCard>,
}

/// Single FIFO of pending reveals with at most one scheduled flush.
#[derive(Debug)]
pub struct CardRevealController {
    pending: VecDeque<RevealRequest>,
    flush_scheduled: bool,
    text_delay: Duration,
}

impl CardRevealController {
    pub fn new(text_delay: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            flush_scheduled: false,
            text_delay,
        }
    }

    /// Queue `request` and decide when it may be flushed.
    pub fn reveal(&mut self, request: RevealRequest, channel: &dyn DialogueChannel) -> RevealPlan {
        debug!(
            anchor = ?request.anchor,
            cards = request.cards.len(),
            reason = ?request.reason,
            "Queueing card reveal"
        );
        self.pending.push_back(request);

        if self.flush_scheduled {
            return RevealPlan::AlreadyScheduled;
        }

        match channel.mode() {
            ChannelMode::Voice if channel.is_response_active() => {
                self.flush_scheduled = true;
                info!(
                    channel = channel.name(),
                    "Deferring card reveal until the active response completes"
                );
                RevealPlan::AwaitCompletion(channel.on_response_complete())
            }
            ChannelMode::Voice => RevealPlan::FlushNow,
            ChannelMode::Text => {
                self.flush_scheduled = true;
                RevealPlan::FlushAfter(self.text_delay)
            }
        }
    }

    /// Drain every pending request into `timeline`, oldest first.
    ///
    /// Cards already present at their anchor are skipped, so re-running a
    /// flush is harmless.
    pub fn flush(&mut self, timeline: &mut Timeline) -> Vec<Revealed> {
        self.flush_scheduled = false;
        let mut revealed = Vec::new();
        while let Some(request) = self.pending.pop_front() {
            let inserted = timeline.insert(request.anchor, &request.cards);
            if inserted.is_empty() {
                continue;
            }
            info!(
                anchor = ?request.anchor,
                count = inserted.len(),
                reason = ?request.reason,
                "Revealed cards"
            );
            revealed.push(Revealed {
                anchor: request.anchor,
                reason: request.reason,
                cards: inserted,
            });
        }
        revealed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }
}
