//! Gate hysteresis state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rubric::RubricSignature;

/// The last deepening question asked, and how much signal existed then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepeningMark {
    pub label: String,
    pub insight_count: usize,
}

/// Everything the gate remembers between evaluations.
///
/// Plain data so it can be snapshotted, logged and restored in tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateState {
    /// Consecutive user-turn evaluations that read `blocked`.
    pub blocked_streak: u32,
    /// Rubric signature at the last ready fetch.
    pub last_ready_signature: Option<RubricSignature>,
    pub user_turns_since_suggestion: u32,
    /// When the last batch was delivered.
    pub last_delivery_at: Option<DateTime<Utc>>,
    /// When the user last voted on a card.
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub backlog_suppressed: bool,
    pub nudge_sent: bool,
    /// An explicit ideas request was already answered with a batch.
    pub request_served: bool,
    pub deepening: Option<DeepeningMark>,
}

impl GateState {
    /// Most recent of delivery and interaction.
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        match (self.last_delivery_at, self.last_interaction_at) {
            (Some(d), Some(i)) => Some(d.max(i)),
            (d, i) => d.or(i),
        }
    }

    /// Whether a deepening question about `label` may be asked given
    /// `insight_count` insights on file.
    pub fn may_deepen(&self, label: &str, insight_count: usize) -> bool {
        match &self.deepening {
            None => true,
            Some(mark) => mark.label != label || insight_count > mark.insight_count,
        }
    }
}
