//! Conversation state: the turn log and the insight store built from it.

pub mod insights;
pub mod turns;

pub use insights::{
    Insight, InsightCandidate, InsightKind, InsightSource, InsightStore, MergeReport,
    normalize_value,
};
pub use turns::{AppendOutcome, Role, Turn, TurnLog};
