//! Suggestion cards — model, votes, batch merging and reveal sequencing.

pub mod generator;
pub mod merge;
pub mod model;
pub mod reveal;
pub mod timeline;

pub use generator::parse_cards;
pub use merge::{BatchMerge, DeliveredCards, merge_batch, normalize_title};
pub use model::{CardDistance, SuggestionCard, Vote, VoteBook};
pub use reveal::{CardRevealController, RevealPlan, RevealReason, RevealRequest, Revealed};
pub use timeline::{Anchor, Timeline, TimelineEntry};
