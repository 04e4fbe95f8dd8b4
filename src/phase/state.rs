//! Discovery phases and their legal transitions.

use serde::{Deserialize, Serialize};

/// The stages of the guided-discovery conversation.
///
/// Progresses linearly: Warmup → StoryMining → PatternMapping →
/// OptionSeeding → Commitment, with one regression edge from Commitment
/// back to PatternMapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryPhase {
    #[default]
    Warmup,
    StoryMining,
    PatternMapping,
    OptionSeeding,
    Commitment,
}

impl DiscoveryPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: DiscoveryPhase) -> bool {
        use DiscoveryPhase::*;
        matches!(
            (self, target),
            (Warmup, StoryMining)
                | (StoryMining, PatternMapping)
                | (PatternMapping, OptionSeeding)
                | (OptionSeeding, Commitment)
                | (Commitment, PatternMapping)
        )
    }
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Warmup => "warmup",
            Self::StoryMining => "story-mining",
            Self::PatternMapping => "pattern-mapping",
            Self::OptionSeeding => "option-seeding",
            Self::Commitment => "commitment",
        };
        write!(f, "{s}")
    }
}
