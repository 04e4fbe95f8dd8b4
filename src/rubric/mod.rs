//! Engagement/readiness rubric.
//!
//! The rubric is a point-in-time heuristic reading of how the conversation is
//! going. It is recomputed wholesale after every relevant change; downstream
//! consumers only react when the reading actually differs (see
//! [`RubricSnapshot::signature`]).

pub mod patterns;
pub mod scorer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use scorer::{RubricScorer, RubricUpdate, ScoreInput};

/// How the user is engaging with the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngagementStyle {
    LeaningIn,
    Hesitant,
    #[default]
    Blocked,
    SeekingOptions,
}

impl EngagementStyle {
    /// Blocked or hesitant: the conversation is not flowing.
    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Blocked | Self::Hesitant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnergyLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// Where the user is on the explore → decide arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessBias {
    #[default]
    Exploring,
    SeekingOptions,
    Deciding,
}

/// Whether there is enough context to generate cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessStatus {
    #[default]
    Blocked,
    ContextLight,
    Ready,
}

impl std::fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "blocked"),
            Self::ContextLight => write!(f, "context-light"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Something still missing before cards are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessGap {
    Interest,
    Strength,
    Aspiration,
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CardReadiness {
    #[serde(default)]
    pub status: ReadinessStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<ReadinessGap>,
}

/// A point-in-time rubric reading.
///
/// Every field defaults to the most conservative value, so a partial or
/// absent snapshot makes the gates fail closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricSnapshot {
    #[serde(default)]
    pub engagement_style: EngagementStyle,
    /// 0..=3
    #[serde(default)]
    pub context_depth: u8,
    #[serde(default)]
    pub energy_level: EnergyLevel,
    #[serde(default)]
    pub readiness_bias: ReadinessBias,
    #[serde(default)]
    pub explicit_ideas_request: bool,
    #[serde(default)]
    pub card_readiness: CardReadiness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl RubricSnapshot {
    /// The snapshot minus its timestamp. Two readings with equal signatures
    /// are the same reading.
    pub fn signature(&self) -> RubricSignature {
        RubricSignature {
            engagement_style: self.engagement_style,
            context_depth: self.context_depth,
            energy_level: self.energy_level,
            readiness_bias: self.readiness_bias,
            explicit_ideas_request: self.explicit_ideas_request,
            card_readiness: self.card_readiness.clone(),
        }
    }

    pub fn status(&self) -> ReadinessStatus {
        self.card_readiness.status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ReadinessStatus::Ready
    }
}

/// Timestamp-free view of a snapshot used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RubricSignature {
    pub engagement_style: EngagementStyle,
    pub context_depth: u8,
    pub energy_level: EnergyLevel,
    pub readiness_bias: ReadinessBias,
    pub explicit_ideas_request: bool,
    pub card_readiness: CardReadiness,
}
