//! Card data model — suggestion cards and the user's reactions to them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// How far a card sits from what the user already described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardDistance {
    #[default]
    Core,
    Adjacent,
    Unexpected,
}

impl std::fmt::Display for CardDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Adjacent => write!(f, "adjacent"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

impl std::str::FromStr for CardDistance {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "adjacent" => Ok(Self::Adjacent),
            "unexpected" => Ok(Self::Unexpected),
            _ => Err(format!("Unknown card distance: {}", s)),
        }
    }
}

/// A recommended option the user can react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionCard {
    /// Card ID. Generator-supplied when present, otherwise a fresh UUID.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub why_it_fits: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub micro_experiments: Vec<String>,
    #[serde(default)]
    pub career_angles: Vec<String>,
    #[serde(default)]
    pub neighbor_territories: Vec<String>,
    /// Confidence score (0.0–1.0).
    #[serde(default)]
    pub confidence: f32,
    /// Generator ranking score.
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub distance: CardDistance,
}

impl SuggestionCard {
    /// Create a card with a fresh ID.
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            summary: summary.into(),
            why_it_fits: Vec::new(),
            next_steps: Vec::new(),
            micro_experiments: Vec::new(),
            career_angles: Vec::new(),
            neighbor_territories: Vec::new(),
            confidence: 0.0,
            score: 0.0,
            distance: CardDistance::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_distance(mut self, distance: CardDistance) -> Self {
        self.distance = distance;
        self
    }
}

/// The user's reaction to a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Vote {
    Saved,
    Maybe,
    Skipped,
}

impl TryFrom<i8> for Vote {
    type Error = SessionError;
    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Saved),
            0 => Ok(Self::Maybe),
            -1 => Ok(Self::Skipped),
            other => Err(SessionError::InvalidVote { value: other }),
        }
    }
}

impl From<Vote> for i8 {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Saved => 1,
            Vote::Maybe => 0,
            Vote::Skipped => -1,
        }
    }
}

/// Votes keyed by card ID. A card with no entry is pending review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteBook {
    votes: HashMap<String, Vote>,
}

impl VoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or clear, with `None`) a vote. Returns the previous vote.
    pub fn record(&mut self, card_id: &str, vote: Option<Vote>) -> Option<Vote> {
        match vote {
            Some(v) => self.votes.insert(card_id.to_string(), v),
            None => self.votes.remove(card_id),
        }
    }

    pub fn get(&self, card_id: &str) -> Option<Vote> {
        self.votes.get(card_id).copied()
    }

    pub fn has_vote(&self, card_id: &str) -> bool {
        self.votes.contains_key(card_id)
    }

    pub fn count(&self) -> usize {
        self.votes.len()
    }

    pub fn saved_count(&self) -> usize {
        self.votes.values().filter(|v| **v == Vote::Saved).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Vote)> {
        self.votes.iter().map(|(id, vote)| (id.as_str(), *vote))
    }

    /// Cards among `cards` that have no vote yet.
    pub fn unreviewed<'a>(&self, cards: &'a [SuggestionCard]) -> Vec<&'a SuggestionCard> {
        cards.iter().filter(|c| !self.has_vote(&c.id)).collect()
    }
}
