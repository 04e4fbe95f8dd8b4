//! External collaborators — the insight extractor and the recommendation
//! generator.
//!
//! Both are model-backed services outside this crate. The engine talks to
//! them only through these traits.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::cards::{SuggestionCard, Vote};
use crate::conversation::{Insight, InsightCandidate, Role, Turn};
use crate::error::ServiceError;
use crate::gate::FetchMode;
use crate::phase::DiscoveryPhase;

pub use http::{HttpInsightExtractor, HttpRecommendationGenerator, JsonEndpoint};

/// One transcript line as sent to a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub role: Role,
    pub text: String,
}

impl From<&Turn> for TranscriptLine {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            text: turn.text.clone(),
        }
    }
}

/// Input for one extraction call.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    pub turns: Vec<TranscriptLine>,
    /// `kind:normalized-value` keys already on file, so the extractor can skip them.
    pub fingerprints: Vec<String>,
}

/// A vote as the generator sees it.
#[derive(Debug, Clone, Serialize)]
pub struct VotedCard {
    pub card_id: String,
    pub title: String,
    pub vote: Vote,
}

/// Input for one recommendation batch.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub phase: DiscoveryPhase,
    pub mode: FetchMode,
    pub insights: Vec<Insight>,
    pub votes: Vec<VotedCard>,
    pub transcript: Vec<TranscriptLine>,
    /// Titles already shown, so the generator avoids repeats.
    pub shown_titles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_text: Option<String>,
    pub max_cards: usize,
}

/// Turns conversation into candidate insights.
#[async_trait]
pub trait InsightExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest)
    -> Result<Vec<InsightCandidate>, ServiceError>;
}

/// Produces ranked suggestion cards.
#[async_trait]
pub trait RecommendationGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
    -> Result<Vec<SuggestionCard>, ServiceError>;
}
