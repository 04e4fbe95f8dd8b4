//! Session aggregate — all per-conversation state behind pure reducers.
//!
//! Nothing here awaits. The engine locks the session, calls a reducer,
//! releases the lock, and only then talks to collaborators, so each reducer
//! can be exercised directly in tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cards::{
    Anchor, BatchMerge, CardRevealController, DeliveredCards, RevealPlan, RevealRequest,
    Revealed, SuggestionCard, Timeline, TimelineEntry, Vote, VoteBook, merge_batch,
};
use crate::channels::DialogueChannel;
use crate::collaborators::{ExtractionRequest, GenerationRequest, TranscriptLine, VotedCard};
use crate::config::{EngineConfig, PhaseConfig};
use crate::conversation::{
    AppendOutcome, Insight, InsightCandidate, InsightKind, InsightStore, MergeReport, Turn,
    TurnLog,
};
use crate::error::SessionError;
use crate::gate::{FetchMode, GateDecision, GateInput, GateOutcome, GateTrigger, SuggestionGate};
use crate::phase::{self, DiscoveryPhase, PhaseDecision, PhaseInput};
use crate::rubric::{RubricScorer, RubricSnapshot, ScoreInput};

/// What a refresh pass changed.
#[derive(Debug, Clone)]
pub struct Refresh {
    pub rubric_changed: bool,
    /// Phase before the pass.
    pub previous_phase: DiscoveryPhase,
    pub phase: PhaseDecision,
}

impl Refresh {
    pub fn phase_changed(&self) -> bool {
        self.phase.changed_from(self.previous_phase)
    }
}

/// One conversation's state.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub turns: TurnLog,
    pub insights: InsightStore,
    pub rubric: RubricSnapshot,
    pub phase: DiscoveryPhase,
    pub phase_rationale: Vec<String>,
    /// The last phase evaluation asked for a teaser card.
    pub teaser_requested: bool,
    /// Current card set, voted cards first.
    pub cards: Vec<SuggestionCard>,
    pub votes: VoteBook,
    /// Every card delivered so far, including ones later batches dropped.
    pub delivered: DeliveredCards,
    /// Distinct cards delivered over the session.
    pub suggestion_count: usize,
    pub gate: SuggestionGate,
    pub last_decision: Option<GateDecision>,
    pub timeline: Timeline,
    pub reveal: CardRevealController,
    scorer: RubricScorer,
    phase_config: PhaseConfig,
    transcript_turns: usize,
}

impl Session {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: TurnLog::new(),
            insights: InsightStore::new(),
            rubric: RubricSnapshot::default(),
            phase: DiscoveryPhase::default(),
            phase_rationale: Vec::new(),
            teaser_requested: false,
            cards: Vec::new(),
            votes: VoteBook::new(),
            delivered: DeliveredCards::new(),
            suggestion_count: 0,
            gate: SuggestionGate::new(config.gate.clone()),
            last_decision: None,
            timeline: Timeline::new(),
            reveal: CardRevealController::new(config.reveal.text_delay),
            scorer: RubricScorer::new(config.rubric.clone()),
            phase_config: config.phase.clone(),
            transcript_turns: config.gate.transcript_turns,
        }
    }

    pub fn append_turn(&mut self, turn: Turn) -> AppendOutcome {
        self.turns.append(turn)
    }

    pub fn edit_turn(&mut self, id: Uuid, text: impl Into<String>) -> Result<(), SessionError> {
        self.turns.edit(id, text)
    }

    pub fn remove_turn(&mut self, id: Uuid) -> Result<Turn, SessionError> {
        self.turns.remove(id)
    }

    /// What to send the extractor after the latest turn.
    pub fn extraction_request(&self) -> ExtractionRequest {
        ExtractionRequest {
            turns: self.transcript(),
            fingerprints: self.insights.fingerprints(),
        }
    }

    pub fn apply_insights(
        &mut self,
        candidates: &[InsightCandidate],
        now: DateTime<Utc>,
    ) -> MergeReport {
        self.insights.merge(candidates, now)
    }

    /// Rescore the rubric, then step the phase machine.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Refresh {
        let update = self.scorer.score(&ScoreInput {
            turns: self.turns.as_slice(),
            insights: &self.insights,
            saved_votes: self.votes.saved_count(),
            suggestion_count: self.suggestion_count,
            previous: &self.rubric,
            now,
        });
        self.rubric = update.snapshot;

        let decision = phase::evaluate(
            &PhaseInput {
                phase: self.phase,
                turns: self.turns.as_slice(),
                insights: &self.insights,
                rubric: &self.rubric,
                vote_count: self.votes.count(),
                suggestion_count: self.suggestion_count,
            },
            &self.phase_config,
        );

        let previous_phase = self.phase;
        self.phase = decision.next_phase;
        self.phase_rationale = decision.rationale.clone();
        self.teaser_requested = decision.should_seed_teaser_card;

        Refresh {
            rubric_changed: update.changed,
            previous_phase,
            phase: decision,
        }
    }

    /// Delivered cards still waiting for a vote.
    pub fn unreviewed(&self) -> Vec<SuggestionCard> {
        self.votes
            .unreviewed(self.delivered.as_slice())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn evaluate_gate(&mut self, trigger: GateTrigger, now: DateTime<Utc>) -> GateOutcome {
        let unreviewed = self.votes.unreviewed(self.delivered.as_slice()).len();
        let outcome = self.gate.evaluate(&GateInput {
            trigger,
            turns: &self.turns,
            insights: &self.insights,
            rubric: &self.rubric,
            unreviewed,
            now,
        });
        self.last_decision = Some(outcome.decision.clone());
        outcome
    }

    pub fn generation_request(
        &self,
        mode: FetchMode,
        focus_text: Option<String>,
        max_cards: usize,
    ) -> GenerationRequest {
        let votes = self
            .cards
            .iter()
            .filter_map(|card| {
                self.votes.get(&card.id).map(|vote| VotedCard {
                    card_id: card.id.clone(),
                    title: card.title.clone(),
                    vote,
                })
            })
            .collect();

        GenerationRequest {
            phase: self.phase,
            mode,
            insights: self.insights.iter().cloned().collect(),
            votes,
            transcript: self.transcript(),
            shown_titles: self.delivered.titles(),
            focus_text,
            max_cards,
        }
    }

    /// Merge a generated batch. Resets gate hysteresis only when something
    /// new arrived.
    pub fn apply_batch(&mut self, incoming: Vec<SuggestionCard>, now: DateTime<Utc>) -> BatchMerge {
        let merged = merge_batch(&self.cards, incoming, &self.votes, &self.delivered);
        self.cards = merged.cards.clone();
        self.delivered.record(&merged.cards);
        if !merged.fresh.is_empty() {
            self.suggestion_count += merged.fresh.len();
            self.gate.on_fetch_success(&self.rubric, now);
        }
        merged
    }

    /// Record or clear a vote. Returns the previous vote.
    pub fn record_vote(
        &mut self,
        card_id: &str,
        vote: Option<Vote>,
        now: DateTime<Utc>,
    ) -> Result<Option<Vote>, SessionError> {
        if !self.cards.iter().any(|c| c.id == card_id) {
            // Delivered by an earlier batch: bring it back so the vote sticks.
            let card = self
                .delivered
                .get(card_id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownCard {
                    id: card_id.to_string(),
                })?;
            self.cards.push(card);
        }
        self.gate.record_interaction(now);
        Ok(self.votes.record(card_id, vote))
    }

    pub fn queue_reveal(
        &mut self,
        request: RevealRequest,
        channel: &dyn DialogueChannel,
    ) -> RevealPlan {
        self.reveal.reveal(request, channel)
    }

    pub fn flush_reveals(&mut self) -> Vec<Revealed> {
        self.reveal.flush(&mut self.timeline)
    }

    /// Anchor for cards requested right now.
    pub fn tail_anchor(&self) -> Anchor {
        Anchor::tail_of(&self.turns)
    }

    pub fn view(&self) -> SessionView {
        let unreviewed = self.votes.unreviewed(self.delivered.as_slice()).len();
        let gate = self.gate.state();
        SessionView {
            session_id: self.id,
            phase: self.phase,
            phase_rationale: self.phase_rationale.clone(),
            rubric: self.rubric.clone(),
            gate_decision: self.last_decision.clone(),
            insights: self
                .insights
                .by_kind()
                .into_iter()
                .map(|(kind, records)| (kind, records.into_iter().cloned().collect()))
                .collect(),
            timeline: self.timeline.view(&self.turns),
            cards: self.cards.clone(),
            votes: self
                .votes
                .iter()
                .map(|(id, vote)| (id.to_string(), vote))
                .collect(),
            backlog: BacklogView {
                unreviewed,
                suppressed: gate.backlog_suppressed,
                nudge_sent: gate.nudge_sent,
            },
        }
    }

    fn transcript(&self) -> Vec<TranscriptLine> {
        self.turns
            .recent(self.transcript_turns)
            .iter()
            .map(TranscriptLine::from)
            .collect()
    }
}

/// Backlog state for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct BacklogView {
    pub unreviewed: usize,
    pub suppressed: bool,
    pub nudge_sent: bool,
}

/// Read-only picture of a session for rendering and telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub phase: DiscoveryPhase,
    pub phase_rationale: Vec<String>,
    pub rubric: RubricSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_decision: Option<GateDecision>,
    pub insights: BTreeMap<InsightKind, Vec<Insight>>,
    pub timeline: Vec<TimelineEntry>,
    pub cards: Vec<SuggestionCard>,
    pub votes: BTreeMap<String, Vote>,
    pub backlog: BacklogView,
}
