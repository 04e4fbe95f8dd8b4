//! Discovery engine — drives one session through the turn pipeline.
//!
//! Each finalized turn runs: turn log → insight extraction → rubric → phase →
//! gate → (maybe) recommendation fetch → card reveal. The session mutex is
//! only held between awaits, never across a collaborator call.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cards::{Anchor, RevealPlan, RevealReason, RevealRequest, Revealed, SuggestionCard, Vote};
use crate::channels::{ChannelMode, DialogueChannel};
use crate::collaborators::{InsightExtractor, RecommendationGenerator};
use crate::config::EngineConfig;
use crate::conversation::{AppendOutcome, MergeReport, Role, Turn};
use crate::error::{ChannelError, Result};
use crate::gate::{FetchMode, GateAction, GateDecision, GateOutcome, GateTrigger, SingleFlight};
use crate::phase::DiscoveryPhase;
use crate::rubric::RubricSnapshot;
use crate::session::{Refresh, Session, SessionView};

/// Default broadcast channel capacity.
const EVENT_CAPACITY: usize = 256;

/// A transcript fragment from the dialogue transport.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptInput {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub transcript_id: Option<String>,
    /// Partial fragments are ignored; only finalized ones touch the log.
    #[serde(default = "default_true")]
    pub is_final: bool,
    /// Wait (bounded) for the transport to acknowledge `transcript_id` first.
    #[serde(default)]
    pub await_ack: bool,
}

fn default_true() -> bool {
    true
}

impl TranscriptInput {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            transcript_id: None,
            is_final: true,
            await_ack: false,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::user(text)
        }
    }

    pub fn with_transcript_id(mut self, id: impl Into<String>) -> Self {
        self.transcript_id = Some(id.into());
        self
    }

    pub fn partial(mut self) -> Self {
        self.is_final = false;
        self
    }

    pub fn awaiting_ack(mut self) -> Self {
        self.await_ack = true;
        self
    }
}

/// Assistant lines the engine asks the UI to show or speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    BacklogNudge,
    Deepening,
}

/// Everything observers can learn about a session as it changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Full state, sent to new subscribers and after lag.
    Sync { session: Box<SessionView> },
    TurnAppended { turn: Turn },
    TurnUpdated { turn: Turn },
    TurnRetracted { turn_id: Uuid },
    InsightsMerged { report: MergeReport },
    RubricUpdated { rubric: RubricSnapshot },
    PhaseChanged {
        from: DiscoveryPhase,
        to: DiscoveryPhase,
        rationale: Vec<String>,
    },
    GateEvaluated { decision: GateDecision },
    FetchStarted { mode: FetchMode },
    FetchFailed { reason: String },
    CardsRevealed {
        anchor: Anchor,
        reason: RevealReason,
        cards: Vec<SuggestionCard>,
    },
    AssistantPrompt { kind: PromptKind, text: String },
    VoteRecorded { card_id: String, vote: Option<Vote> },
}

/// How a fetch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Delivered { fresh: usize },
    /// The generator answered but nothing new survived the merge.
    Empty,
    Failed,
    /// Another fetch was already in flight.
    Busy,
}

/// Orchestrates one discovery session.
pub struct DiscoveryEngine {
    session: Mutex<Session>,
    extractor: Arc<dyn InsightExtractor>,
    generator: Arc<dyn RecommendationGenerator>,
    channel: Arc<dyn DialogueChannel>,
    flight: SingleFlight,
    events: broadcast::Sender<EngineEvent>,
    config: EngineConfig,
}

impl DiscoveryEngine {
    pub fn new(
        config: EngineConfig,
        extractor: Arc<dyn InsightExtractor>,
        generator: Arc<dyn RecommendationGenerator>,
        channel: Arc<dyn DialogueChannel>,
    ) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            session: Mutex::new(Session::new(&config)),
            extractor,
            generator,
            channel,
            flight: SingleFlight::new(),
            events,
            config,
        })
    }

    /// Subscribe to engine events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn mode(&self) -> ChannelMode {
        self.channel.mode()
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.flight.is_in_flight()
    }

    pub async fn view(&self) -> SessionView {
        self.session.lock().await.view()
    }

    pub async fn sync_event(&self) -> EngineEvent {
        EngineEvent::Sync {
            session: Box::new(self.view().await),
        }
    }

    /// Feed one transcript fragment through the pipeline.
    ///
    /// Returns the affected turn's ID, or `None` for a partial fragment.
    pub async fn handle_transcript(self: &Arc<Self>, input: TranscriptInput) -> Result<Option<Uuid>> {
        if !input.is_final {
            debug!(transcript_id = ?input.transcript_id, "Ignoring partial transcript");
            return Ok(None);
        }

        if input.await_ack {
            if let Some(item_id) = input.transcript_id.as_deref() {
                self.await_acknowledgement(item_id).await;
            }
        }

        let mut turn = Turn::new(input.role, input.text);
        if let Some(id) = input.transcript_id {
            turn = turn.with_transcript_id(id);
        }
        let is_user = turn.is_user();

        let (turn_id, extraction) = {
            let mut session = self.session.lock().await;
            let outcome = session.append_turn(turn);
            let turn_id = outcome.id();
            if let Some(stored) = session.turns.get(turn_id).cloned() {
                self.emit(match outcome {
                    AppendOutcome::Inserted { .. } => EngineEvent::TurnAppended { turn: stored },
                    AppendOutcome::Updated { .. } => EngineEvent::TurnUpdated { turn: stored },
                });
            }
            (turn_id, session.extraction_request())
        };

        let candidates = match self.extractor.extract(&extraction).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Insight extraction failed, keeping existing insights");
                Vec::new()
            }
        };

        let (outcome, teaser) = {
            let mut session = self.session.lock().await;
            let now = Utc::now();
            let report = session.apply_insights(&candidates, now);
            if report.changed() {
                self.emit(EngineEvent::InsightsMerged { report });
            }
            let refresh = session.refresh(now);
            self.emit_refresh(&session, &refresh);

            if !is_user {
                return Ok(Some(turn_id));
            }
            let outcome = session.evaluate_gate(GateTrigger::UserTurn, now);
            self.emit(EngineEvent::GateEvaluated {
                decision: outcome.decision.clone(),
            });
            (outcome, session.teaser_requested && session.suggestion_count == 0)
        };

        self.act(outcome, teaser).await;
        Ok(Some(turn_id))
    }

    /// Evaluate the gate for a non-turn trigger and act on it.
    pub async fn trigger(self: &Arc<Self>, trigger: GateTrigger) -> GateDecision {
        let outcome = {
            let mut session = self.session.lock().await;
            let outcome = session.evaluate_gate(trigger, Utc::now());
            self.emit(EngineEvent::GateEvaluated {
                decision: outcome.decision.clone(),
            });
            outcome
        };
        info!(trigger = %trigger, reason = ?outcome.decision.reason, "Gate triggered");
        let decision = outcome.decision.clone();
        self.act(outcome, false).await;
        decision
    }

    /// Record (or clear) a vote and rescore.
    pub async fn record_vote(&self, card_id: &str, vote: Option<Vote>) -> Result<Option<Vote>> {
        let mut session = self.session.lock().await;
        let now = Utc::now();
        let previous = session.record_vote(card_id, vote, now)?;
        info!(card_id = %card_id, vote = ?vote, "Vote recorded");
        self.emit(EngineEvent::VoteRecorded {
            card_id: card_id.to_string(),
            vote,
        });
        let refresh = session.refresh(now);
        self.emit_refresh(&session, &refresh);
        Ok(previous)
    }

    /// Explicit user edit of an earlier turn.
    pub async fn edit_turn(&self, turn_id: Uuid, text: String) -> Result<()> {
        let mut session = self.session.lock().await;
        session.edit_turn(turn_id, text)?;
        if let Some(turn) = session.turns.get(turn_id).cloned() {
            self.emit(EngineEvent::TurnUpdated { turn });
        }
        let refresh = session.refresh(Utc::now());
        self.emit_refresh(&session, &refresh);
        Ok(())
    }

    /// Explicit user removal of an earlier turn.
    pub async fn remove_turn(&self, turn_id: Uuid) -> Result<()> {
        let mut session = self.session.lock().await;
        session.remove_turn(turn_id)?;
        self.emit(EngineEvent::TurnRetracted { turn_id });
        let refresh = session.refresh(Utc::now());
        self.emit_refresh(&session, &refresh);
        Ok(())
    }

    /// Wait up to `ack_timeout` for the channel to acknowledge `item_id`.
    ///
    /// Returns false on timeout; callers carry on regardless.
    pub async fn await_acknowledgement(&self, item_id: &str) -> bool {
        let timeout = self.config.ack_timeout;
        match tokio::time::timeout(timeout, self.channel.wait_acknowledged(item_id)).await {
            Ok(()) => true,
            Err(_) => {
                let err = ChannelError::AckTimeout {
                    item: item_id.to_string(),
                    timeout,
                };
                warn!(error = %err, "Proceeding without acknowledgement");
                false
            }
        }
    }

    async fn act(self: &Arc<Self>, outcome: GateOutcome, teaser: bool) {
        match outcome.action {
            GateAction::Fetch { mode } => {
                self.fetch(mode, outcome.decision.focus_text, self.config.gate.max_cards)
                    .await;
            }
            GateAction::ResurfaceBacklog => self.resurface_backlog().await,
            GateAction::AskDeepening { label, question } => {
                info!(label = %label, "Emitting deepening question");
                self.emit(EngineEvent::AssistantPrompt {
                    kind: PromptKind::Deepening,
                    text: question,
                });
            }
            GateAction::Idle if teaser => {
                info!("Seeding a teaser card");
                self.fetch(FetchMode::Fallback, None, 1).await;
            }
            GateAction::Idle => {}
        }
    }

    /// Ask the generator for a batch and reveal whatever is new.
    ///
    /// At most one fetch runs at a time; a second caller gets `Busy`.
    pub async fn fetch(
        self: &Arc<Self>,
        mode: FetchMode,
        focus_text: Option<String>,
        max_cards: usize,
    ) -> FetchOutcome {
        let Some(_guard) = self.flight.try_acquire() else {
            debug!(mode = ?mode, "Suggestion fetch already in flight");
            return FetchOutcome::Busy;
        };

        let (announcement_id, request) = {
            let mut session = self.session.lock().await;
            let announcement = Turn::assistant(self.config.announcement.clone());
            let id = session.append_turn(announcement.clone()).id();
            self.emit(EngineEvent::TurnAppended { turn: announcement });
            (id, session.generation_request(mode, focus_text, max_cards))
        };
        let anchor = Anchor::After(announcement_id);
        self.emit(EngineEvent::FetchStarted { mode });

        let result = self.generator.generate(&request).await;

        let mut session = self.session.lock().await;
        let cards = match result {
            Ok(cards) => cards,
            Err(e) => {
                warn!(error = %e, mode = ?mode, "Suggestion fetch failed");
                self.retract(&mut session, announcement_id);
                self.emit(EngineEvent::FetchFailed {
                    reason: e.to_string(),
                });
                return FetchOutcome::Failed;
            }
        };

        let merged = session.apply_batch(cards, Utc::now());
        if merged.fresh.is_empty() {
            info!(duplicates = merged.duplicates, "Generator returned nothing new");
            self.retract(&mut session, announcement_id);
            self.emit(EngineEvent::FetchFailed {
                reason: "no new cards".to_string(),
            });
            return FetchOutcome::Empty;
        }

        let fresh = merged.fresh.len();
        info!(fresh, total = merged.cards.len(), mode = ?mode, "Suggestion batch merged");
        let plan = session.queue_reveal(
            RevealRequest {
                anchor,
                cards: merged.fresh,
                reason: RevealReason::Fresh,
            },
            self.channel.as_ref(),
        );
        self.schedule_flush(&mut session, plan);
        FetchOutcome::Delivered { fresh }
    }

    async fn resurface_backlog(self: &Arc<Self>) {
        let mut session = self.session.lock().await;
        let cards = session.unreviewed();
        info!(count = cards.len(), "Re-surfacing unreviewed cards");
        self.emit(EngineEvent::AssistantPrompt {
            kind: PromptKind::BacklogNudge,
            text: self.config.backlog_nudge.clone(),
        });
        let anchor = session.tail_anchor();
        let plan = session.queue_reveal(
            RevealRequest {
                anchor,
                cards,
                reason: RevealReason::Resurface,
            },
            self.channel.as_ref(),
        );
        self.schedule_flush(&mut session, plan);
    }

    fn schedule_flush(self: &Arc<Self>, session: &mut Session, plan: RevealPlan) {
        match plan {
            RevealPlan::FlushNow => {
                let revealed = session.flush_reveals();
                self.emit_revealed(revealed);
            }
            RevealPlan::FlushAfter(delay) => {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    engine.flush_pending().await;
                });
            }
            RevealPlan::AwaitCompletion(done) => {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    if done.await.is_err() {
                        let err = ChannelError::Disconnected {
                            name: engine.channel.name().to_string(),
                            reason: "response completion waiter dropped".to_string(),
                        };
                        warn!(error = %err, "Flushing deferred cards anyway");
                    }
                    engine.flush_pending().await;
                });
            }
            RevealPlan::AlreadyScheduled => {
                debug!("Card reveal already scheduled");
            }
        }
    }

    async fn flush_pending(&self) {
        let revealed = self.session.lock().await.flush_reveals();
        self.emit_revealed(revealed);
    }

    fn retract(&self, session: &mut Session, turn_id: Uuid) {
        if session.turns.retract(turn_id) {
            debug!(turn_id = %turn_id, "Retracted announcement");
            self.emit(EngineEvent::TurnRetracted { turn_id });
        }
    }

    fn emit_revealed(&self, revealed: Vec<Revealed>) {
        for batch in revealed {
            self.emit(EngineEvent::CardsRevealed {
                anchor: batch.anchor,
                reason: batch.reason,
                cards: batch.cards,
            });
        }
    }

    fn emit_refresh(&self, session: &Session, refresh: &Refresh) {
        if refresh.rubric_changed {
            self.emit(EngineEvent::RubricUpdated {
                rubric: session.rubric.clone(),
            });
        }
        if refresh.phase_changed() {
            info!(
                from = %refresh.previous_phase,
                to = %refresh.phase.next_phase,
                "Phase changed"
            );
            self.emit(EngineEvent::PhaseChanged {
                from: refresh.previous_phase,
                to: refresh.phase.next_phase,
                rationale: refresh.phase.rationale.clone(),
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Ok if no receivers are listening yet
        let _ = self.events.send(event);
    }
}
