//! Suggestion gate — decides when to ask the recommendation generator for cards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::conversation::{InsightStore, TurnLog};
use crate::rubric::patterns::{CAREER_ACTIVITY, latest_hobby};
use crate::rubric::{ReadinessStatus, RubricSnapshot};

use super::state::{DeepeningMark, GateState};

/// What prompted an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateTrigger {
    UserTurn,
    SessionStart,
    /// The assistant told the user cards are on the way.
    AssistantPromisedCards,
    VoiceGreeting,
    /// Explicit caller request that bypasses the pre-gates.
    Forced,
}

impl std::fmt::Display for GateTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserTurn => write!(f, "user_turn"),
            Self::SessionStart => write!(f, "session_start"),
            Self::AssistantPromisedCards => write!(f, "assistant_promised_cards"),
            Self::VoiceGreeting => write!(f, "voice_greeting"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// How strict the generator should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Normal,
    /// Looser bar: suggest something even with thin context.
    Fallback,
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    BacklogNudge,
    BacklogSuppressed,
    Forced,
    BlockedStreak,
    ContextLightRequest,
    ReadyChanged,
    ReadyRequested,
    ReadyCadence,
    HobbyDeepening,
    MissingPrerequisites,
    NotReady,
    NothingNew,
}

/// Result of one evaluation, kept for telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub should_fetch: bool,
    pub fetch_mode: FetchMode,
    pub allow_card_prompt: bool,
    pub insight_count: usize,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_text: Option<String>,
    pub reason: GateReason,
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum GateAction {
    Fetch { mode: FetchMode },
    /// Show unreviewed cards again and send the one-time nudge.
    ResurfaceBacklog,
    /// Ask about a hobby instead of suggesting anything yet.
    AskDeepening { label: String, question: String },
    Idle,
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision: GateDecision,
    pub action: GateAction,
}

/// Inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub trigger: GateTrigger,
    pub turns: &'a TurnLog,
    pub insights: &'a InsightStore,
    pub rubric: &'a RubricSnapshot,
    /// Delivered cards with no vote yet.
    pub unreviewed: usize,
    pub now: DateTime<Utc>,
}

/// The gate: policy plus its hysteresis state.
#[derive(Debug, Clone)]
pub struct SuggestionGate {
    config: GateConfig,
    state: GateState,
}

impl SuggestionGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: GateState::default(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn snapshot(&self) -> GateState {
        self.state.clone()
    }

    pub fn restore(&mut self, state: GateState) {
        self.state = state;
    }

    /// The user voted on a card.
    pub fn record_interaction(&mut self, now: DateTime<Utc>) {
        self.state.last_interaction_at = Some(now);
    }

    /// A fetch landed cards. Resets the hysteresis counters.
    ///
    /// Failed or empty fetches must not call this.
    pub fn on_fetch_success(&mut self, rubric: &RubricSnapshot, now: DateTime<Utc>) {
        let state = &mut self.state;
        state.blocked_streak = 0;
        state.user_turns_since_suggestion = 0;
        state.last_delivery_at = Some(now);
        if rubric.is_ready() {
            state.last_ready_signature = Some(rubric.signature());
        }
        if rubric.explicit_ideas_request {
            state.request_served = true;
        }
    }

    /// Evaluate the policy, updating hysteresis state as a side effect.
    pub fn evaluate(&mut self, input: &GateInput<'_>) -> GateOutcome {
        self.observe(input);

        let outcome = self.decide(input);
        debug!(
            trigger = %input.trigger,
            reason = ?outcome.decision.reason,
            should_fetch = outcome.decision.should_fetch,
            status = %input.rubric.status(),
            blocked_streak = self.state.blocked_streak,
            "Gate evaluated"
        );
        outcome
    }

    /// Counter updates that happen on every evaluation.
    fn observe(&mut self, input: &GateInput<'_>) {
        let state = &mut self.state;

        if input.trigger == GateTrigger::UserTurn {
            state.user_turns_since_suggestion += 1;
            if input.rubric.status() == ReadinessStatus::Blocked {
                state.blocked_streak += 1;
            } else {
                state.blocked_streak = 0;
            }
        }

        if !input.rubric.explicit_ideas_request {
            state.request_served = false;
        }

        if input.unreviewed < self.config.backlog_threshold && state.backlog_suppressed {
            info!(unreviewed = input.unreviewed, "Card backlog cleared");
            state.backlog_suppressed = false;
            state.nudge_sent = false;
        }
    }

    fn decide(&mut self, input: &GateInput<'_>) -> GateOutcome {
        // 1. Backlog guard
        if self.state.backlog_suppressed {
            return self.hold(input, GateReason::BacklogSuppressed);
        }
        if self.backlog_stale(input) {
            self.state.backlog_suppressed = true;
            if !self.state.nudge_sent {
                self.state.nudge_sent = true;
                info!(unreviewed = input.unreviewed, "Backlog guard engaged, re-surfacing cards");
                return GateOutcome {
                    decision: self.decision(input, false, FetchMode::Normal, GateReason::BacklogNudge),
                    action: GateAction::ResurfaceBacklog,
                };
            }
            return self.hold(input, GateReason::BacklogSuppressed);
        }

        let rubric = input.rubric;

        // 2. Forced
        if input.trigger == GateTrigger::Forced {
            let mode = if rubric.is_ready() {
                FetchMode::Normal
            } else {
                FetchMode::Fallback
            };
            return self.fetch(input, mode, true, GateReason::Forced);
        }

        if !self.prerequisites_met(input) {
            return self.deepen_or_hold(input);
        }

        let open_request = (rubric.explicit_ideas_request
            || input.trigger == GateTrigger::AssistantPromisedCards)
            && !self.state.request_served;

        // 3. Fallback escalation
        if self.state.blocked_streak >= self.config.fallback_blocked_streak {
            return self.fetch(input, FetchMode::Fallback, false, GateReason::BlockedStreak);
        }

        match rubric.status() {
            // 4. Context-light escalation
            ReadinessStatus::ContextLight if open_request => {
                self.fetch(input, FetchMode::Fallback, false, GateReason::ContextLightRequest)
            }
            // 5. Ready trigger
            ReadinessStatus::Ready => {
                let signature_changed =
                    self.state.last_ready_signature.as_ref() != Some(&rubric.signature());
                let reason = if signature_changed {
                    Some(GateReason::ReadyChanged)
                } else if open_request {
                    Some(GateReason::ReadyRequested)
                } else if self.state.user_turns_since_suggestion >= self.config.turns_between_batches {
                    Some(GateReason::ReadyCadence)
                } else {
                    None
                };
                match reason {
                    Some(reason) => self.fetch(input, FetchMode::Normal, true, reason),
                    None => self.hold(input, GateReason::NothingNew),
                }
            }
            // 6. Nothing to do
            _ => self.hold(input, GateReason::NotReady),
        }
    }

    fn backlog_stale(&self, input: &GateInput<'_>) -> bool {
        if input.unreviewed < self.config.backlog_threshold {
            return false;
        }
        let Some(since) = self.state.last_activity_at() else {
            return false;
        };
        input
            .now
            .signed_duration_since(since)
            .to_std()
            .is_ok_and(|idle| idle >= self.config.backlog_idle)
    }

    /// Hard minimums every non-forced fetch must clear.
    fn prerequisites_met(&self, input: &GateInput<'_>) -> bool {
        let config = &self.config;
        input.insights.len() >= config.min_insights
            && input.insights.distinct_kinds() >= config.min_distinct_kinds
            && input.turns.user_turn_count() >= config.min_user_turns
            && input.rubric.context_depth >= config.min_context_depth
            && self.has_career_signal(input)
    }

    fn has_career_signal(&self, input: &GateInput<'_>) -> bool {
        user_texts(input.turns, self.config.transcript_turns).any(|t| CAREER_ACTIVITY.is_match(t))
            || input.insights.iter().any(|i| CAREER_ACTIVITY.is_match(&i.value))
    }

    fn deepen_or_hold(&mut self, input: &GateInput<'_>) -> GateOutcome {
        let Some(label) = latest_hobby(user_texts(input.turns, self.config.transcript_turns)) else {
            return self.hold(input, GateReason::MissingPrerequisites);
        };
        if !self.state.may_deepen(&label, input.insights.len()) {
            return self.hold(input, GateReason::MissingPrerequisites);
        }

        info!(label = %label, "Asking a deepening question");
        self.state.deepening = Some(DeepeningMark {
            label: label.clone(),
            insight_count: input.insights.len(),
        });
        let question = format!(
            "You mentioned {label}. What do you enjoy most about it, and have you ever done it for other people?"
        );
        GateOutcome {
            decision: self.decision(input, false, FetchMode::Normal, GateReason::HobbyDeepening),
            action: GateAction::AskDeepening { label, question },
        }
    }

    fn fetch(
        &self,
        input: &GateInput<'_>,
        mode: FetchMode,
        allow_card_prompt: bool,
        reason: GateReason,
    ) -> GateOutcome {
        GateOutcome {
            decision: self.decision(input, true, mode, reason).with_prompt(allow_card_prompt),
            action: GateAction::Fetch { mode },
        }
    }

    fn hold(&self, input: &GateInput<'_>, reason: GateReason) -> GateOutcome {
        GateOutcome {
            decision: self.decision(input, false, FetchMode::Normal, reason),
            action: GateAction::Idle,
        }
    }

    fn decision(
        &self,
        input: &GateInput<'_>,
        should_fetch: bool,
        fetch_mode: FetchMode,
        reason: GateReason,
    ) -> GateDecision {
        GateDecision {
            should_fetch,
            fetch_mode,
            allow_card_prompt: false,
            insight_count: input.insights.len(),
            turn_count: input.turns.user_turn_count(),
            focus_text: should_fetch
                .then(|| user_texts(input.turns, self.config.transcript_turns).last())
                .flatten()
                .map(str::to_string),
            reason,
        }
    }
}

impl GateDecision {
    fn with_prompt(mut self, allow: bool) -> Self {
        self.allow_card_prompt = allow;
        self
    }
}

fn user_texts(turns: &TurnLog, window: usize) -> impl DoubleEndedIterator<Item = &str> {
    turns
        .recent(window)
        .iter()
        .filter(|t| t.is_user())
        .map(|t| t.text.as_str())
}
