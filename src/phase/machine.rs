//! Phase transition function.
//!
//! `evaluate` is pure: it reads the current conversation state and returns
//! the next phase plus the rationale for it. It moves at most one step.

use serde::Serialize;

use crate::config::PhaseConfig;
use crate::conversation::{InsightKind, InsightStore, Turn};
use crate::rubric::{EngagementStyle, ReadinessBias, RubricSnapshot};

use super::state::DiscoveryPhase;

/// Inputs to a phase evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PhaseInput<'a> {
    pub phase: DiscoveryPhase,
    pub turns: &'a [Turn],
    pub insights: &'a InsightStore,
    pub rubric: &'a RubricSnapshot,
    pub vote_count: usize,
    pub suggestion_count: usize,
}

/// Outcome of a phase evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseDecision {
    pub next_phase: DiscoveryPhase,
    /// Ask the gate for a low-bar teaser card without changing phase.
    pub should_seed_teaser_card: bool,
    /// Which conditions fired, in evaluation order. Never empty.
    pub rationale: Vec<String>,
}

impl PhaseDecision {
    fn stay(phase: DiscoveryPhase, rationale: Vec<String>) -> Self {
        Self {
            next_phase: phase,
            should_seed_teaser_card: false,
            rationale,
        }
    }

    fn advance(to: DiscoveryPhase, rationale: Vec<String>) -> Self {
        Self {
            next_phase: to,
            should_seed_teaser_card: false,
            rationale,
        }
    }

    fn teaser(phase: DiscoveryPhase, rationale: Vec<String>) -> Self {
        Self {
            next_phase: phase,
            should_seed_teaser_card: true,
            rationale,
        }
    }

    pub fn changed_from(&self, phase: DiscoveryPhase) -> bool {
        self.next_phase != phase
    }
}

/// Evaluate the next phase.
pub fn evaluate(input: &PhaseInput<'_>, config: &PhaseConfig) -> PhaseDecision {
    let user_turns = input.turns.iter().filter(|t| t.is_user()).count();
    let style = input.rubric.engagement_style;
    let depth = input.rubric.context_depth;
    let insights = input.insights;

    let core = insights.has(InsightKind::Interest)
        && insights.has(InsightKind::Strength)
        && insights.has_aspirational();

    match input.phase {
        DiscoveryPhase::Warmup => {
            if user_turns > 0 {
                PhaseDecision::advance(
                    DiscoveryPhase::StoryMining,
                    vec![format!("first user turn received ({user_turns} user turns)")],
                )
            } else {
                PhaseDecision::stay(
                    DiscoveryPhase::Warmup,
                    vec!["waiting for the first user turn".to_string()],
                )
            }
        }

        DiscoveryPhase::StoryMining => {
            let grounded = insights.has_constraint_like() || depth >= config.story_min_depth;
            if core && grounded {
                let why = if insights.has_constraint_like() {
                    "constraint captured".to_string()
                } else {
                    format!("context depth {depth}")
                };
                return PhaseDecision::advance(
                    DiscoveryPhase::PatternMapping,
                    vec![
                        "interest, strength and aspiration captured".to_string(),
                        why,
                    ],
                );
            }

            let mut rationale = vec![missing_core(insights, grounded)];
            if style.is_stalled() && user_turns >= config.story_teaser_turns {
                rationale.push(format!(
                    "engagement {style:?} after {user_turns} user turns, seeding a teaser"
                ));
                return PhaseDecision::teaser(DiscoveryPhase::StoryMining, rationale);
            }
            PhaseDecision::stay(DiscoveryPhase::StoryMining, rationale)
        }

        DiscoveryPhase::PatternMapping => {
            if input.rubric.explicit_ideas_request {
                return PhaseDecision::advance(
                    DiscoveryPhase::OptionSeeding,
                    vec!["user explicitly asked for ideas".to_string()],
                );
            }
            if input.rubric.readiness_bias == ReadinessBias::SeekingOptions {
                return PhaseDecision::advance(
                    DiscoveryPhase::OptionSeeding,
                    vec!["readiness bias is seeking options".to_string()],
                );
            }

            let full_coverage = core && insights.has_constraint_like();
            let covered = (full_coverage && depth >= config.pattern_min_depth)
                || insights.distinct_kinds() >= config.rich_kind_count;
            let engaged = style == EngagementStyle::LeaningIn || input.vote_count > 0;

            if covered && engaged {
                return PhaseDecision::advance(
                    DiscoveryPhase::OptionSeeding,
                    vec![
                        format!(
                            "coverage reached ({} kinds, depth {depth})",
                            insights.distinct_kinds()
                        ),
                        if input.vote_count > 0 {
                            format!("{} card votes recorded", input.vote_count)
                        } else {
                            "user is leaning in".to_string()
                        },
                    ],
                );
            }

            let mut rationale = vec![format!(
                "holding: coverage {covered}, engaged {engaged} ({} kinds, depth {depth})",
                insights.distinct_kinds()
            )];
            if stalled(style, input.suggestion_count, user_turns, config.pattern_stall_turns) {
                rationale.push(format!(
                    "stalled for {user_turns} user turns with no suggestions, seeding a teaser"
                ));
                return PhaseDecision::teaser(DiscoveryPhase::PatternMapping, rationale);
            }
            PhaseDecision::stay(DiscoveryPhase::PatternMapping, rationale)
        }

        DiscoveryPhase::OptionSeeding => {
            if input.vote_count > 0 && input.rubric.readiness_bias == ReadinessBias::Deciding {
                return PhaseDecision::advance(
                    DiscoveryPhase::Commitment,
                    vec![format!(
                        "{} card votes and user is deciding",
                        input.vote_count
                    )],
                );
            }

            let mut rationale = vec![format!(
                "holding: {} votes, readiness {:?}",
                input.vote_count, input.rubric.readiness_bias
            )];
            if stalled(style, input.suggestion_count, user_turns, config.option_stall_turns) {
                rationale.push(format!(
                    "stalled for {user_turns} user turns with no suggestions, seeding a teaser"
                ));
                return PhaseDecision::teaser(DiscoveryPhase::OptionSeeding, rationale);
            }
            PhaseDecision::stay(DiscoveryPhase::OptionSeeding, rationale)
        }

        DiscoveryPhase::Commitment => {
            if style.is_stalled() && input.vote_count == 0 {
                PhaseDecision::advance(
                    DiscoveryPhase::PatternMapping,
                    vec![format!(
                        "engagement {style:?} with no votes, regressing to pattern mapping"
                    )],
                )
            } else {
                PhaseDecision::stay(
                    DiscoveryPhase::Commitment,
                    vec!["commitment holding".to_string()],
                )
            }
        }
    }
}

fn stalled(style: EngagementStyle, suggestions: usize, user_turns: usize, min_turns: usize) -> bool {
    style.is_stalled() && suggestions == 0 && user_turns >= min_turns
}

fn missing_core(insights: &InsightStore, grounded: bool) -> String {
    let mut missing = Vec::new();
    if !insights.has(InsightKind::Interest) {
        missing.push("interest");
    }
    if !insights.has(InsightKind::Strength) {
        missing.push("strength");
    }
    if !insights.has_aspirational() {
        missing.push("aspiration");
    }
    if !grounded {
        missing.push("constraint or depth");
    }
    format!("still missing: {}", missing.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::conversation::InsightCandidate;
    use crate::rubric::{CardReadiness, ReadinessStatus};

    fn store(kinds: &[InsightKind]) -> InsightStore {
        let mut store = InsightStore::new();
        let candidates: Vec<InsightCandidate> = kinds
            .iter()
            .enumerate()
            .map(|(i, k)| InsightCandidate::new(*k, format!("value {i}")))
            .collect();
        store.merge(&candidates, Utc::now());
        store
    }

    fn rubric(style: EngagementStyle, depth: u8) -> RubricSnapshot {
        RubricSnapshot {
            engagement_style: style,
            context_depth: depth,
            ..Default::default()
        }
    }

    fn users(n: usize) -> Vec<Turn> {
        (0..n).map(|i| Turn::user(format!("answer {i}"))).collect()
    }

    fn run(
        phase: DiscoveryPhase,
        turns: &[Turn],
        insights: &InsightStore,
        rubric: &RubricSnapshot,
        votes: usize,
        suggestions: usize,
    ) -> PhaseDecision {
        evaluate(
            &PhaseInput {
                phase,
                turns,
                insights,
                rubric,
                vote_count: votes,
                suggestion_count: suggestions,
            },
            &PhaseConfig::default(),
        )
    }

    #[test]
    fn empty_warmup_stays_put() {
        let decision = run(
            DiscoveryPhase::Warmup,
            &[],
            &InsightStore::new(),
            &RubricSnapshot::default(),
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::Warmup);
        assert!(!decision.should_seed_teaser_card);
        assert!(!decision.rationale.is_empty());
    }

    #[test]
    fn first_user_turn_leaves_warmup() {
        let decision = run(
            DiscoveryPhase::Warmup,
            &users(1),
            &InsightStore::new(),
            &RubricSnapshot::default(),
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::StoryMining);
    }

    #[test]
    fn assistant_only_turns_do_not_leave_warmup() {
        let turns = vec![Turn::assistant("hi there!")];
        let decision = run(
            DiscoveryPhase::Warmup,
            &turns,
            &InsightStore::new(),
            &RubricSnapshot::default(),
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::Warmup);
    }

    #[test]
    fn core_insights_at_depth_two_reach_pattern_mapping() {
        let insights = store(&[InsightKind::Interest, InsightKind::Strength, InsightKind::Hope]);
        let decision = run(
            DiscoveryPhase::StoryMining,
            &users(3),
            &insights,
            &rubric(EngagementStyle::LeaningIn, 2),
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::PatternMapping);
    }

    #[test]
    fn constraint_substitutes_for_depth() {
        let insights = store(&[
            InsightKind::Interest,
            InsightKind::Strength,
            InsightKind::Goal,
            InsightKind::Constraint,
        ]);
        let decision = run(
            DiscoveryPhase::StoryMining,
            &users(2),
            &insights,
            &rubric(EngagementStyle::Hesitant, 1),
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::PatternMapping);
    }

    #[test]
    fn stuck_story_mining_seeds_teaser_without_advancing() {
        let insights = store(&[InsightKind::Interest]);
        let early = run(
            DiscoveryPhase::StoryMining,
            &users(5),
            &insights,
            &rubric(EngagementStyle::Blocked, 0),
            0,
            0,
        );
        assert!(!early.should_seed_teaser_card);

        let late = run(
            DiscoveryPhase::StoryMining,
            &users(6),
            &insights,
            &rubric(EngagementStyle::Blocked, 0),
            0,
            0,
        );
        assert_eq!(late.next_phase, DiscoveryPhase::StoryMining);
        assert!(late.should_seed_teaser_card);
        assert_eq!(late.rationale.len(), 2);
    }

    #[test]
    fn explicit_request_skips_coverage_in_pattern_mapping() {
        let snapshot = RubricSnapshot {
            explicit_ideas_request: true,
            ..Default::default()
        };
        let decision = run(
            DiscoveryPhase::PatternMapping,
            &users(1),
            &InsightStore::new(),
            &snapshot,
            0,
            0,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::OptionSeeding);
    }

    #[test]
    fn pattern_mapping_needs_engagement_or_votes() {
        let insights = store(&[
            InsightKind::Interest,
            InsightKind::Strength,
            InsightKind::Hope,
            InsightKind::Boundary,
        ]);
        let hesitant = rubric(EngagementStyle::Hesitant, 2);
        let held = run(DiscoveryPhase::PatternMapping, &users(4), &insights, &hesitant, 0, 0);
        assert_eq!(held.next_phase, DiscoveryPhase::PatternMapping);

        let with_vote = run(DiscoveryPhase::PatternMapping, &users(4), &insights, &hesitant, 1, 1);
        assert_eq!(with_vote.next_phase, DiscoveryPhase::OptionSeeding);
    }

    #[test]
    fn pattern_mapping_stall_needs_zero_suggestions() {
        let insights = store(&[InsightKind::Interest]);
        let blocked = rubric(EngagementStyle::Blocked, 0);
        let stalled = run(DiscoveryPhase::PatternMapping, &users(8), &insights, &blocked, 0, 0);
        assert!(stalled.should_seed_teaser_card);

        let has_cards = run(DiscoveryPhase::PatternMapping, &users(8), &insights, &blocked, 0, 2);
        assert!(!has_cards.should_seed_teaser_card);
    }

    #[test]
    fn option_seeding_stall_threshold_is_ten() {
        let blocked = rubric(EngagementStyle::Hesitant, 1);
        let nine = run(DiscoveryPhase::OptionSeeding, &users(9), &InsightStore::new(), &blocked, 0, 0);
        assert!(!nine.should_seed_teaser_card);
        let ten = run(DiscoveryPhase::OptionSeeding, &users(10), &InsightStore::new(), &blocked, 0, 0);
        assert!(ten.should_seed_teaser_card);
        assert_eq!(ten.next_phase, DiscoveryPhase::OptionSeeding);
    }

    #[test]
    fn scripted_walk_visits_every_phase_in_order() {
        let all = store(&[
            InsightKind::Interest,
            InsightKind::Strength,
            InsightKind::Hope,
            InsightKind::Constraint,
        ]);
        let leaning = RubricSnapshot {
            engagement_style: EngagementStyle::LeaningIn,
            context_depth: 2,
            card_readiness: CardReadiness {
                status: ReadinessStatus::Ready,
                missing: vec![],
            },
            ..Default::default()
        };
        let deciding = RubricSnapshot {
            readiness_bias: ReadinessBias::Deciding,
            ..leaning.clone()
        };

        let turns = users(4);
        let mut phase = DiscoveryPhase::Warmup;
        let mut visited = vec![phase];
        let steps: [(&RubricSnapshot, usize); 4] =
            [(&leaning, 0), (&leaning, 0), (&leaning, 0), (&deciding, 1)];

        for (snapshot, votes) in steps {
            let decision = run(phase, &turns, &all, snapshot, votes, votes);
            assert!(phase.can_transition_to(decision.next_phase));
            phase = decision.next_phase;
            visited.push(phase);
        }

        assert_eq!(
            visited,
            vec![
                DiscoveryPhase::Warmup,
                DiscoveryPhase::StoryMining,
                DiscoveryPhase::PatternMapping,
                DiscoveryPhase::OptionSeeding,
                DiscoveryPhase::Commitment,
            ]
        );
    }

    #[test]
    fn commitment_regresses_exactly_once() {
        let insights = store(&[InsightKind::Interest]);
        let blocked = rubric(EngagementStyle::Blocked, 1);

        let first = run(DiscoveryPhase::Commitment, &users(3), &insights, &blocked, 0, 3);
        assert_eq!(first.next_phase, DiscoveryPhase::PatternMapping);

        let mut phase = first.next_phase;
        for _ in 0..3 {
            let again = run(phase, &users(3), &insights, &blocked, 0, 3);
            assert_eq!(again.next_phase, DiscoveryPhase::PatternMapping);
            phase = again.next_phase;
        }
    }

    #[test]
    fn commitment_with_votes_holds() {
        let decision = run(
            DiscoveryPhase::Commitment,
            &users(3),
            &InsightStore::new(),
            &rubric(EngagementStyle::Blocked, 1),
            2,
            3,
        );
        assert_eq!(decision.next_phase, DiscoveryPhase::Commitment);
    }
}
