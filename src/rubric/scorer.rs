//! Rubric scorer — turns recent conversation into a `RubricSnapshot`.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::RubricConfig;
use crate::conversation::{InsightKind, InsightStore, Turn};

use super::patterns::{COMMITMENT, ENTHUSIASM, HESITATION, IDEAS_REQUEST};
use super::{
    CardReadiness, EnergyLevel, EngagementStyle, ReadinessBias, ReadinessGap, ReadinessStatus,
    RubricSnapshot,
};

/// Everything the scorer reads.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput<'a> {
    /// Full turn history; the scorer only looks at the trailing window.
    pub turns: &'a [Turn],
    pub insights: &'a InsightStore,
    /// Cards saved by the user.
    pub saved_votes: usize,
    pub suggestion_count: usize,
    pub previous: &'a RubricSnapshot,
    pub now: DateTime<Utc>,
}

/// Result of a scoring pass.
#[derive(Debug, Clone)]
pub struct RubricUpdate {
    pub snapshot: RubricSnapshot,
    /// False when the new reading is field-identical to the previous one.
    pub changed: bool,
}

/// Computes rubric snapshots.
#[derive(Debug, Clone, Default)]
pub struct RubricScorer {
    config: RubricConfig,
}

impl RubricScorer {
    pub fn new(config: RubricConfig) -> Self {
        Self { config }
    }

    /// Score the conversation.
    ///
    /// When the reading matches `input.previous`, the previous snapshot is
    /// returned as-is (timestamp included) and `changed` is false.
    pub fn score(&self, input: &ScoreInput<'_>) -> RubricUpdate {
        let start = input.turns.len().saturating_sub(self.config.recent_window);
        let recent_user: Vec<&str> = input.turns[start..]
            .iter()
            .filter(|t| t.is_user())
            .map(|t| t.text.trim())
            .collect();

        let total_chars: usize = recent_user.iter().map(|t| t.chars().count()).sum();
        let avg_chars = if recent_user.is_empty() {
            0
        } else {
            total_chars / recent_user.len()
        };

        let explicit_ideas_request = recent_user
            .iter()
            .rev()
            .take(self.config.intent_window)
            .any(|t| IDEAS_REQUEST.is_match(t));

        let engagement_style = self.engagement(&recent_user, avg_chars, explicit_ideas_request);
        let energy_level = self.energy(&recent_user, avg_chars);
        let context_depth = self.depth(total_chars, input.insights.distinct_kinds());
        let readiness_bias = self.bias(&recent_user, input.saved_votes, explicit_ideas_request);
        let card_readiness = self.readiness(input.insights, context_depth);

        let snapshot = RubricSnapshot {
            engagement_style,
            context_depth,
            energy_level,
            readiness_bias,
            explicit_ideas_request,
            card_readiness,
            last_updated_at: Some(input.now),
        };

        if snapshot.signature() == input.previous.signature() {
            return RubricUpdate {
                snapshot: input.previous.clone(),
                changed: false,
            };
        }

        debug!(
            engagement = ?snapshot.engagement_style,
            depth = snapshot.context_depth,
            status = %snapshot.card_readiness.status,
            suggestions = input.suggestion_count,
            "Rubric changed"
        );

        RubricUpdate {
            snapshot,
            changed: true,
        }
    }

    fn engagement(&self, recent_user: &[&str], avg_chars: usize, ideas: bool) -> EngagementStyle {
        if recent_user.is_empty() {
            return EngagementStyle::Blocked;
        }
        if ideas {
            return EngagementStyle::SeekingOptions;
        }
        if avg_chars <= self.config.blocked_max_avg_chars {
            return EngagementStyle::Blocked;
        }

        let latest_hedges = recent_user.last().is_some_and(|t| HESITATION.is_match(t));
        if avg_chars <= self.config.hesitant_max_avg_chars || latest_hedges {
            EngagementStyle::Hesitant
        } else {
            EngagementStyle::LeaningIn
        }
    }

    fn energy(&self, recent_user: &[&str], avg_chars: usize) -> EnergyLevel {
        if recent_user.is_empty() {
            return EnergyLevel::Low;
        }
        let enthusiastic = recent_user.iter().any(|t| ENTHUSIASM.is_match(t));

        if avg_chars >= self.config.high_energy_min_avg_chars
            || (enthusiastic && avg_chars > self.config.low_energy_max_avg_chars)
        {
            EnergyLevel::High
        } else if avg_chars < self.config.low_energy_max_avg_chars && !enthusiastic {
            EnergyLevel::Low
        } else {
            EnergyLevel::Medium
        }
    }

    /// Mean of the detail band and the coverage band, rounded up.
    fn depth(&self, total_chars: usize, distinct_kinds: usize) -> u8 {
        let detail = self
            .config
            .detail_bands
            .iter()
            .filter(|&&band| total_chars >= band)
            .count();
        let coverage = self
            .config
            .coverage_bands
            .iter()
            .filter(|&&band| distinct_kinds >= band)
            .count();
        (detail + coverage).div_ceil(2).min(3) as u8
    }

    fn bias(&self, recent_user: &[&str], saved_votes: usize, ideas: bool) -> ReadinessBias {
        let committing = recent_user
            .iter()
            .rev()
            .take(self.config.intent_window)
            .any(|t| COMMITMENT.is_match(t));

        if committing || saved_votes >= self.config.deciding_saved_votes {
            ReadinessBias::Deciding
        } else if ideas {
            ReadinessBias::SeekingOptions
        } else {
            ReadinessBias::Exploring
        }
    }

    fn readiness(&self, insights: &InsightStore, depth: u8) -> CardReadiness {
        let mut missing = Vec::new();
        if !insights.has(InsightKind::Interest) {
            missing.push(ReadinessGap::Interest);
        }
        if !insights.has(InsightKind::Strength) {
            missing.push(ReadinessGap::Strength);
        }
        if !missing.is_empty() {
            return CardReadiness {
                status: ReadinessStatus::Blocked,
                missing,
            };
        }

        if !insights.has_aspirational() {
            missing.push(ReadinessGap::Aspiration);
        }
        if depth < self.config.ready_min_depth {
            missing.push(ReadinessGap::Depth);
        }

        let status = if missing.is_empty() {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::ContextLight
        };
        CardReadiness { status, missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InsightCandidate;

    fn user_turns(texts: &[&str]) -> Vec<Turn> {
        texts.iter().map(|t| Turn::user(*t)).collect()
    }

    fn store(kinds: &[(InsightKind, &str)]) -> InsightStore {
        let mut store = InsightStore::new();
        let candidates: Vec<InsightCandidate> = kinds
            .iter()
            .map(|(k, v)| InsightCandidate::new(*k, *v))
            .collect();
        store.merge(&candidates, Utc::now());
        store
    }

    fn score(turns: &[Turn], insights: &InsightStore, previous: &RubricSnapshot) -> RubricUpdate {
        RubricScorer::default().score(&ScoreInput {
            turns,
            insights,
            saved_votes: 0,
            suggestion_count: 0,
            previous,
            now: Utc::now(),
        })
    }

    const LONG: &str = "I spent last summer restoring an old canoe with my uncle, sanding every rib by hand and figuring out the epoxy as we went.";

    #[test]
    fn no_turns_reads_blocked() {
        let update = score(&[], &InsightStore::new(), &RubricSnapshot::default());
        assert_eq!(update.snapshot.engagement_style, EngagementStyle::Blocked);
        assert_eq!(update.snapshot.energy_level, EnergyLevel::Low);
        assert_eq!(update.snapshot.context_depth, 0);
    }

    #[test]
    fn terse_turns_read_blocked_and_long_turns_lean_in() {
        let terse = score(&user_turns(&["ok", "no", "sure"]), &InsightStore::new(), &RubricSnapshot::default());
        assert_eq!(terse.snapshot.engagement_style, EngagementStyle::Blocked);

        let dense = score(&user_turns(&[LONG, LONG]), &InsightStore::new(), &RubricSnapshot::default());
        assert_eq!(dense.snapshot.engagement_style, EngagementStyle::LeaningIn);
    }

    #[test]
    fn hedging_latest_turn_reads_hesitant() {
        let turns = user_turns(&[LONG, "I don't know, I guess I liked that part but it's hard to say why exactly"]);
        let update = score(&turns, &InsightStore::new(), &RubricSnapshot::default());
        assert_eq!(update.snapshot.engagement_style, EngagementStyle::Hesitant);
    }

    #[test]
    fn ideas_request_sets_flag_and_style() {
        let turns = user_turns(&[LONG, "can you give me some ideas for jobs?"]);
        let update = score(&turns, &InsightStore::new(), &RubricSnapshot::default());
        assert!(update.snapshot.explicit_ideas_request);
        assert_eq!(update.snapshot.engagement_style, EngagementStyle::SeekingOptions);
        assert_eq!(update.snapshot.readiness_bias, ReadinessBias::SeekingOptions);
    }

    #[test]
    fn ideas_request_outside_intent_window_is_ignored() {
        let turns = user_turns(&["give me some ideas", LONG, LONG, LONG]);
        let update = score(&turns, &InsightStore::new(), &RubricSnapshot::default());
        assert!(!update.snapshot.explicit_ideas_request);
    }

    #[test]
    fn readiness_bands_follow_insight_coverage() {
        let turns = user_turns(&[LONG, LONG, LONG]);

        let blocked = score(&turns, &store(&[(InsightKind::Interest, "boats")]), &RubricSnapshot::default());
        assert_eq!(blocked.snapshot.status(), ReadinessStatus::Blocked);
        assert_eq!(blocked.snapshot.card_readiness.missing, vec![ReadinessGap::Strength]);

        let light = score(
            &turns,
            &store(&[(InsightKind::Interest, "boats"), (InsightKind::Strength, "patience")]),
            &RubricSnapshot::default(),
        );
        assert_eq!(light.snapshot.status(), ReadinessStatus::ContextLight);
        assert!(light.snapshot.card_readiness.missing.contains(&ReadinessGap::Aspiration));

        let ready = score(
            &turns,
            &store(&[
                (InsightKind::Interest, "boats"),
                (InsightKind::Strength, "patience"),
                (InsightKind::Hope, "build things people use outdoors"),
            ]),
            &RubricSnapshot::default(),
        );
        assert!(ready.snapshot.context_depth >= 2);
        assert_eq!(ready.snapshot.status(), ReadinessStatus::Ready);
    }

    #[test]
    fn thin_detail_keeps_context_light() {
        let turns = user_turns(&["boats", "patient"]);
        let update = score(
            &turns,
            &store(&[
                (InsightKind::Interest, "boats"),
                (InsightKind::Strength, "patience"),
                (InsightKind::Goal, "own a shop"),
            ]),
            &RubricSnapshot::default(),
        );
        assert_eq!(update.snapshot.context_depth, 1);
        assert_eq!(update.snapshot.status(), ReadinessStatus::ContextLight);
        assert_eq!(update.snapshot.card_readiness.missing, vec![ReadinessGap::Depth]);
    }

    #[test]
    fn identical_rescore_is_not_a_change() {
        let turns = user_turns(&[LONG, LONG]);
        let insights = store(&[(InsightKind::Interest, "boats")]);

        let first = score(&turns, &insights, &RubricSnapshot::default());
        assert!(first.changed);

        let second = score(&turns, &insights, &first.snapshot);
        assert!(!second.changed);
        assert_eq!(second.snapshot.last_updated_at, first.snapshot.last_updated_at);
    }

    #[test]
    fn commitment_or_saved_votes_read_deciding() {
        let turns = user_turns(&[LONG, "ok I'll try the boatbuilding apprenticeship"]);
        let update = score(&turns, &InsightStore::new(), &RubricSnapshot::default());
        assert_eq!(update.snapshot.readiness_bias, ReadinessBias::Deciding);

        let update = RubricScorer::default().score(&ScoreInput {
            turns: &user_turns(&[LONG]),
            insights: &InsightStore::new(),
            saved_votes: 2,
            suggestion_count: 3,
            previous: &RubricSnapshot::default(),
            now: Utc::now(),
        });
        assert_eq!(update.snapshot.readiness_bias, ReadinessBias::Deciding);
    }
}
