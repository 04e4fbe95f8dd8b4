//! End-to-end engine flows against stub collaborators.
//!
//! Each test builds a `DiscoveryEngine` with in-process stubs and drives it
//! through the public API, observing the broadcast event stream.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use tokio::time::timeout;

use discovery_guide::cards::{Anchor, RevealReason, SuggestionCard, Vote};
use discovery_guide::channels::{DialogueChannel, TextChannel, VoiceChannel};
use discovery_guide::collaborators::{
    ExtractionRequest, GenerationRequest, InsightExtractor, RecommendationGenerator,
};
use discovery_guide::config::EngineConfig;
use discovery_guide::conversation::InsightCandidate;
use discovery_guide::engine::{DiscoveryEngine, EngineEvent, FetchOutcome, PromptKind, TranscriptInput};
use discovery_guide::error::ServiceError;
use discovery_guide::gate::{FetchMode, GateReason, GateTrigger};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct NoInsights;

#[async_trait]
impl InsightExtractor for NoInsights {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Vec<InsightCandidate>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Generator that hands out numbered cards and counts calls.
/// With `hold` set, each call parks until released.
#[derive(Default)]
struct StubGenerator {
    calls: AtomicUsize,
    hold: bool,
    release: Notify,
    fail: bool,
    /// (mode, max_cards) of every request, in call order.
    requests: Mutex<Vec<(FetchMode, usize)>>,
}

impl StubGenerator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn requests(&self) -> Vec<(FetchMode, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<SuggestionCard>, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((request.mode, request.max_cards));
        if self.hold {
            self.release.notified().await;
        }
        if self.fail {
            return Err(ServiceError::BadStatus {
                service: "recommendation-generator".into(),
                status: 503,
            });
        }
        Ok((0..request.max_cards.min(3))
            .map(|i| {
                SuggestionCard::new(format!("Idea {call}-{i}"), "stub").with_id(format!("card-{call}-{i}"))
            })
            .collect())
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.reveal.text_delay = Duration::from_millis(10);
    config.ack_timeout = Duration::from_millis(50);
    config
}

fn build(
    config: EngineConfig,
    generator: Arc<StubGenerator>,
    channel: Arc<dyn DialogueChannel>,
) -> Arc<DiscoveryEngine> {
    DiscoveryEngine::new(config, Arc::new(NoInsights), generator, channel)
}

/// Receive events until one matches `pred`.
async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ── Single flight ───────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_fetches_call_generator_once() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(StubGenerator {
            hold: true,
            ..Default::default()
        });
        let engine = build(test_config(), generator.clone(), Arc::new(TextChannel::new()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.fetch(FetchMode::Normal, None, 3).await })
        };
        while generator.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(engine.is_fetch_in_flight());

        // A second trigger while the first is parked must not reach the generator.
        let decision = engine.trigger(GateTrigger::Forced).await;
        assert!(decision.should_fetch);
        assert_eq!(engine.fetch(FetchMode::Normal, None, 3).await, FetchOutcome::Busy);

        generator.release.notify_one();
        assert_eq!(first.await.unwrap(), FetchOutcome::Delivered { fresh: 3 });
        assert_eq!(generator.calls(), 1);
        assert!(!engine.is_fetch_in_flight());
    })
    .await
    .expect("test timed out");
}

// ── Failure handling ────────────────────────────────────────────────────

#[tokio::test]
async fn failed_fetch_retracts_announcement() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(StubGenerator {
            fail: true,
            ..Default::default()
        });
        let engine = build(test_config(), generator.clone(), Arc::new(TextChannel::new()));
        let mut rx = engine.subscribe();

        assert_eq!(engine.fetch(FetchMode::Normal, None, 3).await, FetchOutcome::Failed);

        let events = drain(&mut rx);
        let appended = events.iter().find_map(|e| match e {
            EngineEvent::TurnAppended { turn } => Some(turn.id),
            _ => None,
        });
        let retracted = events.iter().find_map(|e| match e {
            EngineEvent::TurnRetracted { turn_id } => Some(*turn_id),
            _ => None,
        });
        assert!(appended.is_some());
        assert_eq!(appended, retracted);
        assert!(events.iter().any(|e| matches!(e, EngineEvent::FetchFailed { .. })));

        let view = engine.view().await;
        assert!(view.timeline.is_empty());
        assert!(view.cards.is_empty());
        assert!(!engine.is_fetch_in_flight());
    })
    .await
    .expect("test timed out");
}

// ── Reveal timing ───────────────────────────────────────────────────────

#[tokio::test]
async fn text_mode_reveals_after_announcement() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(StubGenerator::default());
        let engine = build(test_config(), generator, Arc::new(TextChannel::new()));
        let mut rx = engine.subscribe();

        let decision = engine.trigger(GateTrigger::Forced).await;
        assert_eq!(decision.reason, GateReason::Forced);
        assert_eq!(decision.fetch_mode, FetchMode::Fallback);

        let announcement = match wait_for(&mut rx, |e| matches!(e, EngineEvent::TurnAppended { .. })).await {
            EngineEvent::TurnAppended { turn } => turn.id,
            _ => unreachable!(),
        };
        let revealed = wait_for(&mut rx, |e| matches!(e, EngineEvent::CardsRevealed { .. })).await;
        let EngineEvent::CardsRevealed { anchor, reason, cards } = revealed else {
            unreachable!()
        };
        assert_eq!(anchor, Anchor::After(announcement));
        assert_eq!(reason, RevealReason::Fresh);
        assert_eq!(cards.len(), 3);

        let view = engine.view().await;
        assert_eq!(view.timeline.len(), 1);
        assert_eq!(view.timeline[0].turn.as_ref().unwrap().id, announcement);
        assert_eq!(view.timeline[0].cards.len(), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn voice_mode_holds_cards_until_response_completes() {
    timeout(TEST_TIMEOUT, async {
        let voice = Arc::new(VoiceChannel::new());
        let generator = Arc::new(StubGenerator::default());
        let engine = build(test_config(), generator, voice.clone());
        let mut rx = engine.subscribe();

        voice.response_started();
        let outcome = engine.fetch(FetchMode::Normal, None, 3).await;
        assert_eq!(outcome, FetchOutcome::Delivered { fresh: 3 });

        // Merged into the set but not yet on the timeline.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let view = engine.view().await;
        assert_eq!(view.cards.len(), 3);
        assert!(view.timeline.iter().all(|entry| entry.cards.is_empty()));
        assert!(drain(&mut rx).iter().all(|e| !matches!(e, EngineEvent::CardsRevealed { .. })));

        voice.response_completed();
        wait_for(&mut rx, |e| matches!(e, EngineEvent::CardsRevealed { .. })).await;
        let view = engine.view().await;
        assert_eq!(view.timeline.iter().map(|entry| entry.cards.len()).sum::<usize>(), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn idle_voice_reveals_immediately() {
    timeout(TEST_TIMEOUT, async {
        let voice = Arc::new(VoiceChannel::new());
        let engine = build(test_config(), Arc::new(StubGenerator::default()), voice);

        engine.fetch(FetchMode::Normal, None, 3).await;
        let view = engine.view().await;
        assert_eq!(view.timeline.iter().map(|entry| entry.cards.len()).sum::<usize>(), 3);
    })
    .await
    .expect("test timed out");
}

// ── Backlog guard ───────────────────────────────────────────────────────

#[tokio::test]
async fn backlog_nudge_fires_once_then_suppresses() {
    timeout(TEST_TIMEOUT, async {
        let mut config = test_config();
        config.gate.backlog_idle = Duration::ZERO;
        let generator = Arc::new(StubGenerator::default());
        let engine = build(config, generator.clone(), Arc::new(TextChannel::new()));
        let mut rx = engine.subscribe();

        engine.trigger(GateTrigger::Forced).await;
        wait_for(&mut rx, |e| matches!(e, EngineEvent::CardsRevealed { .. })).await;
        assert_eq!(generator.calls(), 1);

        engine
            .handle_transcript(TranscriptInput::assistant("Any of those stand out?"))
            .await
            .unwrap();

        // Three unreviewed cards and no activity since: the guard engages.
        let decision = engine.trigger(GateTrigger::Forced).await;
        assert_eq!(decision.reason, GateReason::BacklogNudge);
        assert!(!decision.should_fetch);

        let prompt = wait_for(&mut rx, |e| matches!(e, EngineEvent::AssistantPrompt { .. })).await;
        assert!(matches!(prompt, EngineEvent::AssistantPrompt { kind: PromptKind::BacklogNudge, .. }));
        let resurfaced = wait_for(&mut rx, |e| matches!(e, EngineEvent::CardsRevealed { .. })).await;
        let EngineEvent::CardsRevealed { reason, cards, .. } = resurfaced else {
            unreachable!()
        };
        assert_eq!(reason, RevealReason::Resurface);
        assert_eq!(cards.len(), 3);

        let decision = engine.trigger(GateTrigger::Forced).await;
        assert_eq!(decision.reason, GateReason::BacklogSuppressed);
        assert!(!decision.should_fetch);
        assert_eq!(generator.calls(), 1);
        assert!(engine.view().await.backlog.suppressed);

        // Reviewing the backlog lifts suppression.
        engine.record_vote("card-0-0", Some(Vote::Saved)).await.unwrap();
        let decision = engine.trigger(GateTrigger::Forced).await;
        assert_eq!(decision.reason, GateReason::Forced);
    })
    .await
    .expect("test timed out");
}

// ── Turn pipeline ───────────────────────────────────────────────────────

#[tokio::test]
async fn hobby_mention_without_context_asks_deepening_question() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(StubGenerator::default());
        let engine = build(test_config(), generator.clone(), Arc::new(TextChannel::new()));
        let mut rx = engine.subscribe();

        engine
            .handle_transcript(TranscriptInput::user("Mostly I spend my weekends on woodworking."))
            .await
            .unwrap();

        let prompt = wait_for(&mut rx, |e| matches!(e, EngineEvent::AssistantPrompt { .. })).await;
        let EngineEvent::AssistantPrompt { kind, text } = prompt else {
            unreachable!()
        };
        assert_eq!(kind, PromptKind::Deepening);
        assert!(text.contains("woodworking"));

        // Same hobby, no new insights: not asked again.
        engine
            .handle_transcript(TranscriptInput::user("Yeah, woodworking is great."))
            .await
            .unwrap();
        let repeated = drain(&mut rx)
            .into_iter()
            .any(|e| matches!(e, EngineEvent::AssistantPrompt { kind: PromptKind::Deepening, .. }));
        assert!(!repeated);
        assert_eq!(generator.calls(), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn assistant_turns_skip_the_gate() {
    timeout(TEST_TIMEOUT, async {
        let engine = build(test_config(), Arc::new(StubGenerator::default()), Arc::new(TextChannel::new()));
        let mut rx = engine.subscribe();

        engine
            .handle_transcript(TranscriptInput::assistant("What does a good day look like?"))
            .await
            .unwrap();
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, EngineEvent::TurnAppended { .. })));
        assert!(events.iter().all(|e| !matches!(e, EngineEvent::GateEvaluated { .. })));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unacknowledged_voice_message_proceeds_after_timeout() {
    timeout(TEST_TIMEOUT, async {
        let voice = Arc::new(VoiceChannel::new());
        let engine = build(test_config(), Arc::new(StubGenerator::default()), voice);

        let id = engine
            .handle_transcript(
                TranscriptInput::user("I like fixing bikes")
                    .with_transcript_id("item-7")
                    .awaiting_ack(),
            )
            .await
            .unwrap();
        assert!(id.is_some());
        assert_eq!(engine.view().await.timeline.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stalled_story_mining_seeds_one_fallback_teaser() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(StubGenerator::default());
        let engine = build(test_config(), generator.clone(), Arc::new(TextChannel::new()));

        for _ in 0..5 {
            engine.handle_transcript(TranscriptInput::user("ok")).await.unwrap();
        }
        assert_eq!(generator.calls(), 0, "no teaser before the sixth terse turn");

        engine.handle_transcript(TranscriptInput::user("ok")).await.unwrap();
        assert_eq!(generator.requests(), vec![(FetchMode::Fallback, 1)]);

        // Once a card exists the teaser is not repeated.
        engine.handle_transcript(TranscriptInput::user("ok")).await.unwrap();
        assert_eq!(generator.calls(), 1);
    })
    .await
    .expect("test timed out");
}

// ── Votes ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn votes_are_recorded_and_cleared() {
    timeout(TEST_TIMEOUT, async {
        let engine = build(test_config(), Arc::new(StubGenerator::default()), Arc::new(TextChannel::new()));
        engine.fetch(FetchMode::Normal, None, 3).await;

        assert_eq!(engine.record_vote("card-0-1", Some(Vote::Maybe)).await.unwrap(), None);
        assert_eq!(
            engine.record_vote("card-0-1", Some(Vote::Saved)).await.unwrap(),
            Some(Vote::Maybe)
        );
        let view = engine.view().await;
        assert_eq!(view.votes.get("card-0-1"), Some(&Vote::Saved));
        assert_eq!(view.backlog.unreviewed, 2);

        engine.record_vote("card-0-1", None).await.unwrap();
        assert!(engine.view().await.votes.is_empty());
        assert!(engine.record_vote("nope", Some(Vote::Skipped)).await.is_err());
    })
    .await
    .expect("test timed out");
}
