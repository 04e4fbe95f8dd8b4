//! Timeline — cards attached to positions in the turn log.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::conversation::{Turn, TurnLog};

use super::model::SuggestionCard;

/// Where a batch of cards renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "turn_id", rename_all = "snake_case")]
pub enum Anchor {
    /// Before the first turn (cards arrived before anyone spoke).
    Start,
    /// Directly after the given turn.
    After(Uuid),
}

impl Anchor {
    /// Anchor after the current tail of `turns`.
    pub fn tail_of(turns: &TurnLog) -> Self {
        turns.last_id().map_or(Self::Start, Self::After)
    }
}

/// One rendered row: a turn and the cards revealed after it.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<Turn>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<SuggestionCard>,
}

/// Cards keyed by anchor.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    attached: HashMap<Anchor, Vec<SuggestionCard>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach cards at `anchor`, skipping any card ID already there.
    ///
    /// Returns the cards that were actually inserted.
    pub fn insert(&mut self, anchor: Anchor, cards: &[SuggestionCard]) -> Vec<SuggestionCard> {
        let slot = self.attached.entry(anchor).or_default();
        let mut present: HashSet<String> = slot.iter().map(|c| c.id.clone()).collect();
        let mut inserted = Vec::new();
        for card in cards {
            if present.insert(card.id.clone()) {
                slot.push(card.clone());
                inserted.push(card.clone());
            }
        }
        inserted
    }

    pub fn cards_at(&self, anchor: Anchor) -> &[SuggestionCard] {
        self.attached.get(&anchor).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total attached cards, counting re-surfaced copies.
    pub fn len(&self) -> usize {
        self.attached.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered `{turn, cards}` rows for rendering.
    ///
    /// Cards anchored to a turn that has since been removed render at the end.
    pub fn view(&self, turns: &TurnLog) -> Vec<TimelineEntry> {
        let mut entries = Vec::with_capacity(turns.len() + 1);

        let leading = self.cards_at(Anchor::Start);
        if !leading.is_empty() {
            entries.push(TimelineEntry {
                turn: None,
                cards: leading.to_vec(),
            });
        }

        for turn in turns.iter() {
            entries.push(TimelineEntry {
                turn: Some(turn.clone()),
                cards: self.cards_at(Anchor::After(turn.id)).to_vec(),
            });
        }

        let orphaned: Vec<SuggestionCard> = self
            .attached
            .iter()
            .filter(|(anchor, _)| match anchor {
                Anchor::Start => false,
                Anchor::After(id) => turns.get(*id).is_none(),
            })
            .flat_map(|(_, cards)| cards.iter().cloned())
            .collect();
        if !orphaned.is_empty() {
            entries.push(TimelineEntry {
                turn: None,
                cards: orphaned,
            });
        }

        entries
    }
}
