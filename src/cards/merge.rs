//! Merging a generated batch into the session's card set.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::model::{SuggestionCard, VoteBook};

/// Lowercase, strip punctuation and collapse whitespace.
///
/// "Wildlife Photographer" and "wildlife photographer!!" share a key.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every card delivered over a session, one per normalized title.
///
/// Outlives the current card set: an unvoted card a later batch omits leaves
/// the set but stays here, so the same idea is never revealed twice.
#[derive(Debug, Clone, Default)]
pub struct DeliveredCards {
    cards: Vec<SuggestionCard>,
    by_title: HashMap<String, usize>,
}

impl DeliveredCards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by normalized title. A card whose title is already known
    /// refreshes the stored copy.
    pub fn record(&mut self, cards: &[SuggestionCard]) {
        for card in cards {
            let key = normalize_title(&card.title);
            if key.is_empty() {
                continue;
            }
            match self.by_title.get(&key) {
                Some(&pos) => self.cards[pos] = card.clone(),
                None => {
                    self.by_title.insert(key, self.cards.len());
                    self.cards.push(card.clone());
                }
            }
        }
    }

    /// ID of the delivered card with this (normalized) title.
    pub fn id_for_title(&self, title: &str) -> Option<&str> {
        self.by_title
            .get(&normalize_title(title))
            .map(|&pos| self.cards[pos].id.as_str())
    }

    pub fn get(&self, card_id: &str) -> Option<&SuggestionCard> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn contains_id(&self, card_id: &str) -> bool {
        self.get(card_id).is_some()
    }

    /// Titles in delivery order.
    pub fn titles(&self) -> Vec<String> {
        self.cards.iter().map(|c| c.title.clone()).collect()
    }

    pub fn as_slice(&self) -> &[SuggestionCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Result of merging a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchMerge {
    /// The new card set: voted cards first, then the deduplicated batch.
    pub cards: Vec<SuggestionCard>,
    /// Cards the user has not seen before. These are what gets revealed.
    pub fresh: Vec<SuggestionCard>,
    /// Incoming cards dropped as duplicates.
    pub duplicates: usize,
}

/// Merge `incoming` into `existing`.
///
/// - Cards with a vote are always kept, even if the batch omits them.
/// - Incoming cards are deduplicated by ID and by normalized title, both
///   within the batch and against kept cards.
/// - An incoming card matching an unvoted existing card, or any card in
///   `delivered`, keeps that card's ID and is not treated as new.
/// - Unvoted cards the batch omits are dropped from the set.
pub fn merge_batch(
    existing: &[SuggestionCard],
    incoming: Vec<SuggestionCard>,
    votes: &VoteBook,
    delivered: &DeliveredCards,
) -> BatchMerge {
    let mut merged = BatchMerge::default();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();

    for card in existing.iter().filter(|c| votes.has_vote(&c.id)) {
        seen_ids.insert(card.id.clone());
        seen_titles.insert(normalize_title(&card.title));
        merged.cards.push(card.clone());
    }

    let unvoted_by_title: HashMap<String, &SuggestionCard> = existing
        .iter()
        .filter(|c| !votes.has_vote(&c.id))
        .map(|c| (normalize_title(&c.title), c))
        .collect();
    let unvoted_ids: HashSet<&str> = existing
        .iter()
        .filter(|c| !votes.has_vote(&c.id))
        .map(|c| c.id.as_str())
        .collect();

    for mut card in incoming {
        let key = normalize_title(&card.title);
        if key.is_empty() || seen_ids.contains(&card.id) || seen_titles.contains(&key) {
            debug!(card_id = %card.id, title = %card.title, "Dropping duplicate card");
            merged.duplicates += 1;
            continue;
        }

        let known = if let Some(previous) = unvoted_by_title.get(&key) {
            card.id = previous.id.clone();
            true
        } else if let Some(id) = delivered.id_for_title(&card.title) {
            card.id = id.to_string();
            true
        } else {
            unvoted_ids.contains(card.id.as_str()) || delivered.contains_id(&card.id)
        };

        // A title match may have re-pointed the ID onto one already taken.
        if !seen_ids.insert(card.id.clone()) {
            merged.duplicates += 1;
            continue;
        }
        seen_titles.insert(key);

        if !known {
            merged.fresh.push(card.clone());
        }
        merged.cards.push(card);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::model::Vote;

    fn card(id: &str, title: &str) -> SuggestionCard {
        SuggestionCard::new(title, format!("{title} summary")).with_id(id)
    }

    #[test]
    fn normalize_title_strips_case_and_punctuation() {
        assert_eq!(normalize_title("Wildlife Photographer"), "wildlife photographer");
        assert_eq!(normalize_title("  wildlife   photographer!! "), "wildlife photographer");
        assert_eq!(normalize_title("!!!"), "");
    }

    #[test]
    fn normalize_title_folds_non_ascii_case() {
        assert_eq!(normalize_title("ÉCOLOGIST"), normalize_title("écologist"));
        assert_eq!(normalize_title("Straße Musician"), "straße musician");
    }

    #[test]
    fn previously_delivered_title_is_not_fresh_after_being_dropped() {
        let mut delivered = DeliveredCards::new();
        delivered.record(&[card("a", "Wildlife Photographer")]);

        // "a" left the set when a later batch omitted it.
        let existing = vec![card("b", "Park Ranger")];
        let merged = merge_batch(
            &existing,
            vec![card("c", "wildlife photographer!!")],
            &VoteBook::new(),
            &delivered,
        );
        assert!(merged.fresh.is_empty());
        assert_eq!(merged.cards.len(), 1);
        assert_eq!(merged.cards[0].id, "a");
    }

    #[test]
    fn delivered_cards_upsert_by_title() {
        let mut delivered = DeliveredCards::new();
        delivered.record(&[card("a", "Luthier"), card("b", "Cartographer")]);
        delivered.record(&[card("a", "luthier"), card("", "  ")]);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered.id_for_title("LUTHIER"), Some("a"));
        assert_eq!(delivered.titles(), vec!["luthier", "Cartographer"]);
        assert!(delivered.contains_id("b"));
    }

    #[test]
    fn titles_that_normalize_identically_merge_into_one() {
        let merged = merge_batch(
            &[],
            vec![card("1", "Wildlife Photographer"), card("2", "wildlife photographer!!")],
            &VoteBook::new(),
            &DeliveredCards::new(),
        );
        assert_eq!(merged.cards.len(), 1);
        assert_eq!(merged.fresh.len(), 1);
        assert_eq!(merged.duplicates, 1);
        assert_eq!(merged.cards[0].id, "1");
    }

    #[test]
    fn voted_card_survives_when_batch_omits_it() {
        let existing = vec![card("a", "Park Ranger"), card("b", "Tour Guide")];
        let mut votes = VoteBook::new();
        votes.record("a", Some(Vote::Maybe));

        let merged = merge_batch(
            &existing,
            vec![card("c", "Field Biologist")],
            &votes,
            &DeliveredCards::new(),
        );
        let ids: Vec<&str> = merged.cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(merged.fresh.len(), 1);
    }

    #[test]
    fn merge_never_produces_duplicate_ids() {
        let existing = vec![card("a", "Park Ranger"), card("b", "Tour Guide")];
        let mut votes = VoteBook::new();
        votes.record("a", Some(Vote::Saved));

        let merged = merge_batch(
            &existing,
            vec![
                card("a", "Something Else"),
                card("x", "park ranger"),
                card("y", "Tour guide."),
                card("y", "Ferry Captain"),
                card("z", "Ferry Captain"),
            ],
            &votes,
            &DeliveredCards::new(),
        );

        let mut ids: Vec<&str> = merged.cards.iter().map(|c| c.id.as_str()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(merged.cards[0].id, "a");
        assert_eq!(merged.cards[0].title, "Park Ranger");
    }

    #[test]
    fn regenerated_unvoted_card_keeps_existing_id_and_is_not_fresh() {
        let existing = vec![card("b", "Tour Guide")];
        let merged = merge_batch(
            &existing,
            vec![card("new", "tour guide")],
            &VoteBook::new(),
            &DeliveredCards::new(),
        );
        assert_eq!(merged.cards.len(), 1);
        assert_eq!(merged.cards[0].id, "b");
        assert!(merged.fresh.is_empty());
    }

    #[test]
    fn blank_titles_are_dropped() {
        let merged = merge_batch(
            &[],
            vec![card("1", "  ?? ")],
            &VoteBook::new(),
            &DeliveredCards::new(),
        );
        assert!(merged.cards.is_empty());
        assert_eq!(merged.duplicates, 1);
    }
}
