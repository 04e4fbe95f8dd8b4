//! Card parsing — turns recommendation-generator output into suggestion cards.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::model::{CardDistance, SuggestionCard};

/// One generator entry as it arrives on the wire. Everything is optional so a
/// single bad entry fails on its own instead of failing the whole batch.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCard {
    id: Option<Value>,
    title: Option<String>,
    summary: Option<String>,
    #[serde(alias = "whyItFits")]
    why_it_fits: Vec<String>,
    #[serde(alias = "nextSteps")]
    next_steps: Vec<String>,
    #[serde(alias = "microExperiments")]
    micro_experiments: Vec<String>,
    #[serde(alias = "careerAngles")]
    career_angles: Vec<String>,
    #[serde(alias = "neighborTerritories")]
    neighbor_territories: Vec<String>,
    confidence: Option<f32>,
    score: Option<f32>,
    distance: Option<String>,
}

impl RawCard {
    fn into_card(self) -> Option<SuggestionCard> {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;

        let mut card = SuggestionCard::new(title, self.summary.unwrap_or_default().trim())
            .with_confidence(self.confidence.unwrap_or(0.0))
            .with_distance(
                self.distance
                    .and_then(|d| d.trim().to_ascii_lowercase().parse().ok())
                    .unwrap_or(CardDistance::Core),
            );

        match self.id {
            Some(Value::String(id)) if !id.trim().is_empty() => card.id = id.trim().to_string(),
            Some(Value::Number(n)) => card.id = n.to_string(),
            _ => {}
        }

        card.why_it_fits = clean_list(self.why_it_fits);
        card.next_steps = clean_list(self.next_steps);
        card.micro_experiments = clean_list(self.micro_experiments);
        card.career_angles = clean_list(self.career_angles);
        card.neighbor_territories = clean_list(self.neighbor_territories);
        card.score = self.score.filter(|s| s.is_finite()).unwrap_or(0.0);
        Some(card)
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse generator output into at most `max_cards` cards.
///
/// Accepts a bare JSON array, a `{"cards": [...]}` object, or either wrapped
/// in markdown or surrounding prose. Entries without a title, or that are not
/// objects, are dropped one by one.
pub fn parse_cards(text: &str, max_cards: usize) -> Vec<SuggestionCard> {
    let entries = match json_entries(text, "cards") {
        Some(entries) => entries,
        None => {
            warn!(response = text, "Failed to parse recommendation generator output");
            return Vec::new();
        }
    };

    let total = entries.len();
    let cards: Vec<SuggestionCard> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawCard>(entry) {
            Ok(raw) => raw.into_card(),
            Err(e) => {
                debug!(error = %e, "Dropping malformed card entry");
                None
            }
        })
        .take(max_cards)
        .collect();

    if cards.len() < total.min(max_cards) {
        debug!(kept = cards.len(), received = total, "Filtered generator entries");
    }
    cards
}

/// Pull the list of entries out of a collaborator response.
///
/// `key` names the field holding the array when the response is an object.
pub(crate) fn json_entries(text: &str, key: &str) -> Option<Vec<Value>> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if let Some(entries) = entries_from_value(value, key) {
            return Some(entries);
        }
    }

    let extracted = extract_json_array(text)?;
    match serde_json::from_str::<Value>(&extracted) {
        Ok(value) => entries_from_value(value, key),
        Err(_) => None,
    }
}

fn entries_from_value(value: Value, key: &str) -> Option<Vec<Value>> {
    match value {
        Value::Array(entries) => Some(entries),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(entries)) => Some(entries),
            _ => None,
        },
        _ => None,
    }
}

/// Extract a JSON array from output that might contain markdown or extra text.
fn extract_json_array(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        return Some(trimmed.to_string());
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('[') || inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    // Fall back to the outermost array bounds
    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    (end > start).then(|| trimmed[start..=end].to_string())
}
