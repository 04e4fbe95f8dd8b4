//! Insight store — deduplicating aggregate of extracted facts about the user.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Semantic kind of an extracted insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightKind {
    Interest,
    Strength,
    Constraint,
    Goal,
    Frustration,
    Hope,
    Boundary,
    Highlight,
}

impl InsightKind {
    pub const ALL: [InsightKind; 8] = [
        Self::Interest,
        Self::Strength,
        Self::Constraint,
        Self::Goal,
        Self::Frustration,
        Self::Hope,
        Self::Boundary,
        Self::Highlight,
    ];

    /// Hope, goal and highlight describe where the user wants to go.
    pub fn is_aspirational(&self) -> bool {
        matches!(self, Self::Hope | Self::Goal | Self::Highlight)
    }

    /// Constraint and boundary describe what the user rules out.
    pub fn is_constraint_like(&self) -> bool {
        matches!(self, Self::Constraint | Self::Boundary)
    }
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Interest => "interest",
            Self::Strength => "strength",
            Self::Constraint => "constraint",
            Self::Goal => "goal",
            Self::Frustration => "frustration",
            Self::Hope => "hope",
            Self::Boundary => "boundary",
            Self::Highlight => "highlight",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for InsightKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interest" => Ok(Self::Interest),
            "strength" => Ok(Self::Strength),
            "constraint" => Ok(Self::Constraint),
            "goal" => Ok(Self::Goal),
            "frustration" => Ok(Self::Frustration),
            "hope" => Ok(Self::Hope),
            "boundary" => Ok(Self::Boundary),
            "highlight" => Ok(Self::Highlight),
            other => Err(format!("Unknown insight kind: {other}")),
        }
    }
}

/// Who surfaced an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    #[default]
    User,
    Assistant,
    System,
}

/// A stored insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub kind: InsightKind,
    pub value: String,
    pub source: InsightSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unvalidated insight as produced by the extractor.
///
/// Every field is optional so a single bad entry can be dropped without
/// rejecting the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightCandidate {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub source: Option<InsightSource>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl InsightCandidate {
    pub fn new(kind: InsightKind, value: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_source(mut self, source: InsightSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Validate into `(kind, trimmed value)`, or `None` if malformed.
    fn validate(&self) -> Option<(InsightKind, String)> {
        let kind = self.kind.as_deref()?.parse::<InsightKind>().ok()?;
        let value = self.value.as_deref()?.trim();
        if value.is_empty() {
            return None;
        }
        Some((kind, value.to_string()))
    }
}

/// Lowercase and collapse whitespace so trivially different phrasings share a key.
pub fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counts from one `InsightStore::merge` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dropped: usize,
}

impl MergeReport {
    /// Whether the store changed at all.
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

/// Deduplicating insight aggregate keyed by (kind, normalized value).
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightStore {
    records: Vec<Insight>,
    #[serde(skip)]
    index: HashMap<(InsightKind, String), usize>,
}

impl InsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of extractor candidates.
    pub fn merge(&mut self, candidates: &[InsightCandidate], now: DateTime<Utc>) -> MergeReport {
        let mut report = MergeReport::default();

        for candidate in candidates {
            let Some((kind, value)) = candidate.validate() else {
                debug!(kind = ?candidate.kind, value = ?candidate.value, "Dropping malformed insight candidate");
                report.dropped += 1;
                continue;
            };

            let key = (kind, normalize_value(&value));
            match self.index.get(&key) {
                Some(&pos) => {
                    if apply_metadata(&mut self.records[pos], candidate, now) {
                        report.updated += 1;
                    } else {
                        report.unchanged += 1;
                    }
                }
                None => {
                    self.records.push(Insight {
                        id: Uuid::new_v4(),
                        kind,
                        value,
                        source: candidate.source.unwrap_or_default(),
                        confidence: candidate.confidence,
                        evidence: candidate.evidence.clone(),
                        created_at: now,
                        updated_at: now,
                    });
                    self.index.insert(key, self.records.len() - 1);
                    report.inserted += 1;
                }
            }
        }

        report
    }

    pub fn has(&self, kind: InsightKind) -> bool {
        self.records.iter().any(|r| r.kind == kind)
    }

    pub fn has_aspirational(&self) -> bool {
        self.records.iter().any(|r| r.kind.is_aspirational())
    }

    pub fn has_constraint_like(&self) -> bool {
        self.records.iter().any(|r| r.kind.is_constraint_like())
    }

    /// Number of distinct kinds present.
    pub fn distinct_kinds(&self) -> usize {
        InsightKind::ALL.iter().filter(|k| self.has(**k)).count()
    }

    /// Insights grouped by kind, in insertion order within each kind.
    pub fn by_kind(&self) -> BTreeMap<InsightKind, Vec<&Insight>> {
        let mut grouped: BTreeMap<InsightKind, Vec<&Insight>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.kind).or_default().push(record);
        }
        grouped
    }

    /// `kind:normalized value` keys, sent to the extractor so it can skip known facts.
    pub fn fingerprints(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| format!("{}:{}", r.kind, normalize_value(&r.value)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Insight> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Copy provided metadata onto an existing record. Returns whether anything changed.
fn apply_metadata(record: &mut Insight, candidate: &InsightCandidate, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    if let Some(source) = candidate.source {
        if record.source != source {
            record.source = source;
            changed = true;
        }
    }
    if candidate.confidence.is_some() && record.confidence != candidate.confidence {
        record.confidence = candidate.confidence;
        changed = true;
    }
    if candidate.evidence.is_some() && record.evidence != candidate.evidence {
        record.evidence = candidate.evidence.clone();
        changed = true;
    }

    if changed {
        record.updated_at = now;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_candidate_twice_stores_one_record() {
        let mut store = InsightStore::new();
        let candidate = InsightCandidate::new(InsightKind::Interest, "Woodworking")
            .with_evidence("I spend weekends in the shop");

        let first = store.merge(&[candidate.clone()], Utc::now());
        let before = store.iter().next().cloned().unwrap();
        let second = store.merge(&[candidate], Utc::now());

        assert_eq!(first.inserted, 1);
        assert_eq!(second, MergeReport { unchanged: 1, ..Default::default() });
        assert!(!second.changed());
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap(), &before);
    }

    #[test]
    fn normalized_duplicate_updates_metadata_in_place() {
        let mut store = InsightStore::new();
        let t0 = Utc::now();
        store.merge(&[InsightCandidate::new(InsightKind::Strength, "Explaining things")], t0);
        let original = store.iter().next().cloned().unwrap();

        let t1 = t0 + chrono::Duration::seconds(5);
        let report = store.merge(
            &[InsightCandidate::new(InsightKind::Strength, "  explaining   THINGS ")
                .with_confidence(0.8)
                .with_source(InsightSource::Assistant)],
            t1,
        );

        assert_eq!(report.updated, 1);
        assert_eq!(store.len(), 1);
        let updated = store.iter().next().unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.updated_at, t1);
        assert_eq!(updated.confidence, Some(0.8));
        assert_eq!(updated.source, InsightSource::Assistant);
        assert_eq!(updated.value, "Explaining things");
    }

    #[test]
    fn same_value_different_kind_is_distinct() {
        let mut store = InsightStore::new();
        store.merge(
            &[
                InsightCandidate::new(InsightKind::Interest, "teaching"),
                InsightCandidate::new(InsightKind::Strength, "teaching"),
            ],
            Utc::now(),
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.distinct_kinds(), 2);
    }

    #[test]
    fn malformed_candidates_are_dropped_without_aborting_batch() {
        let mut store = InsightStore::new();
        let batch = vec![
            InsightCandidate { kind: None, value: Some("x".into()), ..Default::default() },
            InsightCandidate { kind: Some("interest".into()), value: None, ..Default::default() },
            InsightCandidate::new(InsightKind::Hope, "   "),
            InsightCandidate { kind: Some("vibe".into()), value: Some("chill".into()), ..Default::default() },
            InsightCandidate::new(InsightKind::Goal, "run a small studio"),
        ];

        let report = store.merge(&batch, Utc::now());
        assert_eq!(report.dropped, 4);
        assert_eq!(report.inserted, 1);
        assert!(store.has(InsightKind::Goal));
    }

    #[test]
    fn aggregates_group_by_kind() {
        let mut store = InsightStore::new();
        store.merge(
            &[
                InsightCandidate::new(InsightKind::Interest, "birds"),
                InsightCandidate::new(InsightKind::Interest, "cameras"),
                InsightCandidate::new(InsightKind::Hope, "work outdoors"),
                InsightCandidate::new(InsightKind::Boundary, "no night shifts"),
            ],
            Utc::now(),
        );

        let grouped = store.by_kind();
        assert_eq!(grouped[&InsightKind::Interest].len(), 2);
        assert!(store.has_aspirational());
        assert!(store.has_constraint_like());
        assert!(store.fingerprints().contains(&"hope:work outdoors".to_string()));
    }

    #[test]
    fn serialized_store_omits_key_index() {
        let mut store = InsightStore::new();
        store.merge(&[InsightCandidate::new(InsightKind::Interest, "maps")], Utc::now());
        let json = serde_json::to_value(&store).unwrap();
        assert!(json.get("index").is_none());
        assert_eq!(json["records"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Highlight".parse::<InsightKind>().unwrap(), InsightKind::Highlight);
        assert!("unknown".parse::<InsightKind>().is_err());
        assert_eq!(serde_json::to_string(&InsightKind::Frustration).unwrap(), "\"frustration\"");
    }
}
