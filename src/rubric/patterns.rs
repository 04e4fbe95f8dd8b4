//! Intent and signal patterns matched against user turns.
//!
//! Compiled once; shared by the rubric scorer and the suggestion gate.

use std::sync::LazyLock;

use regex::Regex;

/// The user is asking for options, ideas or recommendations.
pub static IDEAS_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(any|some|give me|show me|got any|have any|share|throw me)\b.{0,30}\b(ideas?|options?|suggestions?|recommendations?|paths?|careers?|jobs?|roles?)\b|\bwhat (jobs?|careers?|roles?|paths?|options?)\b|\b(suggest|recommend)\b",
    )
    .expect("ideas request pattern")
});

/// Hedging that signals the user is unsure or holding back.
pub static HESITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not sure|i don'?t know|idk|no idea|i guess|dunno|hard to say|whatever)\b")
        .expect("hesitation pattern")
});

/// Excitement markers that lift the energy reading.
pub static ENTHUSIASM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(!|\b(love|loved|excited|amazing|awesome|can'?t wait|obsessed|passionate|thrilled)\b)")
        .expect("enthusiasm pattern")
});

/// The user is committing to a direction.
pub static COMMITMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i'?m going to|i am going to|i'?ll (try|start|do|go with|take|sign up)|let'?s (go with|do)|i want to (try|pursue|start)|sign me up|i'?m in|commit(ting)? to|i'?ve decided|i decided)\b",
    )
    .expect("commitment pattern")
});

/// Mentions of work-like activity a recommendation can build on.
pub static CAREER_ACTIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(work(ed|ing)?|job|career|project|built|build(ing)?|stud(y|ied|ying)|volunteer(ed|ing)?|intern(ship)?|teach(ing)?|design(ed|ing)?|cod(e|ed|ing)|manag(e|ed|ing)|led|lead(ing)?|freelanc(e|ing)|clients?|business|class(es)?|degree|team|shift)\b",
    )
    .expect("career activity pattern")
});

/// Hobby mentions worth a deepening question before suggesting anything.
pub static HOBBY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(photography|painting|drawing|hiking|cooking|baking|gaming|music|guitar|piano|singing|dancing|gardening|writing|reading|running|climbing|knitting|woodworking|birdwatching|fishing|cycling|skateboarding|sewing|crafting|pottery)\b",
    )
    .expect("hobby pattern")
});

/// The most recent hobby label mentioned across `texts`, lowercased.
pub fn latest_hobby<'a>(texts: impl DoubleEndedIterator<Item = &'a str>) -> Option<String> {
    texts
        .rev()
        .find_map(|text| HOBBY.find_iter(text).last().map(|m| m.as_str().to_lowercase()))
}
