//! Suggestion gating — when to call the recommendation generator.
//!
//! [`SuggestionGate`] is a priority-ordered policy over the rubric, the
//! insight mix and the card backlog. Its hysteresis lives in a plain
//! [`GateState`] record. [`SingleFlight`] keeps at most one fetch
//! outstanding per session.

pub mod flight;
pub mod policy;
pub mod state;

pub use flight::{FlightGuard, SingleFlight};
pub use policy::{
    FetchMode, GateAction, GateDecision, GateInput, GateOutcome, GateReason, GateTrigger,
    SuggestionGate,
};
pub use state::{DeepeningMark, GateState};
