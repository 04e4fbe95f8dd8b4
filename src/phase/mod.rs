//! Discovery phase state machine.
//!
//! The conversation moves through warmup, story mining, pattern mapping,
//! option seeding and commitment. Transitions are decided by a pure function
//! over the turn log, insights, rubric and card counts, so every transition
//! can be tested in isolation.

pub mod machine;
pub mod state;

pub use machine::{PhaseDecision, PhaseInput, evaluate};
pub use state::DiscoveryPhase;
