//! Discovery Guide — orchestration core for a guided career-discovery chat.

pub mod cards;
pub mod channels;
pub mod collaborators;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod gate;
pub mod phase;
pub mod rubric;
pub mod server;
pub mod session;
