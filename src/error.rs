//! Error types for the discovery engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures talking to an external collaborator (insight extractor,
/// recommendation generator).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service {service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Service {service} returned status {status}")]
    BadStatus { service: String, status: u16 },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Service {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dialogue channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transcript item {item} was not acknowledged within {timeout:?}")]
    AckTimeout { item: String, timeout: Duration },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },
}

/// Errors raised by session mutations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Card {id} not found")]
    UnknownCard { id: String },

    #[error("Turn {id} not found")]
    UnknownTurn { id: Uuid },

    #[error("Invalid vote value {value}, expected -1, 0 or 1")]
    InvalidVote { value: i8 },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
