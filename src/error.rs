//! Error types for Playsense

use thiserror::Error;

/// Errors raised while building or configuring an engine.
///
/// Event handling never returns these: malformed input, insufficient data and
/// remote failures are absorbed inside the session. Only configuration
/// problems and a closed driver surface to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown sensitivity profile: {0}")]
    UnknownProfile(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session is closed")]
    SessionClosed,
}
