//! Error types for voxchat

use thiserror::Error;

/// Result type alias for voxchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice chat engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Chat transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Session command/event channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
