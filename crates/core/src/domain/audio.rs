//! Audio subsystem errors

use thiserror::Error;

/// Errors that can occur in the audio subsystem
///
/// Render paths never produce these: a block always comes back, possibly
/// degraded. They surface from registry and configuration operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No sound registered under this id
    #[error("Sound not found: {0}")]
    SoundNotFound(String),

    /// A sound with this id is already registered
    #[error("Sound already registered: {0}")]
    DuplicateSound(String),

    /// Invalid configuration for a pipeline or stream
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error in render thread creation or teardown
    #[error("Stream error: {0}")]
    StreamError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;
