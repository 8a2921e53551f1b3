//! Error definitions for the translator module

use thiserror::Error;

/// Error types of the input translator and its engine
#[derive(Debug, Error)]
pub enum TranslatorError {
    /// Stick deflection outside of [-1.0, 1.0]; recovered by clamping
    #[error("Axis value out of range: {0}")]
    InvalidAxisValue(f64),

    /// An input event without a known tag; ignored by the engine
    #[error("Unknown input event: {0}")]
    UnknownEvent(String),

    /// The gain table is empty, the translator refuses to start
    #[error("Gain table must contain at least one gain level")]
    EmptyGainTable,

    /// Any other invalid setting in the joystick configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}
