//! Error types for the synchronization loop

use thiserror::Error;

/// Failure of a simulator round trip
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("simulator is not connected")]
    NotConnected,

    #[error("object handle not found: {name}")]
    UnknownObject { name: String },

    #[error("simulator transport failure: {0}")]
    Transport(String),
}

/// Failure reported by the intention field solver
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field solver is not running")]
    NotRunning,

    #[error("field solver failure: {0}")]
    Solver(String),
}

/// Top-level error of an experiment session
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("signal channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("intention field: {0}")]
    Field(#[from] FieldError),

    #[error("journal I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("synchronization loop thread panicked")]
    LoopPanicked,
}
