//! Error types for the simulation harness.

use thiserror::Error;
use trackview_core::{SessionError, TrackError};

/// Errors that can occur while setting up or exporting a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Generated flight data failed validation
    #[error("Track generation failed: {0}")]
    Track(#[from] TrackError),

    /// The playback session rejected an operation
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Reading a config or writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or export JSON was invalid
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A simulation parameter is out of range
    #[error("Invalid simulation config: {0}")]
    Config(String),
}

impl SimError {
    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
