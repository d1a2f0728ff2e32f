//! Node error types

use std::io;
use thiserror::Error;

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors surfaced outside the measurement math. Measurement degradations
/// (noise gate, failed zero crossing, tiny denominators) are encoded in the
/// result instead.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Socket or stream failure on the transport
    #[error("Transport I/O error: {0}")]
    Transport(#[from] io::Error),

    /// Publish attempted with no session
    #[error("Transport not connected")]
    NotConnected,

    /// JSON encoding or decoding failed
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Forward transform could not run
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Calibration input is unusable
    #[error("Calibration failed: {0}")]
    Calibration(String),
}
