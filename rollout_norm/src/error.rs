//! Error types for the normalization statistics.

use thiserror::Error;

/// Errors raised by [`RunningMoments`](crate::RunningMoments) and
/// [`WindowedAverager`](crate::WindowedAverager).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormError {
    /// Rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input length does not line up with the configured sample layout.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// A state snapshot could not be restored.
    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    /// Reading values back out of a Burn tensor failed.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

/// Result type for normalization operations.
pub type Result<T> = std::result::Result<T, NormError>;
