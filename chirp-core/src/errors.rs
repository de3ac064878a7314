//! Chirp error types shared by every protocol layer

use thiserror::Error;

/// Top-level error type for all chirp operations
#[derive(Debug, Error)]
pub enum ModemError {
    #[error("invalid argument: {reason}")]
    Invalid { reason: String },

    #[error("symbol value {value} exceeds codec capacity {capacity}")]
    OutOfRange { value: u64, capacity: u64 },

    #[error("no frame ready within {seconds}s")]
    Timeout { seconds: u32 },

    #[error("fragment sequence gap, stream flushed to the next packet boundary")]
    OutOfSync,

    #[error("peer sequence {got} is ahead of expected {expected}")]
    Desync { expected: u8, got: u8 },

    #[error("audio backend failure: {reason}")]
    Backend { reason: String },
}

impl ModemError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ModemError::Invalid {
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        ModemError::Backend {
            reason: reason.into(),
        }
    }

    /// A transient receive error the caller may simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModemError::Timeout { .. } | ModemError::OutOfSync)
    }
}

/// Result type alias for chirp operations
pub type Result<T> = std::result::Result<T, ModemError>;
