//! Error types for CFD driver operations

use thiserror::Error;

/// Result type alias for CFD driver operations
pub type Result<T> = std::result::Result<T, CfdError>;

/// Errors that can occur while driving the accelerator
#[derive(Debug, Error)]
pub enum CfdError {
    /// Engine number outside `0..4`
    #[error("Engine index {index} out of range (block has 4 engines)")]
    InvalidEngine {
        /// Requested engine
        index: usize,
    },

    /// Driver configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Mapping the register block failed
    #[error("Cannot map register block: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Register access outside the mapped block
    #[error("Register index {index} out of bounds (block has {limit} registers)")]
    OutOfBounds {
        /// Requested register index
        index: usize,
        /// Registers in the block
        limit: usize,
    },

    /// Bounded wait gave up with the busy bit still set
    #[error("Engine still busy after {polls} status polls (status={status:#x})")]
    Timeout {
        /// Polls performed
        polls: u64,
        /// Last status word read
        status: u32,
    },

    /// I/O error on a device node or serial link
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Sample file line that is not eight numbers
    #[error("Bad sample on line {line}: {reason}")]
    InvalidSample {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Result stream does not follow the batch framing
    #[error("Malformed result stream: {reason}")]
    Framing {
        /// What was wrong
        reason: String,
    },
}

impl CfdError {
    /// Create an invalid engine error
    pub const fn invalid_engine(index: usize) -> Self {
        Self::InvalidEngine { index }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a map failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create a framing error
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }
}
