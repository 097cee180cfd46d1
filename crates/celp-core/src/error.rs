//! Error handling for the codec library
//!
//! Errors are split the same way the codec treats them at runtime:
//! configuration problems are fatal and surface at construction time,
//! while anything that can be triggered by bitstream content is a
//! recoverable, per-frame failure that leaves session state untouched.

#![allow(missing_docs)]

use std::fmt;
use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error type for codec operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Invalid codec configuration (including malformed submode tables)
    #[error("Invalid codec configuration: {details}")]
    InvalidConfig { details: String },

    /// Invalid audio format
    #[error("Invalid audio format: {details}")]
    InvalidFormat { details: String },

    /// Invalid frame size
    #[error("Invalid frame size: expected {expected}, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    /// Submode index that does not name a usable submode
    #[error("Invalid submode: {submode}")]
    InvalidSubmode { submode: u32 },

    /// Packing past the end of the bit buffer
    #[error("Bitstream overflow: {requested} bits requested, {available} bits of capacity left")]
    BitstreamOverflow { requested: usize, available: usize },

    /// Unpacking past the last written bit
    #[error("Bitstream underflow: {requested} bits requested, {available} bits left")]
    BitstreamUnderflow { requested: usize, available: usize },

    /// Field width outside 0..=32
    #[error("Invalid bit width: {nbits} (supported: 0-32)")]
    InvalidBitWidth { nbits: u32 },

    /// Reserved control codes or undecodable layers in the stream
    #[error("Corrupted stream: {details}")]
    CorruptedStream { details: String },

    /// LPC to LSP root finding did not isolate every root
    #[error("LSP conversion failed: found {found} of {expected} roots")]
    LspConversionFailed { found: usize, expected: usize },

    /// Scratch arena too small for a search routine
    #[error("Scratch arena exhausted: need {requested} values, {available} available")]
    ArenaExhausted { requested: usize, available: usize },

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {message} (this is a bug, please report it)")]
    InternalError { message: String },
}

impl CodecError {
    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    /// Create a new invalid format error
    pub fn invalid_format(details: impl Into<String>) -> Self {
        Self::InvalidFormat {
            details: details.into(),
        }
    }

    /// Create a new corrupted stream error
    pub fn corrupted_stream(details: impl Into<String>) -> Self {
        Self::CorruptedStream {
            details: details.into(),
        }
    }

    /// Create a new internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable
    ///
    /// A recoverable error fails the current frame only; the session may
    /// keep going (for a decoder, typically by concealing the frame).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidConfig { .. }
            | Self::InvalidBitWidth { .. }
            | Self::ArenaExhausted { .. }
            | Self::InternalError { .. } => false,

            Self::InvalidFormat { .. }
            | Self::InvalidFrameSize { .. }
            | Self::InvalidSubmode { .. }
            | Self::BitstreamOverflow { .. }
            | Self::BitstreamUnderflow { .. }
            | Self::CorruptedStream { .. }
            | Self::LspConversionFailed { .. } => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig { .. } | Self::InvalidBitWidth { .. } => {
                ErrorCategory::Configuration
            }

            Self::InvalidFormat { .. } | Self::InvalidFrameSize { .. } => {
                ErrorCategory::Processing
            }

            Self::InvalidSubmode { .. }
            | Self::BitstreamUnderflow { .. }
            | Self::CorruptedStream { .. } => ErrorCategory::Bitstream,

            Self::BitstreamOverflow { .. } | Self::ArenaExhausted { .. } => ErrorCategory::Memory,

            Self::LspConversionFailed { .. } => ErrorCategory::Computation,

            Self::InternalError { .. } => ErrorCategory::Internal,
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Audio processing errors
    Processing,
    /// Malformed or truncated bitstreams
    Bitstream,
    /// Buffer capacity errors
    Memory,
    /// Numerical errors
    Computation,
    /// Internal library errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Processing => write!(f, "Processing"),
            Self::Bitstream => write!(f, "Bitstream"),
            Self::Memory => write!(f, "Memory"),
            Self::Computation => write!(f, "Computation"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}
