//! Core types and traits for the codec library
//!
//! This module defines the codec-facing API: the [`AudioCodec`] trait used
//! by callers that move whole 16-bit frames and packets, the
//! [`CodecInfo`] descriptor, and the [`CodecConfig`] builder.

use crate::error::{CodecError, Result};

/// Primary trait for audio codecs
///
/// This trait defines the core operations that all audio codecs must implement:
/// encoding, decoding, and configuration management.
pub trait AudioCodec: Send + Sync {
    /// Encode one frame of audio samples to compressed data
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or input is invalid
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>>;

    /// Decode compressed data to audio samples
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or data is invalid
    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>>;

    /// Get codec information
    fn info(&self) -> CodecInfo;

    /// Reset codec state
    ///
    /// This clears all internal state and prepares the codec for fresh input.
    /// Useful for handling stream discontinuities.
    fn reset(&mut self) -> Result<()>;

    /// Get the expected frame size in samples
    fn frame_size(&self) -> usize;
}

/// Audio codec information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Codec name
    pub name: &'static str,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Bitrate in bits per second for the active submode
    pub bitrate: u32,
    /// Frame size in samples
    pub frame_size: usize,
    /// RTP payload type (if standard)
    pub payload_type: Option<u8>,
}

/// Codec configuration
///
/// Selects the operating point of an encoder/decoder pair. An explicit
/// `submode` overrides the submode implied by `quality`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Quality level 0..=10
    pub quality: u8,
    /// Explicit submode, overriding `quality`
    pub submode: Option<u8>,
    /// Search effort 1..=10 (number of pitch candidates examined)
    pub complexity: u8,
    /// Decoder perceptual enhancement
    pub enhancement: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            quality: 8,
            submode: None,
            complexity: 2,
            enhancement: true,
        }
    }
}

impl CodecConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set quality level
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Pin a submode
    pub fn with_submode(mut self, submode: u8) -> Self {
        self.submode = Some(submode);
        self
    }

    /// Set search complexity
    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity;
        self
    }

    /// Enable or disable decoder enhancement
    pub fn with_enhancement(mut self, enhancement: bool) -> Self {
        self.enhancement = enhancement;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.quality > 10 {
            return Err(CodecError::invalid_config(format!(
                "Quality {} out of range 0-10",
                self.quality
            )));
        }

        if let Some(submode) = self.submode {
            if submode > 7 {
                return Err(CodecError::invalid_config(format!(
                    "Submode {} out of range 0-7",
                    submode
                )));
            }
        }

        if !(1..=10).contains(&self.complexity) {
            return Err(CodecError::invalid_config(format!(
                "Complexity {} out of range 1-10",
                self.complexity
            )));
        }

        Ok(())
    }
}
