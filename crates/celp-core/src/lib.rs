//! # CELP-Core: Narrowband Speech Codec Library
//!
//! This library implements a narrowband (8 kHz) code-excited linear
//! prediction speech codec for VoIP applications: an analysis-by-synthesis
//! encoder and a decoder with packet-loss concealment and perceptual
//! enhancement.
//!
//! ## Features
//!
//! - **Eight submodes** from 250 bps (header only) to 20.6 kbps, selected
//!   by quality level or directly
//! - **Exact bit budgets**: every frame of a submode has the same size
//! - **Robust decoding**: malformed frames fail without corrupting state,
//!   lost frames are concealed by pitch repetition
//! - **Stream control codes**: in-band requests, terminators and skipping
//!   of wideband layers
//!
//! ## Usage
//!
//! ```rust
//! use celp_core::{AudioCodec, CelpCodec, CodecConfig};
//!
//! // Create an 8 kbps codec
//! let config = CodecConfig::new().with_submode(3);
//! let mut codec = CelpCodec::new(config)?;
//!
//! // Encode audio samples
//! let samples = vec![0i16; 160]; // 20ms at 8kHz
//! let encoded = codec.encode(&samples)?;
//! assert_eq!(encoded.len(), 20);
//!
//! // Decode back to samples
//! let decoded = codec.decode(&encoded)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub mod celp;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use celp::{Bits, CelpCodec, CelpDecoder, CelpEncoder, DecodeStatus, InbandRequest};
pub use error::{CodecError, ErrorCategory, Result};
pub use types::{AudioCodec, CodecConfig, CodecInfo};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the codec library
///
/// Installs a `tracing` subscriber if none is set and validates the
/// submode registry. It's safe to call multiple times.
///
/// # Errors
///
/// Returns an error if a submode descriptor is inconsistent
pub fn init() -> Result<()> {
    // Initialize logging if not already done
    let _ = tracing_subscriber::fmt::try_init();

    celp::modes::validate_registry()?;

    tracing::info!("CELP-Core v{} initialized", VERSION);
    tracing::info!(
        "Submodes: {:?}",
        celp::NARROWBAND_SUBMODES
            .iter()
            .map(|m| m.name)
            .collect::<Vec<_>>()
    );

    Ok(())
}

/// Get library information
pub fn info() -> LibraryInfo {
    LibraryInfo {
        version: VERSION,
        sample_rate: celp::SAMPLE_RATE,
        frame_size: celp::FRAME_SIZE,
        bitrates: celp::NARROWBAND_SUBMODES
            .iter()
            .map(|m| m.bitrate())
            .collect(),
    }
}

/// Library information structure
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    /// Library version
    pub version: &'static str,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frame size in samples
    pub frame_size: usize,
    /// Bit rate of each submode, by submode index
    pub bitrates: Vec<u32>,
}
