//! Narrowband CELP speech codec
//!
//! Analysis-by-synthesis coding of 8 kHz speech in 20 ms frames. The
//! implementation is split into several modules:
//! - `codec`: [`AudioCodec`](crate::AudioCodec) front end
//! - `encoder` / `decoder`: per-stream state machines
//! - `modes`: constants and the submode registry
//! - `bits`: MSB-first bit packing
//! - `lpc`, `lsp`, `lsp_quant`: spectral envelope analysis and coding
//! - `filters`: perceptual weighting and synthesis filters
//! - `ltp`: open-loop and closed-loop pitch prediction
//! - `innovation`, `multipulse`: fixed-codebook excitation
//! - `postfilter`: decoder perceptual enhancement
//! - `tables`: codebooks and scalar gain tables
//! - `arena`, `history`: scratch memory and rolling signal buffers

pub mod arena;
pub mod bits;
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod filters;
pub mod history;
pub mod innovation;
pub mod lpc;
pub mod lsp;
pub mod lsp_quant;
pub mod ltp;
pub mod modes;
pub mod multipulse;
pub mod postfilter;
pub mod tables;

#[cfg(test)]
mod tests;

// Re-export the main codec struct
pub use codec::CelpCodec;

// Re-export the session types
pub use bits::Bits;
pub use decoder::{CelpDecoder, DecodeStatus, InbandRequest};
pub use encoder::CelpEncoder;
pub use modes::{SubmodeDescriptor, FRAME_SIZE, NARROWBAND_SUBMODES, SAMPLE_RATE};
