//! CELP codec interface
//!
//! Pairs an encoder and a decoder behind the [`AudioCodec`] trait, moving
//! 16-bit frames in and terminated byte packets out.

use tracing::trace;

use crate::error::Result;
use crate::types::{AudioCodec, CodecConfig, CodecInfo};
use crate::utils::validation::{validate_encoded_data, validate_frame_size};

use super::bits::{Bits, DEFAULT_CAPACITY};
use super::decoder::{CelpDecoder, DecodeStatus};
use super::encoder::CelpEncoder;
use super::modes::{FRAME_SIZE, SAMPLE_RATE};

/// Narrowband CELP codec
///
/// # Example
/// ```
/// use celp_core::{AudioCodec, CelpCodec, CodecConfig};
///
/// let mut codec = CelpCodec::new(CodecConfig::new().with_quality(4)).unwrap();
///
/// // Encode a frame of 160 samples
/// let input_frame = vec![0i16; 160];
/// let encoded = codec.encode(&input_frame).unwrap();
///
/// // Decode back to samples
/// let decoded = codec.decode(&encoded).unwrap();
/// assert_eq!(decoded.len(), 160);
/// ```
#[derive(Debug, Clone)]
pub struct CelpCodec {
    encoder: CelpEncoder,
    decoder: CelpDecoder,
    bits: Bits,
}

impl CelpCodec {
    /// Create a new codec from configuration
    pub fn new(config: CodecConfig) -> Result<Self> {
        Ok(Self {
            encoder: CelpEncoder::new(&config)?,
            decoder: CelpDecoder::new(&config)?,
            bits: Bits::new(DEFAULT_CAPACITY),
        })
    }

    /// Encode one frame into a terminated packet
    pub fn encode_frame(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        validate_frame_size(FRAME_SIZE, samples.len())?;
        let mut pcm: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();

        self.bits.reset();
        self.encoder.encode(&mut pcm, &mut self.bits)?;
        self.bits.insert_terminator()?;
        Ok(self.bits.to_bytes())
    }

    /// Decode every frame of a packet
    pub fn decode_packet(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        validate_encoded_data(data, self.bits.capacity())?;
        self.bits.read_from(data)?;

        let mut decoded = Vec::with_capacity(FRAME_SIZE);
        let mut frame = [0.0f32; FRAME_SIZE];
        let mut frames = 0;
        while let DecodeStatus::Decoded { .. } = self.decoder.decode(&mut self.bits, &mut frame)? {
            decoded.extend(frame.iter().map(|&v| to_pcm(v)));
            frames += 1;
        }
        trace!(frames, bytes = data.len(), "decoded packet");
        Ok(decoded)
    }

    /// Conceal one lost frame
    pub fn decode_lost(&mut self) -> Result<Vec<i16>> {
        let mut frame = [0.0f32; FRAME_SIZE];
        self.decoder.decode_lost(&mut frame)?;
        Ok(frame.iter().map(|&v| to_pcm(v)).collect())
    }

    /// Get the encoder
    pub fn encoder(&self) -> &CelpEncoder {
        &self.encoder
    }

    /// Get the mutable encoder
    pub fn encoder_mut(&mut self) -> &mut CelpEncoder {
        &mut self.encoder
    }

    /// Get the decoder
    pub fn decoder(&self) -> &CelpDecoder {
        &self.decoder
    }

    /// Get the mutable decoder
    pub fn decoder_mut(&mut self) -> &mut CelpDecoder {
        &mut self.decoder
    }
}

fn to_pcm(v: f32) -> i16 {
    v.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

impl AudioCodec for CelpCodec {
    fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        self.encode_frame(samples)
    }

    fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>> {
        self.decode_packet(data)
    }

    fn info(&self) -> CodecInfo {
        CodecInfo {
            name: "CELP-NB",
            sample_rate: SAMPLE_RATE,
            channels: 1,
            bitrate: self.encoder.bitrate(),
            frame_size: FRAME_SIZE,
            payload_type: None,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.encoder.reset();
        self.decoder.reset();
        self.bits.reset();
        Ok(())
    }

    fn frame_size(&self) -> usize {
        FRAME_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn tone(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| (4000.0 * (i as f32 * 0.2).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_info() {
        let codec = CelpCodec::new(CodecConfig::new().with_submode(3)).unwrap();
        let info = codec.info();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bitrate, 8000);
        assert_eq!(info.frame_size, 160);
    }

    #[test]
    fn test_packet_sizes() {
        for (submode, bytes) in [(0u8, 1usize), (1, 6), (3, 20), (5, 38), (7, 52)] {
            let mut codec = CelpCodec::new(CodecConfig::new().with_submode(submode)).unwrap();
            let packet = codec.encode(&tone(160)).unwrap();
            assert_eq!(packet.len(), bytes, "submode {}", submode);
            let decoded = codec.decode(&packet).unwrap();
            assert_eq!(decoded.len(), 160);
        }
    }

    #[test]
    fn test_concatenated_frames_decode_together() {
        let mut encoder = CelpCodec::new(CodecConfig::new().with_submode(3)).unwrap();
        let mut packet = Vec::new();
        let input = tone(480);
        for frame in input.chunks(160) {
            packet.extend(encoder.encode(frame).unwrap());
        }
        // Submode 3 frames are whole bytes, so no padding sits between them
        let mut decoder = CelpCodec::new(CodecConfig::new()).unwrap();
        assert_eq!(decoder.decode(&packet).unwrap().len(), 480);
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let mut codec = CelpCodec::new(CodecConfig::default()).unwrap();
        assert!(matches!(
            codec.encode(&tone(100)),
            Err(CodecError::InvalidFrameSize { expected: 160, actual: 100 })
        ));
        assert!(codec.decode(&[]).is_err());
    }

    #[test]
    fn test_decode_lost_after_reset() {
        let mut codec = CelpCodec::new(CodecConfig::default()).unwrap();
        codec.encode(&tone(160)).unwrap();
        codec.reset().unwrap();
        let out = codec.decode_lost().unwrap();
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_pcm_conversion_saturates() {
        assert_eq!(to_pcm(40000.0), i16::MAX);
        assert_eq!(to_pcm(-40000.0), i16::MIN);
        assert_eq!(to_pcm(1.4), 1);
    }
}
