//! Narrowband CELP decoder
//!
//! Each call consumes one frame from a [`Bits`] cursor. Control codes in
//! front of the frame are handled in a loop: wideband layers are skipped,
//! in-band requests are queued and the terminator ends the stream.
//!
//! A frame is decoded entirely into local copies of the session memories
//! and committed only once every field has been read, so truncated or
//! malformed input never leaves the decoder half-updated.

use tracing::{debug, trace, warn};

use crate::error::{CodecError, Result};
use crate::types::CodecConfig;
use crate::utils::validation::validate_frame_size;

use super::arena::ScratchArena;
use super::bits::Bits;
use super::encoder::{inband_payload_bits, EXC_HISTORY};
use super::filters::{bw_lpc, energy, iir_mem_in_place};
use super::history::RollingBuffer;
use super::innovation::{innovation_unquant, NoiseSource};
use super::lsp::{lsp_flat, lsp_interpolate_to_lpc};
use super::lsp_quant::LspIndex;
use super::ltp::{forced_pitch_unquant, pitch_unquant_3tap, PitchResult};
use super::modes::{
    dequantize_forced_gain, dequantize_ol_gain, interpolation_weight, submode,
    submode_for_quality, validate_registry, InnovationStrategy, LtpStrategy, SubmodeDescriptor,
    SubframeGain, FORCED_GAIN_BITS, FRAME_SIZE, HEADER_BITS, LPC_ORDER, LSP_MARGIN, NB_SUBFRAMES,
    NULL_BANDWIDTH, OL_GAIN_BITS, OL_PITCH_BITS, PITCH_END, PITCH_START, SUBFRAME_SIZE,
    SUBMODE_BITS, SUBMODE_INBAND, SUBMODE_TERMINATOR,
};
use super::postfilter::Enhancer;
use super::tables::WIDEBAND_LAYER_BITS;

/// Per-frame excitation decay while concealing
pub const LOSS_DECAY: f32 = 0.8;

const ARENA_SIZE: usize = 2048;

/// Outcome of one decode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A frame of the given submode was decoded
    Decoded {
        /// Submode carried in the frame header
        submode: u8,
    },
    /// A frame was synthesized without bits
    Concealed,
    /// No further frame in the packet; the output is untouched
    EndOfStream,
}

/// Out-of-band message carried ahead of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InbandRequest {
    /// Request code 0..=15
    pub id: u8,
    /// Payload, right aligned
    pub payload: u64,
}

/// Decoder session for one stream direction
#[derive(Debug, Clone)]
pub struct CelpDecoder {
    submode: &'static SubmodeDescriptor,
    enhancement: bool,
    first: bool,
    exc_history: RollingBuffer,
    old_qlsp: [f32; LPC_ORDER],
    last_qlpc: [f32; LPC_ORDER + 1],
    mem_sp: [f32; LPC_ORDER],
    enhancer: Enhancer,
    /// Enhancer synthesis memory follows `mem_sp`
    enhancer_synced: bool,
    noise: NoiseSource,
    /// Next pulse position of the vocoder, relative to the subframe start
    voc_offset: usize,
    count_lost: u32,
    last_pitch: usize,
    /// Peak of the last good frame
    last_peak: f32,
    /// Energy of the last frame produced
    last_energy: f32,
    inband: Vec<InbandRequest>,
    arena: ScratchArena,
}

impl CelpDecoder {
    /// Create a decoder; the configured submode only seeds the bit-rate query
    pub fn new(config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        validate_registry()?;

        let id = match config.submode {
            Some(id) => id,
            None => submode_for_quality(config.quality)?,
        };
        let mut old_qlsp = [0.0; LPC_ORDER];
        lsp_flat(&mut old_qlsp);
        let mut last_qlpc = [0.0; LPC_ORDER + 1];
        last_qlpc[0] = 1.0;

        debug!(submode = id, enhancement = config.enhancement, "Creating CELP decoder");
        Ok(Self {
            submode: submode(u32::from(id))?,
            enhancement: config.enhancement,
            first: true,
            exc_history: RollingBuffer::new(EXC_HISTORY),
            old_qlsp,
            last_qlpc,
            mem_sp: [0.0; LPC_ORDER],
            enhancer: Enhancer::new(),
            enhancer_synced: false,
            noise: NoiseSource::default(),
            voc_offset: 0,
            count_lost: 0,
            last_pitch: 40,
            last_peak: 0.0,
            last_energy: 0.0,
            inband: Vec::new(),
            arena: ScratchArena::with_capacity(ARENA_SIZE),
        })
    }

    /// Clear all session memories, keeping the settings
    pub fn reset(&mut self) {
        lsp_flat(&mut self.old_qlsp);
        self.last_qlpc = [0.0; LPC_ORDER + 1];
        self.last_qlpc[0] = 1.0;
        self.exc_history.clear();
        self.mem_sp = [0.0; LPC_ORDER];
        self.enhancer.reset();
        self.enhancer_synced = false;
        self.noise = NoiseSource::default();
        self.voc_offset = 0;
        self.count_lost = 0;
        self.last_pitch = 40;
        self.last_peak = 0.0;
        self.last_energy = 0.0;
        self.inband.clear();
        self.first = true;
    }

    /// Toggle perceptual enhancement
    pub fn set_enhancement(&mut self, enabled: bool) {
        if enabled != self.enhancement {
            debug!(enabled, "Decoder enhancement changed");
        }
        self.enhancement = enabled;
        self.enhancer_synced = false;
    }

    /// Perceptual enhancement state
    pub fn enhancement(&self) -> bool {
        self.enhancement
    }

    /// Samples per frame
    pub fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    /// Submode of the last decoded frame
    pub fn submode(&self) -> u8 {
        self.submode.id
    }

    /// Bit rate of the last decoded frame's submode
    pub fn bitrate(&self) -> u32 {
        self.submode.bitrate()
    }

    /// Consecutive frames concealed so far
    pub fn lost_frames(&self) -> u32 {
        self.count_lost
    }

    /// Drain the in-band requests seen since the last call
    pub fn take_inband_requests(&mut self) -> Vec<InbandRequest> {
        std::mem::take(&mut self.inband)
    }

    /// Decode the next frame from `bits` into `out`
    pub fn decode(&mut self, bits: &mut Bits, out: &mut [f32]) -> Result<DecodeStatus> {
        validate_frame_size(FRAME_SIZE, out.len())?;

        let mode = loop {
            if bits.remaining() < HEADER_BITS {
                return Ok(DecodeStatus::EndOfStream);
            }
            if bits.unpack_unsigned(1)? == 1 {
                self.skip_wideband_layer(bits)?;
                continue;
            }
            match bits.unpack_unsigned(SUBMODE_BITS)? {
                SUBMODE_TERMINATOR => return Ok(DecodeStatus::EndOfStream),
                SUBMODE_INBAND => self.read_inband_request(bits)?,
                id @ 0..=7 => break submode(id)?,
                id => return Err(CodecError::InvalidSubmode { submode: id }),
            }
        };

        let needed = mode.bits_per_frame - HEADER_BITS;
        if bits.remaining() < needed {
            return Err(CodecError::BitstreamUnderflow {
                requested: needed,
                available: bits.remaining(),
            });
        }

        if mode.id != self.submode.id {
            debug!(from = self.submode.id, to = mode.id, "Decoder submode switch");
        }
        match mode.lsp {
            None => self.decode_null(mode, out)?,
            Some(_) => self.decode_frame(mode, bits, out)?,
        }
        Ok(DecodeStatus::Decoded { submode: mode.id })
    }

    fn skip_wideband_layer(&mut self, bits: &mut Bits) -> Result<()> {
        let layer = bits.unpack_unsigned(3)? as usize;
        let size = WIDEBAND_LAYER_BITS[layer];
        if size == 0 {
            return Err(CodecError::corrupted_stream(format!(
                "wideband layer {} has no defined size",
                layer
            )));
        }
        trace!(layer, size, "skipping wideband layer");
        bits.advance(size - 4)
    }

    fn read_inband_request(&mut self, bits: &mut Bits) -> Result<()> {
        let id = bits.unpack_unsigned(4)? as u8;
        let width = inband_payload_bits(id);
        let payload = if width > 32 {
            let high = u64::from(bits.unpack_unsigned(width - 32)?);
            (high << 32) | u64::from(bits.unpack_unsigned(32)?)
        } else {
            u64::from(bits.unpack_unsigned(width)?)
        };
        if id == 0 {
            self.set_enhancement(payload != 0);
        }
        debug!(id, payload, "In-band request");
        self.inband.push(InbandRequest { id, payload });
        Ok(())
    }

    /// Header-only frame: the held filter rings out on zero excitation
    fn decode_null(&mut self, mode: &'static SubmodeDescriptor, out: &mut [f32]) -> Result<()> {
        let mut held = [0.0f32; LPC_ORDER + 1];
        bw_lpc(NULL_BANDWIDTH, &self.last_qlpc, &mut held);
        out.fill(0.0);
        iir_mem_in_place(out, &held, &mut self.mem_sp);

        self.exc_history.append(&[0.0; FRAME_SIZE]);
        self.submode = mode;
        self.first = true;
        self.count_lost = 0;
        self.enhancer_synced = false;
        self.last_peak = peak(out);
        self.last_energy = energy(out);
        Ok(())
    }

    fn decode_frame(
        &mut self,
        mode: &'static SubmodeDescriptor,
        bits: &mut Bits,
        out: &mut [f32],
    ) -> Result<()> {
        let Some(quantizer) = mode.lsp else {
            return Err(CodecError::internal_error("null submode in frame decoder"));
        };
        let mut scope = self.arena.scope();

        let index = LspIndex::unpack(quantizer, bits)?;
        let mut qlsp = [0.0f32; LPC_ORDER];
        quantizer.unquantize(&index, &mut qlsp);

        let mut mem_sp = self.mem_sp;
        let mut old_qlsp = self.old_qlsp;
        if self.count_lost > 0 && !self.first {
            let distance: f32 = old_qlsp.iter().zip(&qlsp).map(|(a, b)| (a - b).abs()).sum();
            let fact = 0.6 * (-0.2 * distance).exp();
            mem_sp.iter_mut().for_each(|m| *m *= fact);
            trace!(distance, fact, "damping synthesis memory after loss");
        }
        if self.first || self.count_lost > 0 {
            old_qlsp = qlsp;
        }

        let ol_pitch = if mode.ol_pitch.is_some() {
            PITCH_START + bits.unpack_unsigned(OL_PITCH_BITS)? as usize
        } else {
            0
        };
        let forced_coef = if mode.forced_pitch_gain {
            dequantize_forced_gain(bits.unpack_unsigned(FORCED_GAIN_BITS)?)
        } else {
            0.0
        };
        let ol_gain = dequantize_ol_gain(bits.unpack_unsigned(OL_GAIN_BITS)?);

        let vocoder = matches!(mode.innovation, InnovationStrategy::Noise);
        let voicing = (1.5 * (forced_coef - 0.2)).clamp(0.0, 1.0);
        let mut voc_offset = self.voc_offset;

        let mut enhancer = self.enhancer.clone();
        if self.enhancement && !self.enhancer_synced {
            enhancer.sync(&mem_sp);
        }
        let mut noise = self.noise.clone();

        let exc = scope.alloc(EXC_HISTORY + FRAME_SIZE)?;
        self.exc_history.copy_tail(&mut exc[..EXC_HISTORY]);
        let mut ak = [0.0f32; LPC_ORDER + 1];
        let mut last_pitch = self.last_pitch;

        for sub in 0..NB_SUBFRAMES {
            let offset = sub * SUBFRAME_SIZE;
            let mut local = scope.scope();

            let t = interpolation_weight(sub);
            lsp_interpolate_to_lpc(&old_qlsp, &qlsp, t, LSP_MARGIN, &mut ak);

            let (history, rest) = exc.split_at_mut(EXC_HISTORY + offset);
            let current = &mut rest[..SUBFRAME_SIZE];
            let pitch = match mode.ltp {
                LtpStrategy::None => {
                    current.fill(0.0);
                    PitchResult {
                        lag: last_pitch,
                        gains: [0.0; 3],
                    }
                }
                LtpStrategy::Forced => forced_pitch_unquant(history, current, ol_pitch, forced_coef),
                LtpStrategy::ThreeTap(params) => {
                    pitch_unquant_3tap(history, current, params, mode.pitch_range(ol_pitch), bits)?
                }
            };
            last_pitch = pitch.lag;

            let ener = match mode.subframe_gain {
                SubframeGain::None => ol_gain,
                gain => {
                    let (levels, _) = gain.table();
                    let q = bits.unpack_unsigned(gain.bits())? as usize;
                    levels[q.min(levels.len() - 1)] * ol_gain
                }
            };

            let innov = local.alloc(SUBFRAME_SIZE)?;
            innovation_unquant(mode.innovation, innov, bits, &mut noise)?;
            for (e, i) in current.iter_mut().zip(innov.iter()) {
                *e += ener * i;
            }

            // Excitation that drives the synthesis; only the vocoder differs
            // from the one kept in the history
            let drive = local.alloc_copy(current)?;
            if vocoder {
                let amplitude = (2.0 * ol_pitch as f32).sqrt() * voicing * ol_gain;
                drive.iter_mut().for_each(|v| *v *= 1.0 - 0.8 * voicing);
                while voc_offset < SUBFRAME_SIZE {
                    drive[voc_offset] += amplitude;
                    voc_offset += ol_pitch;
                }
                voc_offset -= SUBFRAME_SIZE;
            }

            let synth = &mut out[offset..offset + SUBFRAME_SIZE];
            synth.copy_from_slice(drive);
            iir_mem_in_place(synth, &ak, &mut mem_sp);

            if self.enhancement {
                let enhanced = local.alloc(SUBFRAME_SIZE)?;
                enhancer.process_subframe(
                    history,
                    drive,
                    &ak,
                    pitch.lag,
                    pitch.total_gain(),
                    mode.comb_gain,
                    synth,
                    enhanced,
                );
                synth.copy_from_slice(enhanced);
            }
        }

        if self.count_lost > 0 {
            debug!(lost = self.count_lost, "Resuming after concealment");
        }
        self.exc_history.append(&exc[EXC_HISTORY..]);
        self.old_qlsp = qlsp;
        self.last_qlpc = ak;
        self.mem_sp = mem_sp;
        self.enhancer = enhancer;
        self.enhancer_synced = self.enhancement;
        self.noise = noise;
        self.voc_offset = voc_offset;
        self.last_pitch = last_pitch;
        self.count_lost = 0;
        self.first = false;
        self.submode = mode;
        self.last_peak = peak(out);
        self.last_energy = energy(out);
        Ok(())
    }

    /// Conceal one lost frame
    ///
    /// The last pitch period of the excitation is repeated with a decay of
    /// 0.8 per lost frame and filtered through the held LPC. The output is
    /// limited to `G·0.8^n` (G the peak of the last good frame) and never
    /// exceeds the previous frame's energy.
    pub fn decode_lost(&mut self, out: &mut [f32]) -> Result<DecodeStatus> {
        validate_frame_size(FRAME_SIZE, out.len())?;
        let mut scope = self.arena.scope();

        let lost = self.count_lost + 1;
        let pitch = self.last_pitch.clamp(PITCH_START, PITCH_END);
        let exc = scope.alloc(EXC_HISTORY + FRAME_SIZE)?;
        self.exc_history.copy_tail(&mut exc[..EXC_HISTORY]);
        let period = EXC_HISTORY - pitch;
        for i in 0..FRAME_SIZE {
            exc[EXC_HISTORY + i] = LOSS_DECAY * exc[period + i % pitch];
        }

        let mut mem_sp = self.mem_sp;
        out.copy_from_slice(&exc[EXC_HISTORY..]);
        iir_mem_in_place(out, &self.last_qlpc, &mut mem_sp);

        let bound = self.last_peak * LOSS_DECAY.powi(lost as i32);
        let frame_peak = peak(out);
        let frame_energy = energy(out);
        let mut scale = 1.0f32;
        if frame_peak > bound {
            scale = bound / frame_peak;
        }
        if frame_energy * scale * scale > self.last_energy {
            scale = scale.min((self.last_energy / frame_energy).sqrt());
        }
        if scale < 1.0 {
            out.iter_mut().for_each(|v| *v *= scale);
            mem_sp.iter_mut().for_each(|m| *m *= scale);
            exc[EXC_HISTORY..].iter_mut().for_each(|e| *e *= scale);
        }

        if lost == 1 {
            warn!(pitch, "Frame lost, concealing");
        } else {
            trace!(lost, scale, "concealing");
        }
        self.exc_history.append(&exc[EXC_HISTORY..]);
        self.mem_sp = mem_sp;
        self.count_lost = lost;
        self.enhancer_synced = false;
        self.last_energy = energy(out);
        Ok(DecodeStatus::Concealed)
    }
}

fn peak(x: &[f32]) -> f32 {
    x.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celp::encoder::CelpEncoder;

    fn decoder() -> CelpDecoder {
        CelpDecoder::new(&CodecConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_stream_is_end_of_stream() {
        let mut dec = decoder();
        let mut bits = Bits::new(4);
        let mut out = [0.0; FRAME_SIZE];
        assert_eq!(dec.decode(&mut bits, &mut out).unwrap(), DecodeStatus::EndOfStream);
    }

    #[test]
    fn test_terminator_ends_stream() {
        let mut bits = Bits::new(4);
        bits.pack(0, 1).unwrap();
        bits.pack(SUBMODE_TERMINATOR, 4).unwrap();
        let mut out = [1.0; FRAME_SIZE];
        assert_eq!(
            decoder().decode(&mut bits, &mut out).unwrap(),
            DecodeStatus::EndOfStream
        );
        assert!(out.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_reserved_submode_is_rejected() {
        for id in 8..=13 {
            let mut bits = Bits::new(8);
            bits.pack(0, 1).unwrap();
            bits.pack(id, 4).unwrap();
            bits.pack(0, 32).unwrap();
            let mut out = [0.0; FRAME_SIZE];
            assert_eq!(
                decoder().decode(&mut bits, &mut out),
                Err(CodecError::InvalidSubmode { submode: id })
            );
        }
    }

    #[test]
    fn test_inband_enhancement_request() {
        let mut dec = decoder();
        let mut bits = Bits::new(8);
        CelpEncoder::write_inband_request(&mut bits, 0, 0).unwrap();
        CelpEncoder::write_inband_request(&mut bits, 12, 0xdead_beef).unwrap();
        bits.insert_terminator().unwrap();
        let mut out = [0.0; FRAME_SIZE];
        assert_eq!(dec.decode(&mut bits, &mut out).unwrap(), DecodeStatus::EndOfStream);
        assert!(!dec.enhancement());
        assert_eq!(
            dec.take_inband_requests(),
            vec![
                InbandRequest { id: 0, payload: 0 },
                InbandRequest {
                    id: 12,
                    payload: 0xdead_beef
                },
            ]
        );
        assert!(dec.take_inband_requests().is_empty());
    }

    #[test]
    fn test_undefined_wideband_layer_is_corrupt() {
        let mut bits = Bits::new(8);
        bits.pack(1, 1).unwrap();
        bits.pack(5, 3).unwrap();
        bits.pack(0, 16).unwrap();
        let mut out = [0.0; FRAME_SIZE];
        assert!(matches!(
            decoder().decode(&mut bits, &mut out),
            Err(CodecError::CorruptedStream { .. })
        ));
    }

    #[test]
    fn test_loss_before_any_frame_is_silent() {
        let mut dec = decoder();
        let mut out = [1.0; FRAME_SIZE];
        assert_eq!(dec.decode_lost(&mut out).unwrap(), DecodeStatus::Concealed);
        assert!(out.iter().all(|v| *v == 0.0));
        assert_eq!(dec.lost_frames(), 1);
    }

    #[test]
    fn test_null_frame_after_reset_is_silent() {
        let mut dec = decoder();
        let mut bits = Bits::new(4);
        bits.pack(0, 5).unwrap();
        let mut out = [1.0; FRAME_SIZE];
        assert_eq!(
            dec.decode(&mut bits, &mut out).unwrap(),
            DecodeStatus::Decoded { submode: 0 }
        );
        assert!(out.iter().all(|v| *v == 0.0));
        assert_eq!(dec.bitrate(), 250);
    }
}
