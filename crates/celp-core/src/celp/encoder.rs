//! Narrowband CELP encoder
//!
//! One call encodes one 160-sample frame:
//!
//! 1. LPC analysis over 40 past samples plus the frame, conversion to LSPs
//! 2. Whole-frame perceptual weighting with the mid-frame filter and
//!    open-loop pitch search
//! 3. Open-loop excitation gain from the LPC residual
//! 4. LSP quantization and the frame-level fields
//! 5. Per subframe: interpolated filters, target, adaptive codebook,
//!    gain correction, innovation, synthesis
//!
//! All session memories are updated only after the whole frame has been
//! coded, so a failing call leaves the encoder untouched.

use tracing::{debug, trace, warn};

use crate::error::{CodecError, Result};
use crate::types::CodecConfig;
use crate::utils::validation::{validate_frame_size, validate_samples};

use super::arena::ScratchArena;
use super::bits::Bits;
use super::filters::{
    bw_lpc, compute_impulse_response, compute_rms, filter_mem, filter_mem_in_place, fir_mem,
    iir_mem_in_place, residue_percep_zero, SubframeFilters,
};
use super::history::RollingBuffer;
use super::innovation::innovation_quant;
use super::lpc::analyze;
use super::lsp::{lpc_to_lsp_checked, lsp_flat, lsp_interpolate_to_lpc};
use super::ltp::{forced_pitch_quant, open_loop_nbest_pitch, pitch_search_3tap, PitchCandidate};
use super::modes::{
    dequantize_forced_gain, dequantize_ol_gain, interpolation_weight, quantize_forced_gain,
    quantize_ol_gain, submode, submode_for_quality, validate_registry, LtpStrategy,
    SubmodeDescriptor, SubframeGain, ANALYSIS_HISTORY, FORCED_GAIN_BITS, FRAME_SIZE, GAMMA1,
    GAMMA2, LPC_ORDER, LSP_BISECTIONS, LSP_GRID_DELTA, LSP_MARGIN, NB_SUBFRAMES, NULL_BANDWIDTH,
    OL_GAIN_BITS, OL_PITCH_BITS, PITCH_END, PITCH_START, SUBFRAME_SIZE, SUBMODE_BITS,
    SUBMODE_INBAND, WIDEBAND_FLAG_BITS, WINDOW_SIZE,
};
use super::tables::scalar_quant;

/// Excitation history kept before the current frame
pub const EXC_HISTORY: usize = PITCH_END + 2;

/// Scratch values available to one frame
pub(crate) const ARENA_SIZE: usize = 8192;

/// Payload width of an in-band request
pub fn inband_payload_bits(id: u8) -> u32 {
    match id {
        0..=1 => 1,
        2..=7 => 4,
        8..=9 => 8,
        10..=11 => 16,
        12..=13 => 32,
        _ => 64,
    }
}

/// LPC to LSP conversion used by the analysis step
pub(crate) type LspSearch = fn(&[f32], &mut [f32], usize, f32) -> Result<()>;

/// Encoder session for one stream direction
#[derive(Debug, Clone)]
pub struct CelpEncoder {
    submode: &'static SubmodeDescriptor,
    quality: u8,
    complexity: u8,
    /// Next frame starts without interpolation
    first: bool,
    speech_history: RollingBuffer,
    sw_history: RollingBuffer,
    exc_history: RollingBuffer,
    old_lsp: [f32; LPC_ORDER],
    old_qlsp: [f32; LPC_ORDER],
    /// Filter of the last coded subframe
    last_qlpc: [f32; LPC_ORDER + 1],
    /// Synthesis filter memory
    mem_sp: [f32; LPC_ORDER],
    /// Weighting filter memory driven by the synthesized signal
    mem_sw: [f32; LPC_ORDER],
    /// Weighting filter memory of the whole-frame weighted speech
    mem_sw_whole: [f32; LPC_ORDER],
    /// Inverse filter memory for the open-loop gain
    mem_exc: [f32; LPC_ORDER],
    lsp_search: LspSearch,
    arena: ScratchArena,
}

impl CelpEncoder {
    /// Create an encoder from a validated configuration
    pub fn new(config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        validate_registry()?;

        let id = match config.submode {
            Some(id) => id,
            None => submode_for_quality(config.quality)?,
        };
        let mut old_lsp = [0.0; LPC_ORDER];
        lsp_flat(&mut old_lsp);
        let mut last_qlpc = [0.0; LPC_ORDER + 1];
        last_qlpc[0] = 1.0;

        debug!(
            submode = id,
            quality = config.quality,
            complexity = config.complexity,
            "Creating CELP encoder"
        );
        Ok(Self {
            submode: submode(u32::from(id))?,
            quality: config.quality,
            complexity: config.complexity,
            first: true,
            speech_history: RollingBuffer::new(ANALYSIS_HISTORY),
            sw_history: RollingBuffer::new(PITCH_END),
            exc_history: RollingBuffer::new(EXC_HISTORY),
            old_lsp,
            old_qlsp: old_lsp,
            last_qlpc,
            mem_sp: [0.0; LPC_ORDER],
            mem_sw: [0.0; LPC_ORDER],
            mem_sw_whole: [0.0; LPC_ORDER],
            mem_exc: [0.0; LPC_ORDER],
            lsp_search: lpc_to_lsp_checked,
            arena: ScratchArena::with_capacity(ARENA_SIZE),
        })
    }

    /// Clear all session memories, keeping the settings
    pub fn reset(&mut self) {
        lsp_flat(&mut self.old_lsp);
        self.old_qlsp = self.old_lsp;
        self.last_qlpc = [0.0; LPC_ORDER + 1];
        self.last_qlpc[0] = 1.0;
        self.speech_history.clear();
        self.sw_history.clear();
        self.exc_history.clear();
        self.mem_sp = [0.0; LPC_ORDER];
        self.mem_sw = [0.0; LPC_ORDER];
        self.mem_sw_whole = [0.0; LPC_ORDER];
        self.mem_exc = [0.0; LPC_ORDER];
        self.first = true;
    }

    /// Select the submode of a quality level 0..=10
    pub fn set_quality(&mut self, quality: u8) -> Result<()> {
        let id = submode_for_quality(quality)?;
        self.submode = submode(u32::from(id))?;
        self.quality = quality;
        debug!(quality, submode = id, "Encoder quality changed");
        Ok(())
    }

    /// Current quality level
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Select a submode directly
    pub fn set_submode(&mut self, id: u8) -> Result<()> {
        self.submode = submode(u32::from(id)).map_err(|_| {
            CodecError::invalid_config(format!("Submode {} out of range 0-7", id))
        })?;
        debug!(submode = id, "Encoder submode changed");
        Ok(())
    }

    /// Active submode
    pub fn submode(&self) -> u8 {
        self.submode.id
    }

    /// Number of pitch candidates scored per subframe, 1..=10
    pub fn set_complexity(&mut self, complexity: u8) -> Result<()> {
        if !(1..=10).contains(&complexity) {
            return Err(CodecError::invalid_config(format!(
                "Complexity {} out of range 1-10",
                complexity
            )));
        }
        self.complexity = complexity;
        Ok(())
    }

    /// Current complexity
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    /// Samples per frame
    pub fn frame_size(&self) -> usize {
        FRAME_SIZE
    }

    /// Bit rate of the active submode
    pub fn bitrate(&self) -> u32 {
        self.submode.bitrate()
    }

    /// Algorithmic delay in samples
    ///
    /// Analysis only reaches back into past samples, so each frame is
    /// coded without waiting for later input.
    pub fn lookahead(&self) -> usize {
        0
    }

    /// Write an in-band request ahead of the next frame
    pub fn write_inband_request(bits: &mut Bits, id: u8, payload: u64) -> Result<()> {
        if id > 15 {
            return Err(CodecError::invalid_config(format!(
                "In-band request id {} out of range 0-15",
                id
            )));
        }
        let width = inband_payload_bits(id);
        let needed = (WIDEBAND_FLAG_BITS + SUBMODE_BITS + 4 + width) as usize;
        if bits.remaining_capacity() < needed {
            return Err(CodecError::BitstreamOverflow {
                requested: needed,
                available: bits.remaining_capacity(),
            });
        }
        bits.pack(0, WIDEBAND_FLAG_BITS)?;
        bits.pack(SUBMODE_INBAND, SUBMODE_BITS)?;
        bits.pack(u32::from(id), 4)?;
        if width > 32 {
            bits.pack((payload >> 32) as u32, width - 32)?;
            bits.pack(payload as u32, 32)?;
        } else {
            bits.pack(payload as u32, width)?;
        }
        Ok(())
    }

    /// Encode one frame
    ///
    /// `pcm` holds 160 samples in the 16-bit amplitude domain and is
    /// replaced by the encoder's own reconstruction. Exactly the active
    /// submode's `bits_per_frame` bits are appended to `bits`.
    pub fn encode(&mut self, pcm: &mut [f32], bits: &mut Bits) -> Result<()> {
        validate_frame_size(FRAME_SIZE, pcm.len())?;
        validate_samples(pcm)?;
        let mode = self.submode;
        if bits.remaining_capacity() < mode.bits_per_frame {
            return Err(CodecError::BitstreamOverflow {
                requested: mode.bits_per_frame,
                available: bits.remaining_capacity(),
            });
        }
        let start_bits = bits.bits_written();
        let mut scope = self.arena.scope();

        // Step 1: LPC analysis and LSPs
        let window = scope.alloc(WINDOW_SIZE)?;
        self.speech_history.copy_tail(&mut window[..ANALYSIS_HISTORY]);
        window[ANALYSIS_HISTORY..].copy_from_slice(pcm);
        let windowed = scope.alloc(WINDOW_SIZE)?;
        let mut lpc = [0.0f32; LPC_ORDER + 1];
        analyze(window, windowed, &mut lpc);

        let mut lsp = [0.0f32; LPC_ORDER];
        if let Err(e) = (self.lsp_search)(&lpc, &mut lsp, LSP_BISECTIONS, LSP_GRID_DELTA) {
            warn!(error = %e, "LSP root search failed, reusing previous LSPs");
            lsp = self.old_lsp;
        }
        let old_lsp = if self.first { lsp } else { self.old_lsp };

        // Step 2: whole-frame weighted speech and open-loop pitch
        let mut mid_lpc = [0.0f32; LPC_ORDER + 1];
        lsp_interpolate_to_lpc(&old_lsp, &lsp, 0.5, LSP_MARGIN, &mut mid_lpc);
        let mut bw1 = [0.0f32; LPC_ORDER + 1];
        let mut bw2 = [0.0f32; LPC_ORDER + 1];
        bw_lpc(GAMMA1, &mid_lpc, &mut bw1);
        bw_lpc(GAMMA2, &mid_lpc, &mut bw2);

        let sw = scope.alloc(PITCH_END + FRAME_SIZE)?;
        self.sw_history.copy_tail(&mut sw[..PITCH_END]);
        let mut mem_sw_whole = self.mem_sw_whole;
        filter_mem(pcm, &bw1, &bw2, &mut sw[PITCH_END..], &mut mem_sw_whole);

        let mut ol = [PitchCandidate {
            lag: PITCH_START,
            score: 0.0,
            gain: 0.0,
        }; 1];
        open_loop_nbest_pitch(sw, PITCH_END, PITCH_START, PITCH_END, FRAME_SIZE, &mut ol);
        let ol_pitch = ol[0].lag;

        // Step 3: open-loop excitation gain
        let residual = scope.alloc(FRAME_SIZE)?;
        let mut mem_exc = self.mem_exc;
        fir_mem(pcm, &mid_lpc, residual, &mut mem_exc);
        let qe = quantize_ol_gain(compute_rms(residual));
        let ol_gain = dequantize_ol_gain(qe);

        bits.pack(0, WIDEBAND_FLAG_BITS)?;
        bits.pack(u32::from(mode.id), SUBMODE_BITS)?;

        let original = scope.alloc_copy(pcm)?;
        let synth = scope.alloc(FRAME_SIZE)?;
        let exc = scope.alloc(EXC_HISTORY + FRAME_SIZE)?;
        self.exc_history.copy_tail(&mut exc[..EXC_HISTORY]);
        let mut mem_sp = self.mem_sp;
        let mut mem_sw = self.mem_sw;

        let Some(quantizer) = mode.lsp else {
            // Header-only frame: the held filter rings out on zero excitation
            let mut held = [0.0f32; LPC_ORDER + 1];
            bw_lpc(NULL_BANDWIDTH, &self.last_qlpc, &mut held);
            iir_mem_in_place(synth, &held, &mut mem_sp);

            check_frame_bits(mode, bits, start_bits)?;
            self.speech_history.append(original);
            self.sw_history.append(&sw[PITCH_END..]);
            self.exc_history.append(&exc[EXC_HISTORY..]);
            self.old_lsp = lsp;
            self.mem_sp = mem_sp;
            self.mem_sw = [0.0; LPC_ORDER];
            self.mem_sw_whole = mem_sw_whole;
            self.mem_exc = mem_exc;
            self.first = true;
            pcm.copy_from_slice(synth);
            trace!("null frame");
            return Ok(());
        };

        // Step 4: frame-level fields
        let index = quantizer.quantize(&lsp);
        index.pack(bits)?;
        let mut qlsp = [0.0f32; LPC_ORDER];
        quantizer.unquantize(&index, &mut qlsp);
        let old_qlsp = if self.first { qlsp } else { self.old_qlsp };

        if mode.ol_pitch.is_some() {
            bits.pack((ol_pitch - PITCH_START) as u32, OL_PITCH_BITS)?;
        }
        let forced_coef = if mode.forced_pitch_gain {
            let q = quantize_forced_gain(ol[0].gain);
            bits.pack(q, FORCED_GAIN_BITS)?;
            dequantize_forced_gain(q)
        } else {
            0.0
        };
        bits.pack(qe, OL_GAIN_BITS)?;
        trace!(ol_pitch, qe, "frame parameters");

        // Step 5: subframes
        let mut ak = [0.0f32; LPC_ORDER + 1];
        for sub in 0..NB_SUBFRAMES {
            let offset = sub * SUBFRAME_SIZE;
            let range = offset..offset + SUBFRAME_SIZE;
            let mut local = scope.scope();

            let t = interpolation_weight(sub);
            let mut lpc_w = [0.0f32; LPC_ORDER + 1];
            lsp_interpolate_to_lpc(&old_lsp, &lsp, t, LSP_MARGIN, &mut lpc_w);
            lsp_interpolate_to_lpc(&old_qlsp, &qlsp, t, LSP_MARGIN, &mut ak);
            bw_lpc(GAMMA1, &lpc_w, &mut bw1);
            bw_lpc(GAMMA2, &lpc_w, &mut bw2);

            let impulse = local.alloc(SUBFRAME_SIZE)?;
            compute_impulse_response(&ak, &bw1, &bw2, impulse);
            let filters = SubframeFilters {
                ak: &ak,
                awk1: &bw1,
                awk2: &bw2,
                impulse,
            };

            // Zero-input response of synthesis plus weighting
            let ringing = local.alloc(SUBFRAME_SIZE)?;
            iir_mem_in_place(ringing, &ak, &mut mem_sp.clone());
            filter_mem_in_place(ringing, &bw1, &bw2, &mut mem_sw.clone());

            let target = local.alloc_copy(&original[range.clone()])?;
            filter_mem_in_place(target, &bw1, &bw2, &mut mem_sw.clone());
            for (t, r) in target.iter_mut().zip(ringing.iter()) {
                *t -= r;
            }

            let (history, rest) = exc.split_at_mut(EXC_HISTORY + offset);
            let current = &mut rest[..SUBFRAME_SIZE];
            match mode.ltp {
                LtpStrategy::None => current.fill(0.0),
                LtpStrategy::Forced => {
                    forced_pitch_quant(
                        target,
                        &filters,
                        history,
                        current,
                        ol_pitch,
                        forced_coef,
                        &mut local,
                    )?;
                }
                LtpStrategy::ThreeTap(params) => {
                    pitch_search_3tap(
                        target,
                        sw,
                        PITCH_END + offset,
                        &filters,
                        history,
                        current,
                        params,
                        mode.pitch_range(ol_pitch),
                        usize::from(self.complexity),
                        bits,
                        &mut local,
                    )?;
                }
            }

            let ener = match mode.subframe_gain {
                SubframeGain::None => ol_gain,
                gain => {
                    let real = local.alloc(SUBFRAME_SIZE)?;
                    residue_percep_zero(target, &ak, &bw1, &bw2, real);
                    let (levels, bounds) = gain.table();
                    let q = scalar_quant(compute_rms(real) / ol_gain, bounds);
                    bits.pack(q as u32, gain.bits())?;
                    levels[q] * ol_gain
                }
            };

            target.iter_mut().for_each(|v| *v /= ener);
            let innov = local.alloc(SUBFRAME_SIZE)?;
            innovation_quant(mode.innovation, target, &filters, innov, bits, &mut local)?;
            for (e, i) in current.iter_mut().zip(innov.iter()) {
                *e += ener * i;
            }

            let out = &mut synth[range];
            out.copy_from_slice(current);
            iir_mem_in_place(out, &ak, &mut mem_sp);
            let weighted = local.alloc_copy(out)?;
            filter_mem_in_place(weighted, &bw1, &bw2, &mut mem_sw);
        }

        check_frame_bits(mode, bits, start_bits)?;
        self.speech_history.append(original);
        self.sw_history.append(&sw[PITCH_END..]);
        self.exc_history.append(&exc[EXC_HISTORY..]);
        self.old_lsp = lsp;
        self.old_qlsp = qlsp;
        self.last_qlpc = ak;
        self.mem_sp = mem_sp;
        self.mem_sw = mem_sw;
        self.mem_sw_whole = mem_sw_whole;
        self.mem_exc = mem_exc;
        self.first = false;
        pcm.copy_from_slice(synth);
        Ok(())
    }
}

/// Every submode writes exactly its declared number of bits
fn check_frame_bits(mode: &SubmodeDescriptor, bits: &Bits, start_bits: usize) -> Result<()> {
    let written = bits.bits_written() - start_bits;
    if written != mode.bits_per_frame {
        return Err(CodecError::internal_error(format!(
            "submode {} wrote {} bits, expected {}",
            mode.id, written, mode.bits_per_frame
        )));
    }
    Ok(())
}
