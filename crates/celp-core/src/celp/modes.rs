//! Narrowband mode constants and submode registry
//!
//! Each submode is an immutable [`SubmodeDescriptor`] that names its
//! quantizer strategies and the tables they use. Encoder and decoder
//! resolve the same 4-bit index to the same descriptor; the bit budget
//! derived from the strategy parameters must equal `bits_per_frame`
//! exactly, which [`validate_registry`] checks when a session is created.

use crate::error::{CodecError, Result};

use super::lsp_quant::LspQuantizer;
use super::tables::{
    Codebook, EXC_10_16, EXC_10_32, EXC_5_128, EXC_5_256, EXC_5_32, GAIN_CONTOUR, GAIN_RESIDUAL,
    PITCH_GAIN_LBR, PITCH_GAIN_NB, SCAL_GAIN_1, SCAL_GAIN_1_BOUND, SCAL_GAIN_3, SCAL_GAIN_3_BOUND,
};

/// Sample rate in Hz
pub const SAMPLE_RATE: u32 = 8000;
/// Samples per frame (20 ms)
pub const FRAME_SIZE: usize = 160;
/// Samples per subframe
pub const SUBFRAME_SIZE: usize = 40;
/// Subframes per frame
pub const NB_SUBFRAMES: usize = FRAME_SIZE / SUBFRAME_SIZE;
/// LPC order
pub const LPC_ORDER: usize = 10;
/// LPC analysis window: 40 samples of history plus the frame
pub const WINDOW_SIZE: usize = 200;
/// Past samples that precede the frame in the analysis window
pub const ANALYSIS_HISTORY: usize = WINDOW_SIZE - FRAME_SIZE;
/// Frames per second
pub const FRAMES_PER_SECOND: u32 = SAMPLE_RATE / FRAME_SIZE as u32;

/// Shortest pitch lag
pub const PITCH_START: usize = 17;
/// Longest pitch lag
pub const PITCH_END: usize = 144;

/// Numerator bandwidth expansion of the weighting filter
pub const GAMMA1: f32 = 0.9;
/// Denominator bandwidth expansion of the weighting filter
pub const GAMMA2: f32 = 0.6;
/// White-noise correction applied to the zero-lag autocorrelation
pub const LPC_FLOOR: f32 = 1.0001;
/// Lag-window bandwidth as a fraction of the sample rate
pub const LAG_FACTOR: f32 = 0.01;
/// Minimum LSP spacing in radians
pub const LSP_MARGIN: f32 = 0.002;
/// Root-search grid step in the cosine domain
pub const LSP_GRID_DELTA: f32 = 0.02;
/// Bisection steps per LSP root
pub const LSP_BISECTIONS: usize = 10;

/// Width of the wideband-layer flag
pub const WIDEBAND_FLAG_BITS: u32 = 1;
/// Width of the submode field
pub const SUBMODE_BITS: u32 = 4;
/// Frame header: wideband flag plus submode
pub const HEADER_BITS: usize = (WIDEBAND_FLAG_BITS + SUBMODE_BITS) as usize;
/// Open-loop pitch field width
pub const OL_PITCH_BITS: u32 = 7;
/// Forced pitch gain field width
pub const FORCED_GAIN_BITS: u32 = 4;
/// Open-loop excitation gain field width
pub const OL_GAIN_BITS: u32 = 5;

/// Submode code announcing an in-band request
pub const SUBMODE_INBAND: u32 = 14;
/// Submode code terminating the stream
pub const SUBMODE_TERMINATOR: u32 = 15;

/// Bandwidth expansion of the held filter in header-only frames
pub const NULL_BANDWIDTH: f32 = 0.93;

/// Submode selected by each quality level 0..=10
pub const QUALITY_MAP: [u8; 11] = [1, 1, 2, 3, 3, 4, 4, 5, 5, 6, 7];

/// Adaptive-codebook parameters
#[derive(Debug, Clone, Copy)]
pub struct LtpParams {
    /// 3-tap gain vectors
    pub gain_codebook: &'static Codebook,
    /// Gain index width
    pub gain_bits: u32,
    /// Lag field width; 0 reuses the open-loop lag
    pub pitch_bits: u32,
}

/// Long-term predictor strategy
#[derive(Debug, Clone, Copy)]
pub enum LtpStrategy {
    /// No adaptive codebook
    None,
    /// Single tap at the open-loop lag with the frame's forced gain
    Forced,
    /// Closed-loop 3-tap search
    ThreeTap(&'static LtpParams),
}

/// Two-stage log-gain quantizer for split gain-shape codebooks
#[derive(Debug, Clone, Copy)]
pub struct GainVqParams {
    /// Coarse contour, fewer points than subvectors
    pub contour: &'static Codebook,
    /// Contour index width
    pub contour_bits: u32,
    /// Residual, one point per subvector
    pub residual: &'static Codebook,
    /// Residual index width
    pub residual_bits: u32,
}

/// Split shape codebook parameters
#[derive(Debug, Clone, Copy)]
pub struct SplitCodebookParams {
    /// Samples per subvector
    pub subvect_size: usize,
    /// Subvectors per subframe
    pub nb_subvect: usize,
    /// Shape entries
    pub shape: &'static Codebook,
    /// Shape index width
    pub shape_bits: u32,
    /// Extra sign bit per subvector
    pub have_sign: bool,
    /// Per-subvector gains; `None` means unit gains
    pub gains: Option<&'static GainVqParams>,
}

/// Multi-pulse codebook parameters
#[derive(Debug, Clone, Copy)]
pub struct MultiPulseParams {
    /// Interleaved tracks; track `t` holds positions `t, t + tracks, ...`
    pub tracks: usize,
    /// Pulses placed on each track
    pub pulses_per_track: usize,
    /// Bits per position index within a track
    pub position_bits: u32,
    /// Global gain index width
    pub gain_bits: u32,
}

/// Fixed-codebook strategy
#[derive(Debug, Clone, Copy)]
pub enum InnovationStrategy {
    /// No innovation
    None,
    /// Unquantized noise
    Noise,
    /// Split shape codebook
    Split(&'static SplitCodebookParams),
    /// Interleaved multi-pulse
    MultiPulse(&'static MultiPulseParams),
}

/// Per-subframe correction of the open-loop excitation gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeGain {
    /// Use the open-loop gain as is
    None,
    /// Two-level correction
    OneBit,
    /// Eight-level correction
    ThreeBit,
}

impl SubframeGain {
    /// Field width
    pub const fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::OneBit => 1,
            Self::ThreeBit => 3,
        }
    }

    /// Levels and decision boundaries
    pub fn table(self) -> (&'static [f32], &'static [f32]) {
        match self {
            Self::None => (&[], &[]),
            Self::OneBit => (&SCAL_GAIN_1, &SCAL_GAIN_1_BOUND),
            Self::ThreeBit => (&SCAL_GAIN_3, &SCAL_GAIN_3_BOUND),
        }
    }
}

/// Immutable description of one bit-rate point
#[derive(Debug, Clone, Copy)]
pub struct SubmodeDescriptor {
    /// Index carried in the frame header
    pub id: u8,
    /// Human-readable label
    pub name: &'static str,
    /// LSP quantizer; `None` marks the header-only null submode
    pub lsp: Option<LspQuantizer>,
    /// Transmit the open-loop lag; the value is the closed-loop search
    /// margin around it (0 pins the lag)
    pub ol_pitch: Option<usize>,
    /// Transmit a 4-bit forced pitch gain
    pub forced_pitch_gain: bool,
    /// Subframe gain correction
    pub subframe_gain: SubframeGain,
    /// Adaptive codebook
    pub ltp: LtpStrategy,
    /// Fixed codebook
    pub innovation: InnovationStrategy,
    /// Decoder comb-filter strength
    pub comb_gain: f32,
    /// Exact bits per frame, header included
    pub bits_per_frame: usize,
}

static LTP_LBR_OL: LtpParams = LtpParams {
    gain_codebook: &PITCH_GAIN_LBR,
    gain_bits: 5,
    pitch_bits: 0,
};

static LTP_LBR: LtpParams = LtpParams {
    gain_codebook: &PITCH_GAIN_LBR,
    gain_bits: 5,
    pitch_bits: 7,
};

static LTP_NB: LtpParams = LtpParams {
    gain_codebook: &PITCH_GAIN_NB,
    gain_bits: 7,
    pitch_bits: 7,
};

static SPLIT_10_16: SplitCodebookParams = SplitCodebookParams {
    subvect_size: 10,
    nb_subvect: 4,
    shape: &EXC_10_16,
    shape_bits: 4,
    have_sign: false,
    gains: None,
};

static SPLIT_10_32: SplitCodebookParams = SplitCodebookParams {
    subvect_size: 10,
    nb_subvect: 4,
    shape: &EXC_10_32,
    shape_bits: 5,
    have_sign: false,
    gains: None,
};

static SPLIT_5_32_SIGNED: SplitCodebookParams = SplitCodebookParams {
    subvect_size: 5,
    nb_subvect: 8,
    shape: &EXC_5_32,
    shape_bits: 5,
    have_sign: true,
    gains: None,
};

static SPLIT_5_256: SplitCodebookParams = SplitCodebookParams {
    subvect_size: 5,
    nb_subvect: 8,
    shape: &EXC_5_256,
    shape_bits: 8,
    have_sign: false,
    gains: None,
};

static SPLIT_GAIN_VQ: GainVqParams = GainVqParams {
    contour: &GAIN_CONTOUR,
    contour_bits: 6,
    residual: &GAIN_RESIDUAL,
    residual_bits: 6,
};

static SPLIT_5_128_GAIN: SplitCodebookParams = SplitCodebookParams {
    subvect_size: 5,
    nb_subvect: 8,
    shape: &EXC_5_128,
    shape_bits: 7,
    have_sign: true,
    gains: Some(&SPLIT_GAIN_VQ),
};

static MULTIPULSE_5X2: MultiPulseParams = MultiPulseParams {
    tracks: 5,
    pulses_per_track: 2,
    position_bits: 3,
    gain_bits: 3,
};

/// All narrowband submodes, indexed by their header value
pub static NARROWBAND_SUBMODES: [SubmodeDescriptor; 8] = [
    SubmodeDescriptor {
        id: 0,
        name: "null",
        lsp: None,
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::None,
        ltp: LtpStrategy::None,
        innovation: InnovationStrategy::None,
        comb_gain: 0.0,
        bits_per_frame: 5,
    },
    SubmodeDescriptor {
        id: 1,
        name: "vocoder 2.15 kbps",
        lsp: Some(LspQuantizer::LowBitrate),
        ol_pitch: Some(0),
        forced_pitch_gain: true,
        subframe_gain: SubframeGain::OneBit,
        ltp: LtpStrategy::Forced,
        innovation: InnovationStrategy::Noise,
        comb_gain: 0.0,
        bits_per_frame: 43,
    },
    SubmodeDescriptor {
        id: 2,
        name: "5.95 kbps",
        lsp: Some(LspQuantizer::LowBitrate),
        ol_pitch: Some(0),
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::None,
        ltp: LtpStrategy::ThreeTap(&LTP_LBR_OL),
        innovation: InnovationStrategy::Split(&SPLIT_10_16),
        comb_gain: 0.6,
        bits_per_frame: 119,
    },
    SubmodeDescriptor {
        id: 3,
        name: "8 kbps",
        lsp: Some(LspQuantizer::LowBitrate),
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::OneBit,
        ltp: LtpStrategy::ThreeTap(&LTP_LBR),
        innovation: InnovationStrategy::Split(&SPLIT_10_32),
        comb_gain: 0.5,
        bits_per_frame: 160,
    },
    SubmodeDescriptor {
        id: 4,
        name: "11.4 kbps",
        lsp: Some(LspQuantizer::LowBitrate),
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::None,
        ltp: LtpStrategy::ThreeTap(&LTP_LBR),
        innovation: InnovationStrategy::MultiPulse(&MULTIPULSE_5X2),
        comb_gain: 0.45,
        bits_per_frame: 228,
    },
    SubmodeDescriptor {
        id: 5,
        name: "15 kbps",
        lsp: Some(LspQuantizer::Narrowband),
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::ThreeBit,
        ltp: LtpStrategy::ThreeTap(&LTP_NB),
        innovation: InnovationStrategy::Split(&SPLIT_5_32_SIGNED),
        comb_gain: 0.3,
        bits_per_frame: 300,
    },
    SubmodeDescriptor {
        id: 6,
        name: "18.2 kbps",
        lsp: Some(LspQuantizer::Narrowband),
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::ThreeBit,
        ltp: LtpStrategy::ThreeTap(&LTP_NB),
        innovation: InnovationStrategy::Split(&SPLIT_5_256),
        comb_gain: 0.2,
        bits_per_frame: 364,
    },
    SubmodeDescriptor {
        id: 7,
        name: "20.6 kbps",
        lsp: Some(LspQuantizer::Narrowband),
        ol_pitch: None,
        forced_pitch_gain: false,
        subframe_gain: SubframeGain::ThreeBit,
        ltp: LtpStrategy::ThreeTap(&LTP_NB),
        innovation: InnovationStrategy::Split(&SPLIT_5_128_GAIN),
        comb_gain: 0.1,
        bits_per_frame: 412,
    },
];

impl SubmodeDescriptor {
    /// Header-only frame with no coded parameters
    pub fn is_null(&self) -> bool {
        self.lsp.is_none()
    }

    /// Bits per second at 50 frames per second
    pub fn bitrate(&self) -> u32 {
        self.bits_per_frame as u32 * FRAMES_PER_SECOND
    }

    /// Lag search range for a subframe given the open-loop lag
    pub fn pitch_range(&self, ol_pitch: usize) -> (usize, usize) {
        match self.ol_pitch {
            None => (PITCH_START, PITCH_END),
            Some(0) => (ol_pitch, ol_pitch),
            Some(margin) => (
                (ol_pitch + 1).saturating_sub(margin).max(PITCH_START),
                (ol_pitch + margin).min(PITCH_END),
            ),
        }
    }

    /// Bits per frame implied by the strategy parameters
    pub fn expected_bits(&self) -> usize {
        let Some(lsp) = self.lsp else {
            return HEADER_BITS;
        };

        let mut frame = HEADER_BITS + lsp.bits() + OL_GAIN_BITS as usize;
        if self.ol_pitch.is_some() {
            frame += OL_PITCH_BITS as usize;
        }
        if self.forced_pitch_gain {
            frame += FORCED_GAIN_BITS as usize;
        }

        let ltp = match self.ltp {
            LtpStrategy::None | LtpStrategy::Forced => 0,
            LtpStrategy::ThreeTap(p) => (p.pitch_bits + p.gain_bits) as usize,
        };
        let innovation = match self.innovation {
            InnovationStrategy::None | InnovationStrategy::Noise => 0,
            InnovationStrategy::Split(p) => {
                let per_subvect = p.shape_bits as usize + usize::from(p.have_sign);
                let gains = p
                    .gains
                    .map_or(0, |g| (g.contour_bits + g.residual_bits) as usize);
                p.nb_subvect * per_subvect + gains
            }
            InnovationStrategy::MultiPulse(p) => {
                let per_track = 1 + p.pulses_per_track * p.position_bits as usize;
                p.gain_bits as usize + p.tracks * per_track
            }
        };

        frame + NB_SUBFRAMES * (ltp + self.subframe_gain.bits() as usize + innovation)
    }

    /// Check the descriptor against its tables and bit budget
    pub fn validate(&self) -> Result<()> {
        let fail = |what: String| {
            Err(CodecError::invalid_config(format!(
                "submode {} ({}): {}",
                self.id, self.name, what
            )))
        };

        let expected = self.expected_bits();
        if expected != self.bits_per_frame {
            return fail(format!(
                "parameters use {} bits, descriptor declares {}",
                expected, self.bits_per_frame
            ));
        }
        if self.is_null() {
            return Ok(());
        }

        match self.ltp {
            LtpStrategy::Forced if !(self.forced_pitch_gain && self.ol_pitch.is_some()) => {
                return fail("forced pitch needs the open-loop lag and gain".into());
            }
            LtpStrategy::ThreeTap(p) => {
                if p.gain_codebook.dim() != 3 || p.gain_codebook.len() != 1 << p.gain_bits {
                    return fail("pitch gain codebook does not match its index width".into());
                }
                let lags = match self.ol_pitch {
                    None => PITCH_END - PITCH_START + 1,
                    Some(0) => 1,
                    Some(margin) => 2 * margin,
                };
                if (1usize << p.pitch_bits) < lags {
                    return fail(format!("{} lag bits cannot code {} lags", p.pitch_bits, lags));
                }
            }
            _ => {}
        }
        if self.forced_pitch_gain && !matches!(self.ltp, LtpStrategy::Forced) {
            return fail("forced pitch gain without forced pitch".into());
        }

        match self.innovation {
            InnovationStrategy::Split(p) => {
                if p.subvect_size * p.nb_subvect != SUBFRAME_SIZE
                    || p.shape.dim() != p.subvect_size
                    || p.shape.len() != 1 << p.shape_bits
                {
                    return fail("shape codebook does not tile the subframe".into());
                }
                if let Some(g) = p.gains {
                    if g.contour.len() != 1 << g.contour_bits
                        || g.residual.len() != 1 << g.residual_bits
                        || g.residual.dim() != p.nb_subvect
                        || p.nb_subvect % g.contour.dim() != 0
                    {
                        return fail("gain quantizer does not match the subvectors".into());
                    }
                }
            }
            InnovationStrategy::MultiPulse(p) => {
                if p.tracks << p.position_bits != SUBFRAME_SIZE
                    || p.pulses_per_track != 2
                    || 1usize << p.gain_bits != SCAL_GAIN_3.len()
                {
                    return fail("multi-pulse layout does not match the subframe".into());
                }
            }
            InnovationStrategy::None | InnovationStrategy::Noise => {}
        }
        Ok(())
    }
}

/// Weight of the current frame's LSPs in subframe `sub`
pub fn interpolation_weight(sub: usize) -> f32 {
    (1.0 + sub as f32) / NB_SUBFRAMES as f32
}

/// Open-loop excitation gain index, `round(3.5·ln rms)` in `0..=31`
pub fn quantize_ol_gain(rms: f32) -> u32 {
    (0.5 + 3.5 * rms.max(1e-10).ln()).floor().clamp(0.0, 31.0) as u32
}

/// Open-loop excitation gain of an index
pub fn dequantize_ol_gain(qe: u32) -> f32 {
    (qe as f32 / 3.5).exp()
}

/// Forced pitch coefficient index in `0..=15`
pub fn quantize_forced_gain(coef: f32) -> u32 {
    (0.5 + 15.0 * coef).floor().clamp(0.0, 15.0) as u32
}

/// Forced pitch coefficient of an index
pub fn dequantize_forced_gain(q: u32) -> f32 {
    q as f32 / 15.0
}

/// Look up a submode by header value
pub fn submode(id: u32) -> Result<&'static SubmodeDescriptor> {
    NARROWBAND_SUBMODES
        .get(id as usize)
        .ok_or(CodecError::InvalidSubmode { submode: id })
}

/// Submode selected by a quality level
pub fn submode_for_quality(quality: u8) -> Result<u8> {
    QUALITY_MAP
        .get(quality as usize)
        .copied()
        .ok_or_else(|| CodecError::invalid_config(format!("Quality {} out of range 0-10", quality)))
}

/// Validate every descriptor in the registry
pub fn validate_registry() -> Result<()> {
    for (index, mode) in NARROWBAND_SUBMODES.iter().enumerate() {
        if mode.id as usize != index {
            return Err(CodecError::invalid_config(format!(
                "submode at index {} declares id {}",
                index, mode.id
            )));
        }
        mode.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_consistent() {
        assert!(validate_registry().is_ok());
    }

    #[test]
    fn test_bit_budgets() {
        let bits: Vec<usize> = NARROWBAND_SUBMODES.iter().map(|m| m.expected_bits()).collect();
        assert_eq!(bits, vec![5, 43, 119, 160, 228, 300, 364, 412]);
        assert_eq!(NARROWBAND_SUBMODES[3].bitrate(), 8000);
        assert_eq!(NARROWBAND_SUBMODES[1].bitrate(), 2150);
    }

    #[test]
    fn test_quality_map() {
        assert_eq!(submode_for_quality(0).unwrap(), 1);
        assert_eq!(submode_for_quality(8).unwrap(), 5);
        assert_eq!(submode_for_quality(10).unwrap(), 7);
        assert!(submode_for_quality(11).is_err());
    }

    #[test]
    fn test_submode_lookup() {
        assert_eq!(submode(3).unwrap().bits_per_frame, 160);
        assert!(submode(0).unwrap().is_null());
        assert_eq!(
            submode(8).unwrap_err(),
            CodecError::InvalidSubmode { submode: 8 }
        );
    }

    #[test]
    fn test_pitch_range() {
        let pinned = &NARROWBAND_SUBMODES[2];
        assert_eq!(pinned.pitch_range(60), (60, 60));
        let free = &NARROWBAND_SUBMODES[5];
        assert_eq!(free.pitch_range(60), (PITCH_START, PITCH_END));
    }

    #[test]
    fn test_gain_quantizers() {
        assert_eq!(quantize_ol_gain(0.0), 0);
        assert_eq!(quantize_ol_gain(1e12), 31);
        let q = quantize_ol_gain(100.0);
        let g = dequantize_ol_gain(q);
        assert!((g / 100.0).ln().abs() <= 0.5 / 3.5 + 1e-4);
        assert_eq!(quantize_forced_gain(-1.0), 0);
        assert_eq!(quantize_forced_gain(2.0), 15);
        assert_eq!(dequantize_forced_gain(quantize_forced_gain(0.4)), 6.0 / 15.0);
        assert_eq!(interpolation_weight(3), 1.0);
    }

    #[test]
    fn test_mismatched_budget_is_rejected() {
        let mut broken = NARROWBAND_SUBMODES[3];
        broken.bits_per_frame = 161;
        let err = broken.validate().unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }
}
