//! Multi-stage LSP vector quantizer
//!
//! The LSP vector minus the equally spaced (flat spectrum) LSPs is scaled
//! to the integer units of the first codebook and matched against the full
//! 10-dimensional stage.
//! The residual is doubled (halving the step) and its low and high halves
//! are refined independently with weighted 5-dimensional stages. Weights
//! favour lines that sit close to a neighbour, where formant errors are
//! most audible.

use crate::error::Result;

use super::bits::Bits;
use super::modes::LPC_ORDER;
use super::tables::{Codebook, LSP_HIGH1, LSP_HIGH2, LSP_LOW1, LSP_LOW2, LSP_STAGE1};

/// Index width of every LSP stage
const STAGE_BITS: u32 = 6;

/// LSP quantizer variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspQuantizer {
    /// Five stages, 30 bits
    Narrowband,
    /// Three stages, 18 bits
    LowBitrate,
}

/// Stage indices of one quantized LSP vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LspIndex {
    quantizer: LspQuantizer,
    stages: [u8; 5],
}

/// Which half of the vector a refinement stage covers
#[derive(Clone, Copy)]
enum Half {
    Low,
    High,
}

struct Stage {
    codebook: &'static Codebook,
    half: Option<Half>,
}

static NARROWBAND_STAGES: [Stage; 5] = [
    Stage { codebook: &LSP_STAGE1, half: None },
    Stage { codebook: &LSP_LOW1, half: Some(Half::Low) },
    Stage { codebook: &LSP_LOW2, half: Some(Half::Low) },
    Stage { codebook: &LSP_HIGH1, half: Some(Half::High) },
    Stage { codebook: &LSP_HIGH2, half: Some(Half::High) },
];

static LOW_BITRATE_STAGES: [Stage; 3] = [
    Stage { codebook: &LSP_STAGE1, half: None },
    Stage { codebook: &LSP_LOW1, half: Some(Half::Low) },
    Stage { codebook: &LSP_HIGH1, half: Some(Half::High) },
];

/// Flat-spectrum LSP the codebooks are centred on
pub fn lsp_mean(i: usize) -> f32 {
    std::f32::consts::PI * (i as f32 + 1.0) / (LPC_ORDER as f32 + 1.0)
}

impl LspQuantizer {
    /// Bits written per frame
    pub fn bits(self) -> usize {
        self.stages().len() * STAGE_BITS as usize
    }

    fn stages(self) -> &'static [Stage] {
        match self {
            Self::Narrowband => &NARROWBAND_STAGES,
            Self::LowBitrate => &LOW_BITRATE_STAGES,
        }
    }

    /// Quantize `lsp` (10 values) and return the stage indices
    pub fn quantize(self, lsp: &[f32]) -> LspIndex {
        let order = lsp.len();
        let mut weight = [0.0f32; 10];
        compute_quant_weights(lsp, &mut weight[..order]);

        // Residual in units of the current stage's step
        let mut residual = [0.0f32; 10];
        for (i, (r, &w)) in residual.iter_mut().zip(lsp).enumerate() {
            *r = (w - lsp_mean(i)) * 256.0;
        }

        let mut index = LspIndex {
            quantizer: self,
            stages: [0; 5],
        };
        for (slot, stage) in self.stages().iter().enumerate() {
            let id = match stage.half {
                None => quantize_plain(&mut residual[..order], stage.codebook),
                Some(half) => {
                    // Each refinement halves the step of the half it covers
                    let range = match half {
                        Half::Low => 0..order / 2,
                        Half::High => order / 2..order,
                    };
                    residual[range.clone()].iter_mut().for_each(|r| *r *= 2.0);
                    quantize_weighted(&mut residual[range.clone()], &weight[range], stage.codebook)
                }
            };
            index.stages[slot] = id as u8;
        }
        index
    }

    /// Rebuild the LSP vector from stage indices
    pub fn unquantize(self, index: &LspIndex, lsp: &mut [f32]) {
        let order = lsp.len();
        for (i, w) in lsp.iter_mut().enumerate() {
            *w = lsp_mean(i);
        }
        for (slot, stage) in self.stages().iter().enumerate() {
            let id = index.stages[slot] as usize;
            let offset = match stage.half {
                None | Some(Half::Low) => 0,
                Some(Half::High) => order / 2,
            };
            for d in 0..stage.codebook.dim() {
                lsp[offset + d] += stage.codebook.value(id, d);
            }
        }
    }
}

impl LspIndex {
    /// Quantizer that produced the indices
    pub fn quantizer(&self) -> LspQuantizer {
        self.quantizer
    }

    /// Stage indices in transmission order
    pub fn stages(&self) -> &[u8] {
        &self.stages[..self.quantizer.stages().len()]
    }

    /// Write the stage indices
    pub fn pack(&self, bits: &mut Bits) -> Result<()> {
        for &id in self.stages() {
            bits.pack(u32::from(id), STAGE_BITS)?;
        }
        Ok(())
    }

    /// Read the stage indices of `quantizer`
    pub fn unpack(quantizer: LspQuantizer, bits: &mut Bits) -> Result<Self> {
        let mut stages = [0u8; 5];
        for slot in stages.iter_mut().take(quantizer.stages().len()) {
            *slot = bits.unpack_unsigned(STAGE_BITS)? as u8;
        }
        Ok(Self { quantizer, stages })
    }
}

/// Weights inversely proportional to the distance to the nearest neighbour
/// (or band edge)
fn compute_quant_weights(lsp: &[f32], weight: &mut [f32]) {
    let n = lsp.len();
    for i in 0..n {
        let below = if i == 0 { lsp[0] } else { lsp[i] - lsp[i - 1] };
        let above = if i == n - 1 {
            std::f32::consts::PI - lsp[i]
        } else {
            lsp[i + 1] - lsp[i]
        };
        weight[i] = 10.0 / (0.04 + below.min(above).max(0.0));
    }
}

/// Nearest entry by squared error; the entry is subtracted from `x`
fn quantize_plain(x: &mut [f32], cb: &Codebook) -> usize {
    let best = nearest(cb, |entry| {
        x.iter()
            .zip(entry)
            .map(|(&v, &c)| {
                let d = v - f32::from(c);
                d * d
            })
            .sum()
    });
    subtract_entry(x, cb, best);
    best
}

/// Nearest entry by weighted squared error; the entry is subtracted from `x`
fn quantize_weighted(x: &mut [f32], weight: &[f32], cb: &Codebook) -> usize {
    let best = nearest(cb, |entry| {
        x.iter()
            .zip(entry)
            .zip(weight)
            .map(|((&v, &c), &w)| {
                let d = v - f32::from(c);
                w * d * d
            })
            .sum()
    });
    subtract_entry(x, cb, best);
    best
}

fn nearest(cb: &Codebook, mut distance: impl FnMut(&[i8]) -> f32) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, entry) in cb.entries().enumerate() {
        let dist = distance(entry);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

fn subtract_entry(x: &mut [f32], cb: &Codebook, index: usize) {
    for (v, &c) in x.iter_mut().zip(cb.entry(index)) {
        *v -= f32::from(c);
    }
}
