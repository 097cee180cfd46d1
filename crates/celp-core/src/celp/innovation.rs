//! Fixed-codebook (innovation) quantizers
//!
//! Every search works on a target already normalized by the subframe's
//! excitation gain and produces a unit-scale innovation vector. Split
//! codebooks tile the subframe with short shape vectors chosen one after
//! the other, each against the target left by its predecessors.

use tracing::trace;

use crate::error::Result;

use super::arena::Scratch;
use super::bits::Bits;
use super::filters::{convolve_response, inner_prod, residue_percep_zero, SubframeFilters};
use super::modes::{GainVqParams, InnovationStrategy, SplitCodebookParams};
use super::multipulse;
use super::tables::Codebook;

/// Largest shape dimension in the registry
const MAX_SUBVECT: usize = 10;

/// Deterministic uniform noise with unit variance
///
/// A 32-bit linear congruential generator; each decoder owns one so a
/// given bitstream always decodes to the same samples.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    seed: u32,
}

impl NoiseSource {
    /// Start from `seed`
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Next sample, uniform in `[-√3, √3)`
    pub fn next_sample(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let unit = (self.seed >> 8) as f32 / (1u32 << 24) as f32;
        (2.0 * unit - 1.0) * 3f32.sqrt()
    }

    /// Fill `out` with noise
    pub fn fill(&mut self, out: &mut [f32]) {
        for v in out.iter_mut() {
            *v = self.next_sample();
        }
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Search the submode's fixed codebook for `target` and write `innov`
pub fn innovation_quant(
    strategy: InnovationStrategy,
    target: &mut [f32],
    filters: &SubframeFilters<'_>,
    innov: &mut [f32],
    bits: &mut Bits,
    scratch: &mut Scratch<'_>,
) -> Result<()> {
    match strategy {
        InnovationStrategy::None => {
            innov.fill(0.0);
            Ok(())
        }
        InnovationStrategy::Noise => {
            residue_percep_zero(target, filters.ak, filters.awk1, filters.awk2, innov);
            Ok(())
        }
        InnovationStrategy::Split(params) => match params.gains {
            None => split_cb_search_shape_sign(target, filters, params, innov, bits, scratch),
            Some(gains) => {
                split_cb_search_gain_shape(target, filters, params, gains, innov, bits, scratch)
            }
        },
        InnovationStrategy::MultiPulse(params) => {
            multipulse::multipulse_search(target, filters, params, innov, bits, scratch)
        }
    }
}

/// Rebuild the innovation of one subframe
pub fn innovation_unquant(
    strategy: InnovationStrategy,
    innov: &mut [f32],
    bits: &mut Bits,
    noise: &mut NoiseSource,
) -> Result<()> {
    match strategy {
        InnovationStrategy::None => {
            innov.fill(0.0);
            Ok(())
        }
        InnovationStrategy::Noise => {
            noise.fill(innov);
            Ok(())
        }
        InnovationStrategy::Split(params) => match params.gains {
            None => split_cb_unquant_shape_sign(params, innov, bits),
            Some(gains) => split_cb_unquant_gain_shape(params, gains, innov, bits),
        },
        InnovationStrategy::MultiPulse(params) => multipulse::multipulse_unquant(params, innov, bits),
    }
}

fn shape_into(cb: &Codebook, index: usize, out: &mut [f32]) {
    for (d, v) in out.iter_mut().enumerate() {
        *v = cb.value(index, d);
    }
}

/// Weighted responses (first `sub` samples) and energies of every entry
fn entry_responses<'a>(
    cb: &Codebook,
    impulse: &[f32],
    scratch: &mut Scratch<'a>,
) -> Result<(&'a mut [f32], &'a mut [f32])> {
    let sub = cb.dim();
    let resp = scratch.alloc(cb.len() * sub)?;
    let energies = scratch.alloc(cb.len())?;
    let mut shape = [0.0f32; MAX_SUBVECT];
    for (k, (r, e)) in resp.chunks_exact_mut(sub).zip(energies.iter_mut()).enumerate() {
        shape_into(cb, k, &mut shape[..sub]);
        convolve_response(&shape[..sub], impulse, r);
        *e = inner_prod(r, r);
    }
    Ok((resp, energies))
}

/// Remove `gain · shape` placed at `offset` from the rest of the target
fn subtract_response(
    target: &mut [f32],
    offset: usize,
    shape: &[f32],
    gain: f32,
    impulse: &[f32],
    scratch: &mut Scratch<'_>,
) -> Result<()> {
    let tail = &mut target[offset..];
    let mut scope = scratch.scope();
    let response = scope.alloc(tail.len())?;
    convolve_response(shape, impulse, response);
    for (t, r) in tail.iter_mut().zip(response.iter()) {
        *t -= gain * r;
    }
    Ok(())
}

/// Entry and sign chosen for one subvector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ShapeChoice {
    index: usize,
    negative: bool,
}

impl ShapeChoice {
    fn sign(self) -> f32 {
        if self.negative {
            -1.0
        } else {
            1.0
        }
    }
}

fn pack_shape(params: &SplitCodebookParams, choice: ShapeChoice, bits: &mut Bits) -> Result<()> {
    if params.have_sign {
        let code = (u32::from(choice.negative) << params.shape_bits) | choice.index as u32;
        bits.pack(code, params.shape_bits + 1)
    } else {
        bits.pack(choice.index as u32, params.shape_bits)
    }
}

fn unpack_shape(params: &SplitCodebookParams, bits: &mut Bits) -> Result<ShapeChoice> {
    if params.have_sign {
        let code = bits.unpack_unsigned(params.shape_bits + 1)?;
        Ok(ShapeChoice {
            index: (code & ((1u32 << params.shape_bits) - 1)) as usize,
            negative: code >> params.shape_bits != 0,
        })
    } else {
        Ok(ShapeChoice {
            index: bits.unpack_unsigned(params.shape_bits)? as usize,
            negative: false,
        })
    }
}

/// Entry (and sign) removing the most weighted error at a known gain:
/// maximizes `2·g·|c| - g²·E`
fn best_at_gain(t: &[f32], resp: &[f32], energies: &[f32], gain: f32, signed: bool) -> ShapeChoice {
    let mut best = (ShapeChoice::default(), f32::NEG_INFINITY);
    for (k, r) in resp.chunks_exact(t.len()).enumerate() {
        let corr = inner_prod(t, r);
        let negative = signed && corr < 0.0;
        let magnitude = if negative { -corr } else { corr };
        let score = 2.0 * gain * magnitude - gain * gain * energies[k];
        if score > best.1 {
            best = (ShapeChoice { index: k, negative }, score);
        }
    }
    best.0
}

/// Entry (and sign) maximizing `c²/E`, with its optimal gain
fn best_free_gain(t: &[f32], resp: &[f32], energies: &[f32], signed: bool) -> (ShapeChoice, f32) {
    let mut best = (ShapeChoice::default(), 0.0f32, 0.0f32);
    for (k, r) in resp.chunks_exact(t.len()).enumerate() {
        if energies[k] <= 0.0 {
            continue;
        }
        let corr = inner_prod(t, r);
        let negative = signed && corr < 0.0;
        let magnitude = if negative { -corr } else { corr };
        if magnitude <= 0.0 {
            continue;
        }
        let score = magnitude * magnitude / energies[k];
        if score > best.2 {
            best = (ShapeChoice { index: k, negative }, magnitude / energies[k], score);
        }
    }
    (best.0, best.1)
}

/// Split codebook with implied unit gains and optional sign bits
///
/// Each subvector takes the entry (and sign) minimizing the remaining
/// weighted error `E - 2·|c|`.
pub fn split_cb_search_shape_sign(
    target: &mut [f32],
    filters: &SubframeFilters<'_>,
    params: &SplitCodebookParams,
    innov: &mut [f32],
    bits: &mut Bits,
    scratch: &mut Scratch<'_>,
) -> Result<()> {
    let cb = params.shape;
    let sub = params.subvect_size;
    let mut scope = scratch.scope();
    let (resp, energies) = entry_responses(cb, filters.impulse, &mut scope)?;

    innov.fill(0.0);
    let mut shape = [0.0f32; MAX_SUBVECT];
    for i in 0..params.nb_subvect {
        let offset = i * sub;
        let choice = best_at_gain(&target[offset..offset + sub], resp, energies, 1.0, params.have_sign);
        pack_shape(params, choice, bits)?;

        let sign = choice.sign();
        shape_into(cb, choice.index, &mut shape[..sub]);
        for (e, s) in innov[offset..offset + sub].iter_mut().zip(&shape[..sub]) {
            *e = sign * s;
        }
        subtract_response(target, offset, &shape[..sub], sign, filters.impulse, &mut scope)?;
    }
    Ok(())
}

/// Decoder side of [`split_cb_search_shape_sign`]
pub fn split_cb_unquant_shape_sign(
    params: &SplitCodebookParams,
    innov: &mut [f32],
    bits: &mut Bits,
) -> Result<()> {
    let sub = params.subvect_size;
    let mut shape = [0.0f32; MAX_SUBVECT];
    for i in 0..params.nb_subvect {
        let choice = unpack_shape(params, bits)?;
        let sign = choice.sign();
        shape_into(params.shape, choice.index, &mut shape[..sub]);
        for (e, s) in innov[i * sub..(i + 1) * sub].iter_mut().zip(&shape[..sub]) {
            *e = sign * s;
        }
    }
    Ok(())
}

/// Split codebook with a per-subvector gain
///
/// A first greedy pass picks shapes by `c²/E` with free gains, which
/// are then vector quantized in the log2 domain in two stages: a coarse
/// contour shared by neighbouring subvectors and a full-length residual.
/// The shapes are searched again with the quantized gains so every target
/// update uses the gain the decoder will apply. Unit gains are tried as a
/// second gain set and the set leaving the smaller weighted error wins.
pub fn split_cb_search_gain_shape(
    target: &mut [f32],
    filters: &SubframeFilters<'_>,
    params: &SplitCodebookParams,
    gain_params: &GainVqParams,
    innov: &mut [f32],
    bits: &mut Bits,
    scratch: &mut Scratch<'_>,
) -> Result<()> {
    let cb = params.shape;
    let sub = params.subvect_size;
    let nb = params.nb_subvect;
    let mut scope = scratch.scope();
    let (resp, energies) = entry_responses(cb, filters.impulse, &mut scope)?;
    let original = scope.alloc_copy(target)?;
    let work = scope.alloc(target.len())?;
    let mut shape = [0.0f32; MAX_SUBVECT];

    // Step 1: free gains
    let log_gains = scope.alloc(nb)?;
    for i in 0..nb {
        let offset = i * sub;
        let (choice, gain) =
            best_free_gain(&target[offset..offset + sub], resp, energies, params.have_sign);
        log_gains[i] = gain.max(1e-3).log2();
        shape_into(cb, choice.index, &mut shape[..sub]);
        let signed_gain = choice.sign() * gain;
        subtract_response(target, offset, &shape[..sub], signed_gain, filters.impulse, &mut scope)?;
    }

    // Step 2: shapes again under each quantized gain set
    let unit = [0.0f32; 8];
    let gain_sets = [
        quantize_log_gains(log_gains, gain_params),
        quantize_log_gains(&unit[..nb], gain_params),
    ];
    let mut best_err = f32::INFINITY;
    let mut best_set = gain_sets[0];
    let mut best_choices = [ShapeChoice::default(); 8];
    for &(contour, residual) in &gain_sets {
        work.copy_from_slice(original);
        let mut choices = [ShapeChoice::default(); 8];
        for (i, choice) in choices.iter_mut().take(nb).enumerate() {
            let offset = i * sub;
            let gain = dequantize_gain(gain_params, contour, residual, i, nb);
            *choice = best_at_gain(&work[offset..offset + sub], resp, energies, gain, params.have_sign);
            shape_into(cb, choice.index, &mut shape[..sub]);
            let signed_gain = choice.sign() * gain;
            subtract_response(work, offset, &shape[..sub], signed_gain, filters.impulse, &mut scope)?;
        }
        let err = inner_prod(work, work);
        if err < best_err {
            best_err = err;
            best_set = (contour, residual);
            best_choices = choices;
            target.copy_from_slice(work);
        }
    }

    let (contour, residual) = best_set;
    for &choice in best_choices.iter().take(nb) {
        pack_shape(params, choice, bits)?;
    }
    bits.pack(contour as u32, gain_params.contour_bits)?;
    bits.pack(residual as u32, gain_params.residual_bits)?;
    trace!(contour, residual, best_err, "split gain-shape");

    for (i, &choice) in best_choices.iter().take(nb).enumerate() {
        let gain = choice.sign() * dequantize_gain(gain_params, contour, residual, i, nb);
        shape_into(cb, choice.index, &mut shape[..sub]);
        for (e, s) in innov[i * sub..(i + 1) * sub].iter_mut().zip(&shape[..sub]) {
            *e = gain * s;
        }
    }
    Ok(())
}

/// Decoder side of [`split_cb_search_gain_shape`]
pub fn split_cb_unquant_gain_shape(
    params: &SplitCodebookParams,
    gain_params: &GainVqParams,
    innov: &mut [f32],
    bits: &mut Bits,
) -> Result<()> {
    let sub = params.subvect_size;
    let nb = params.nb_subvect;
    let mut choices = [ShapeChoice::default(); 8];
    for choice in choices.iter_mut().take(nb) {
        *choice = unpack_shape(params, bits)?;
    }
    let contour = bits.unpack_unsigned(gain_params.contour_bits)? as usize;
    let residual = bits.unpack_unsigned(gain_params.residual_bits)? as usize;

    let mut shape = [0.0f32; MAX_SUBVECT];
    for (i, &choice) in choices.iter().take(nb).enumerate() {
        let gain = choice.sign() * dequantize_gain(gain_params, contour, residual, i, nb);
        shape_into(params.shape, choice.index, &mut shape[..sub]);
        for (e, s) in innov[i * sub..(i + 1) * sub].iter_mut().zip(&shape[..sub]) {
            *e = gain * s;
        }
    }
    Ok(())
}

/// Contour point covering subvector `i` of `nb`
fn contour_point(gain_params: &GainVqParams, i: usize, nb: usize) -> usize {
    i * gain_params.contour.dim() / nb
}

/// Two-stage search over log2 gains; returns (contour, residual) indices
fn quantize_log_gains(log_gains: &[f32], gain_params: &GainVqParams) -> (usize, usize) {
    let nb = log_gains.len();
    let contour_cb = gain_params.contour;
    let residual_cb = gain_params.residual;

    let mut coarse = [0.0f32; 8];
    let mut counts = [0usize; 8];
    for (i, &g) in log_gains.iter().enumerate() {
        let c = contour_point(gain_params, i, nb);
        coarse[c] += g;
        counts[c] += 1;
    }
    for (c, n) in coarse.iter_mut().zip(counts) {
        if n > 0 {
            *c /= n as f32;
        }
    }

    let nearest = |cb: &Codebook, goal: &dyn Fn(usize) -> f32| {
        let mut best = (0usize, f32::INFINITY);
        for index in 0..cb.len() {
            let dist: f32 = (0..cb.dim())
                .map(|d| (cb.value(index, d) - goal(d)).powi(2))
                .sum();
            if dist < best.1 {
                best = (index, dist);
            }
        }
        best.0
    };

    let contour = nearest(contour_cb, &|d| coarse[d]);
    if residual_cb.dim() <= contour_cb.dim() {
        return (contour, 0);
    }
    let residual = nearest(residual_cb, &|i| {
        log_gains[i] - contour_cb.value(contour, contour_point(gain_params, i, nb))
    });
    (contour, residual)
}

fn dequantize_gain(gain_params: &GainVqParams, contour: usize, residual: usize, i: usize, nb: usize) -> f32 {
    let mut log_gain = gain_params
        .contour
        .value(contour, contour_point(gain_params, i, nb));
    if gain_params.residual.dim() > gain_params.contour.dim() {
        log_gain += gain_params.residual.value(residual, i);
    }
    log_gain.exp2()
}
