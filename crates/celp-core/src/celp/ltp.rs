//! Long-term (pitch) predictor
//!
//! The open-loop search ranks lags by normalized correlation of the
//! weighted speech with its own past. The closed-loop search then scores
//! a 3-tap adaptive codebook (lags `T-1`, `T`, `T+1`) against the
//! subframe target for the best few open-loop candidates and vector
//! quantizes the three gains jointly.
//!
//! Excitation contributions are always built by [`adaptive_contribution`]
//! and [`forced_contribution`], on both sides of the channel, so the
//! encoder's reconstruction and the decoder's output agree exactly.

use tracing::trace;

use crate::error::Result;

use super::arena::Scratch;
use super::bits::Bits;
use super::filters::{inner_prod, SubframeFilters};
use super::modes::LtpParams;

/// Most candidates any complexity setting examines
pub const MAX_PITCH_CANDIDATES: usize = 10;

/// Upper bound on the single-tap forced pitch coefficient
pub const FORCED_GAIN_LIMIT: f32 = 0.99;

/// One open-loop pitch candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchCandidate {
    /// Lag in samples
    pub lag: usize,
    /// Signed `corr·|corr| / energy` score
    pub score: f32,
    /// Normalized correlation clamped to `[0, 1]`
    pub gain: f32,
}

/// Lag and gains chosen for one subframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchResult {
    /// Centre lag
    pub lag: usize,
    /// Gains of lags `lag - 1`, `lag` and `lag + 1`
    pub gains: [f32; 3],
}

impl PitchResult {
    /// Sum of the tap gains, the effective periodicity
    pub fn total_gain(&self) -> f32 {
        self.gains.iter().sum()
    }
}

/// Open-loop search for the `best.len()` lags in `[start, end]`
///
/// Correlates `sw[pos..pos + len]` with `sw[pos - lag..]`; `pos` must be
/// at least `end`. Candidates are returned best first.
pub fn open_loop_nbest_pitch(
    sw: &[f32],
    pos: usize,
    start: usize,
    end: usize,
    len: usize,
    best: &mut [PitchCandidate],
) {
    best.fill(PitchCandidate {
        lag: start,
        score: f32::NEG_INFINITY,
        gain: 0.0,
    });
    if best.is_empty() {
        return;
    }
    let x = &sw[pos..pos + len];
    let e0 = inner_prod(x, x);

    for lag in start..=end {
        let past = &sw[pos - lag..pos - lag + len];
        let corr = inner_prod(x, past);
        let energy = inner_prod(past, past);
        let score = corr * corr.abs() / (energy + 1.0);

        let last = best.len() - 1;
        if score <= best[last].score {
            continue;
        }
        let slot = best.iter().position(|c| score > c.score).unwrap_or(last);
        for i in (slot + 1..best.len()).rev() {
            best[i] = best[i - 1];
        }
        best[slot] = PitchCandidate {
            lag,
            score,
            gain: (corr / ((e0 * energy).sqrt() + 10.0)).clamp(0.0, 1.0),
        };
    }
}

/// Past excitation seen through a delay of `lag`, extended periodically
/// with period `pitch` where the delay reaches into the current subframe
fn delayed(history: &[f32], j: usize, lag: usize, pitch: usize) -> f32 {
    let n = history.len();
    if j < lag {
        history[n + j - lag]
    } else if j < lag + pitch {
        history[n + j - lag - pitch]
    } else {
        0.0
    }
}

/// Adaptive-codebook vector for a single tap
fn tap_vector(history: &[f32], lag: usize, pitch: usize, out: &mut [f32]) {
    for (j, v) in out.iter_mut().enumerate() {
        *v = delayed(history, j, lag, pitch);
    }
}

/// 3-tap adaptive-codebook contribution of `history` at `pitch`
pub fn adaptive_contribution(history: &[f32], pitch: usize, gains: [f32; 3], out: &mut [f32]) {
    for (j, v) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, g) in gains.iter().enumerate() {
            acc += g * delayed(history, j, pitch + k - 1, pitch);
        }
        *v = acc;
    }
}

/// Single-tap contribution `out[i] = coef · e[i - pitch]`, recursing into
/// `out` once the delay reaches the current subframe
pub fn forced_contribution(history: &[f32], pitch: usize, coef: f32, out: &mut [f32]) {
    let coef = coef.min(FORCED_GAIN_LIMIT);
    let n = history.len();
    for i in 0..out.len() {
        let past = if i < pitch {
            history[n + i - pitch]
        } else {
            out[i - pitch]
        };
        out[i] = coef * past;
    }
}

/// Closed-loop 3-tap search and quantization
///
/// `history` is the excitation before the subframe, `out` receives the
/// adaptive contribution and `target` has its weighted response removed.
/// Lag candidates come from an open-loop search of `sw` around `sw_pos`;
/// `complexity` bounds how many are scored.
#[allow(clippy::too_many_arguments)]
pub fn pitch_search_3tap(
    target: &mut [f32],
    sw: &[f32],
    sw_pos: usize,
    filters: &SubframeFilters<'_>,
    history: &[f32],
    out: &mut [f32],
    params: &LtpParams,
    range: (usize, usize),
    complexity: usize,
    bits: &mut Bits,
    scratch: &mut Scratch<'_>,
) -> Result<PitchResult> {
    let nsf = target.len();
    let (start, end) = range;

    let mut candidates = [PitchCandidate {
        lag: start,
        score: 0.0,
        gain: 0.0,
    }; MAX_PITCH_CANDIDATES];
    let n = complexity.clamp(1, MAX_PITCH_CANDIDATES).min(end - start + 1);
    if start < end {
        open_loop_nbest_pitch(sw, sw_pos, start, end, nsf, &mut candidates[..n]);
    }

    let mut taps = [
        scratch.alloc(nsf)?,
        scratch.alloc(nsf)?,
        scratch.alloc(nsf)?,
    ];
    let mut filtered = [
        scratch.alloc(nsf)?,
        scratch.alloc(nsf)?,
        scratch.alloc(nsf)?,
    ];

    let mut best = (start, 0usize, f32::NEG_INFINITY);
    for candidate in &candidates[..n] {
        let pitch = candidate.lag;
        for k in 0..3 {
            tap_vector(history, pitch + k - 1, pitch, &mut *taps[k]);
            filters.zero_state(&*taps[k], &mut *filtered[k]);
        }
        let (index, gain) = search_gain_vector(target, &filtered, params);
        if gain > best.2 {
            best = (pitch, index, gain);
        }
    }
    let (pitch, index, _) = best;

    let cb = params.gain_codebook;
    let gains = [cb.value(index, 0), cb.value(index, 1), cb.value(index, 2)];
    adaptive_contribution(history, pitch, gains, out);

    let [response, _, _] = taps;
    filters.zero_state(out, response);
    for (t, r) in target.iter_mut().zip(response.iter()) {
        *t -= r;
    }

    if params.pitch_bits > 0 {
        bits.pack((pitch - start) as u32, params.pitch_bits)?;
    }
    bits.pack(index as u32, params.gain_bits)?;
    trace!(pitch, index, ?gains, "3-tap pitch");
    Ok(PitchResult { lag: pitch, gains })
}

/// Best gain vector for the filtered taps: maximizes
/// `2·gᵀc - gᵀAg`, the error energy removed from the target
fn search_gain_vector(
    target: &[f32],
    filtered: &[&mut [f32]; 3],
    params: &LtpParams,
) -> (usize, f32) {
    let mut corr = [0.0f32; 3];
    let mut a = [[0.0f32; 3]; 3];
    for k in 0..3 {
        corr[k] = inner_prod(&filtered[k][..], target);
        for l in 0..=k {
            let v = inner_prod(&filtered[k][..], &filtered[l][..]);
            a[k][l] = v;
            a[l][k] = v;
        }
    }

    let cb = params.gain_codebook;
    let mut best = (0, f32::NEG_INFINITY);
    for index in 0..cb.len() {
        let g = [cb.value(index, 0), cb.value(index, 1), cb.value(index, 2)];
        let mut score = 0.0;
        for k in 0..3 {
            score += 2.0 * g[k] * corr[k];
            for l in 0..3 {
                score -= g[k] * g[l] * a[k][l];
            }
        }
        if score > best.1 {
            best = (index, score);
        }
    }
    best
}

/// Decode a 3-tap lag and gain index and build the contribution
pub fn pitch_unquant_3tap(
    history: &[f32],
    out: &mut [f32],
    params: &LtpParams,
    range: (usize, usize),
    bits: &mut Bits,
) -> Result<PitchResult> {
    let (start, end) = range;
    let pitch = if params.pitch_bits > 0 {
        (start + bits.unpack_unsigned(params.pitch_bits)? as usize).min(end)
    } else {
        start
    };
    let index = bits.unpack_unsigned(params.gain_bits)? as usize;
    let cb = params.gain_codebook;
    let gains = [cb.value(index, 0), cb.value(index, 1), cb.value(index, 2)];
    adaptive_contribution(history, pitch, gains, out);
    Ok(PitchResult { lag: pitch, gains })
}

/// Forced single-tap prediction at the open-loop lag
///
/// Writes the contribution to `out` and removes its weighted response from
/// `target`. Nothing is packed: lag and coefficient travel once per frame.
pub fn forced_pitch_quant(
    target: &mut [f32],
    filters: &SubframeFilters<'_>,
    history: &[f32],
    out: &mut [f32],
    pitch: usize,
    coef: f32,
    scratch: &mut Scratch<'_>,
) -> Result<PitchResult> {
    forced_contribution(history, pitch, coef, out);
    let response = scratch.alloc(target.len())?;
    filters.zero_state(out, response);
    for (t, r) in target.iter_mut().zip(response.iter()) {
        *t -= r;
    }
    Ok(PitchResult {
        lag: pitch,
        gains: [0.0, coef.min(FORCED_GAIN_LIMIT), 0.0],
    })
}

/// Decoder side of [`forced_pitch_quant`]
pub fn forced_pitch_unquant(history: &[f32], out: &mut [f32], pitch: usize, coef: f32) -> PitchResult {
    forced_contribution(history, pitch, coef, out);
    PitchResult {
        lag: pitch,
        gains: [0.0, coef.min(FORCED_GAIN_LIMIT), 0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celp::arena::ScratchArena;
    use crate::celp::filters::compute_impulse_response;
    use crate::celp::modes::{PITCH_END, PITCH_START};
    use crate::celp::tables::PITCH_GAIN_NB;

    static PARAMS: LtpParams = LtpParams {
        gain_codebook: &PITCH_GAIN_NB,
        gain_bits: 7,
        pitch_bits: 7,
    };

    fn pulse_train(period: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % period == 0 { 1000.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_open_loop_finds_period() {
        let sw: Vec<f32> = (0..400)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 50.0).sin() * 1000.0)
            .collect();
        let mut best = [PitchCandidate {
            lag: 0,
            score: 0.0,
            gain: 0.0,
        }; 3];
        open_loop_nbest_pitch(&sw, 200, PITCH_START, PITCH_END, 160, &mut best);
        assert!(best.iter().any(|c| c.lag == 50 || c.lag == 100), "{:?}", best);
        assert!(best[0].score >= best[1].score && best[1].score >= best[2].score);
        assert!(best[0].gain > 0.9);
    }

    #[test]
    fn test_delayed_repeats_last_period() {
        let history = [1.0, 2.0, 3.0, 4.0];
        // lag 2, pitch 2: first two from history, then repeat
        let values: Vec<f32> = (0..5).map(|j| delayed(&history, j, 2, 2)).collect();
        assert_eq!(values, vec![3.0, 4.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_forced_contribution_recurses() {
        let history = [0.0, 0.0, 1.0, 0.0];
        let mut out = [0.0; 6];
        forced_contribution(&history, 2, 0.5, &mut out);
        assert_eq!(out, [0.5, 0.0, 0.25, 0.0, 0.125, 0.0]);
        let limited = forced_pitch_unquant(&history, &mut out, 2, 3.0);
        assert_eq!(limited.gains[1], FORCED_GAIN_LIMIT);
    }

    #[test]
    fn test_search_and_unquant_agree() {
        let lpc = [1.0, -0.9, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut impulse = [0.0; 40];
        compute_impulse_response(&lpc, &lpc, &lpc, &mut impulse);
        let filters = SubframeFilters {
            ak: &lpc,
            awk1: &lpc,
            awk2: &lpc,
            impulse: &impulse,
        };

        let history = pulse_train(60, 300);
        let mut ideal = [0.0; 40];
        adaptive_contribution(&history, 60, [0.0, 0.8, 0.0], &mut ideal);
        let mut target = [0.0; 40];
        filters.zero_state(&ideal, &mut target);
        let target_energy = inner_prod(&target, &target);

        let sw = pulse_train(60, 340);
        let mut arena = ScratchArena::with_capacity(1024);
        let mut scratch = arena.scope();
        let mut bits = Bits::new(16);
        let mut out = [0.0; 40];
        let chosen = pitch_search_3tap(
            &mut target,
            &sw,
            300,
            &filters,
            &history,
            &mut out,
            &PARAMS,
            (PITCH_START, PITCH_END),
            4,
            &mut bits,
            &mut scratch,
        )
        .unwrap();
        assert_eq!(chosen.lag % 60, 0);
        assert!(inner_prod(&target, &target) < 0.5 * target_energy);
        assert_eq!(bits.bits_written(), 14);

        let mut decoded = [0.0; 40];
        let result =
            pitch_unquant_3tap(&history, &mut decoded, &PARAMS, (PITCH_START, PITCH_END), &mut bits)
                .unwrap();
        assert_eq!(result, chosen);
        assert_eq!(decoded, out);
    }

    #[test]
    fn test_unquant_reports_truncation() {
        let mut bits = Bits::from_bytes(&[0xff]);
        let mut out = [0.0; 40];
        let err = pitch_unquant_3tap(&[0.0; 160], &mut out, &PARAMS, (17, 144), &mut bits);
        assert!(err.is_err());
    }
}
