//! Decoder perceptual enhancement
//!
//! The enhancement path runs beside the normal synthesis and never feeds
//! back into decoding state:
//!
//! - Pitch comb filter on the excitation: `e'[n] = e[n] + c·g·e[n - T]`,
//!   rescaled to the energy of `e`
//! - Synthesis of `e'` through `1/Â(z)` with its own memory
//! - Short-term postfilter `A(z/0.55) / A(z/0.7)`
//! - Tilt compensation `1 + μ z^-1` from the first correlation of the
//!   postfilter impulse response
//! - Automatic gain control towards the energy of the unfiltered synthesis

use super::filters::{bw_lpc, energy, filter_mem_in_place, iir_mem_in_place};
use super::modes::LPC_ORDER;

/// Numerator bandwidth expansion
const GAMMA_NUM: f32 = 0.55;
/// Denominator bandwidth expansion
const GAMMA_DEN: f32 = 0.7;
/// Tilt factor when the first reflection coefficient is positive
const GAMMA_TILT_PLUS: f32 = 0.2;
/// Tilt factor when the first reflection coefficient is negative
const GAMMA_TILT_MINUS: f32 = 0.9;
/// AGC smoothing per sample
const AGC_FAC: f32 = 0.9875;
/// Truncated impulse response length used for the tilt estimate
const LONG_H_ST: usize = 20;

/// Enhancement state of one decoder
#[derive(Debug, Clone)]
pub struct Enhancer {
    /// Synthesis memory of the comb-filtered excitation
    mem_syn: [f32; LPC_ORDER],
    /// Short-term postfilter memory
    mem_stp: [f32; LPC_ORDER],
    /// Last postfilter output before tilt compensation
    mem_tilt: f32,
    /// Smoothed AGC gain
    gain_prec: f32,
    /// Comb gain of the previous subframe
    last_comb: f32,
}

impl Default for Enhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Enhancer {
    /// Create an enhancer with cleared memories
    pub fn new() -> Self {
        Self {
            mem_syn: [0.0; LPC_ORDER],
            mem_stp: [0.0; LPC_ORDER],
            mem_tilt: 0.0,
            gain_prec: 1.0,
            last_comb: 0.0,
        }
    }

    /// Reset all memories
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Align the synthesis memory with the decoder's
    pub fn sync(&mut self, mem_sp: &[f32]) {
        self.mem_syn.copy_from_slice(&mem_sp[..LPC_ORDER]);
    }

    /// Enhance one subframe
    ///
    /// `history` is the excitation before the subframe and `exc` the
    /// subframe's excitation; `reference` is the plain synthesis, used as
    /// the AGC target. `pitch` is the lag and periodicity of the subframe,
    /// `comb_gain` the submode's comb strength.
    #[allow(clippy::too_many_arguments)]
    pub fn process_subframe(
        &mut self,
        history: &[f32],
        exc: &[f32],
        ak: &[f32],
        pitch: usize,
        pitch_gain: f32,
        comb_gain: f32,
        reference: &[f32],
        out: &mut [f32],
    ) {
        // Step 1: comb filter on the excitation, gain ramped from the last subframe
        let target = comb_gain * pitch_gain.clamp(0.0, 1.0);
        comb_filter(history, exc, pitch, self.last_comb, target, out);
        self.last_comb = target;

        // Step 2: synthesis with the enhancer's own memory
        iir_mem_in_place(out, ak, &mut self.mem_syn);

        // Step 3: short-term postfilter
        let mut num = [0.0f32; LPC_ORDER + 1];
        let mut den = [0.0f32; LPC_ORDER + 1];
        bw_lpc(GAMMA_NUM, ak, &mut num);
        bw_lpc(GAMMA_DEN, ak, &mut den);
        filter_mem_in_place(out, &num, &den, &mut self.mem_stp);

        // Step 4: tilt compensation
        let mu = tilt_factor(&num, &den);
        let mut prev = self.mem_tilt;
        for v in out.iter_mut() {
            let x = *v;
            *v = x + mu * prev;
            prev = x;
        }
        self.mem_tilt = prev;

        // Step 5: gain control
        self.scale_st(reference, out);
    }

    /// Smoothly scale `out` to the energy of `reference`
    fn scale_st(&mut self, reference: &[f32], out: &mut [f32]) {
        let e_out = energy(out);
        let gain = if e_out > 1e-6 {
            (energy(reference) / e_out).sqrt()
        } else {
            1.0
        };
        for v in out.iter_mut() {
            self.gain_prec = AGC_FAC * self.gain_prec + (1.0 - AGC_FAC) * gain;
            *v *= self.gain_prec;
        }
    }
}

/// `out[n] = e[n] + g[n]·e[n - pitch]` rescaled to the energy of `e`,
/// with `g` ramping linearly from `from` to `to`
fn comb_filter(history: &[f32], exc: &[f32], pitch: usize, from: f32, to: f32, out: &mut [f32]) {
    let n = history.len();
    let len = exc.len() as f32;
    for (i, v) in out.iter_mut().enumerate() {
        let past = if i < pitch {
            history[n + i - pitch]
        } else {
            exc[i - pitch]
        };
        let g = from + (to - from) * (i as f32 + 1.0) / len;
        *v = exc[i] + g * past;
    }

    let e_new = energy(out);
    if e_new > 1e-6 {
        let scale = (energy(exc) / e_new).sqrt();
        out.iter_mut().for_each(|v| *v *= scale);
    }
}

/// Tilt coefficient of `1 + μ z^-1` for the postfilter `num/den`
fn tilt_factor(num: &[f32], den: &[f32]) -> f32 {
    let mut h = [0.0f32; LONG_H_ST];
    h[..num.len()].copy_from_slice(num);
    let mut mem = [0.0f32; LPC_ORDER];
    iir_mem_in_place(&mut h, den, &mut mem);

    let rh0 = energy(&h);
    if rh0 <= 0.0 {
        return 0.0;
    }
    let rh1: f32 = h.windows(2).map(|w| w[0] * w[1]).sum();
    let k1 = -rh1 / rh0;
    let gamma = if k1 > 0.0 {
        GAMMA_TILT_PLUS
    } else {
        GAMMA_TILT_MINUS
    };
    gamma * k1
}

#[cfg(test)]
mod tests {
    use super::*;

    const LPC: [f32; 11] = [1.0, -1.2, 0.8, -0.3, 0.1, 0.05, -0.02, 0.01, 0.0, 0.0, 0.0];

    #[test]
    fn test_comb_preserves_energy() {
        let history: Vec<f32> = (0..160).map(|i| ((i % 40) as f32 - 20.0) * 10.0).collect();
        let exc: Vec<f32> = (0..40).map(|i| (i as f32 * 0.9).sin() * 300.0).collect();
        let mut out = [0.0; 40];
        comb_filter(&history, &exc, 40, 0.3, 0.5, &mut out);
        let ratio = energy(&out) / energy(&exc);
        assert!((ratio - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_comb_with_zero_gain_is_identity() {
        let history = [1.0; 100];
        let exc: Vec<f32> = (0..40).map(|i| i as f32).collect();
        let mut out = [0.0; 40];
        comb_filter(&history, &exc, 50, 0.0, 0.0, &mut out);
        for (a, b) in out.iter().zip(&exc) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_tilt_compensates_lowpass_filter() {
        let mut num = [0.0; 11];
        let mut den = [0.0; 11];
        bw_lpc(GAMMA_NUM, &LPC, &mut num);
        bw_lpc(GAMMA_DEN, &LPC, &mut den);
        // A resonant low-frequency filter needs a high-pass tilt
        assert!(tilt_factor(&num, &den) < 0.0);
    }

    #[test]
    fn test_agc_tracks_reference_energy() {
        let mut enhancer = Enhancer::new();
        let history = vec![0.0; 160];
        let exc: Vec<f32> = (0..40).map(|i| ((i * 37) % 17) as f32 - 8.0).collect();
        let reference: Vec<f32> = exc.iter().map(|v| v * 50.0).collect();
        let mut out = [0.0; 40];
        for _ in 0..50 {
            enhancer.process_subframe(&history, &exc, &LPC, 40, 0.0, 0.0, &reference, &mut out);
        }
        let ratio = energy(&out) / energy(&reference);
        assert!(ratio > 0.5 && ratio < 2.0, "ratio {}", ratio);
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
