//! Short-term filters
//!
//! All filters are transposed direct form II with the state carried in a
//! caller-owned memory slice of length `order`, so a signal can be
//! processed in arbitrary pieces with identical results. Coefficient
//! slices include the leading 1 (see [`super::lpc`]).

use super::lsp::MAX_LPC_ORDER;

/// `A(z/γ)`: scale coefficient `i` by `γ^i`
pub fn bw_lpc(gamma: f32, lpc_in: &[f32], lpc_out: &mut [f32]) {
    let mut g = 1.0;
    for (out, a) in lpc_out.iter_mut().zip(lpc_in) {
        *out = a * g;
        g *= gamma;
    }
}

/// All-pole filter `1/A(z)` in place
pub fn iir_mem_in_place(buf: &mut [f32], den: &[f32], mem: &mut [f32]) {
    let ord = mem.len();
    if ord == 0 {
        return;
    }
    for s in buf.iter_mut() {
        let yi = *s + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] - den[j + 1] * yi;
        }
        mem[ord - 1] = -den[ord] * yi;
        *s = yi;
    }
}

/// All-zero filter `A(z)` in place
pub fn fir_mem_in_place(buf: &mut [f32], num: &[f32], mem: &mut [f32]) {
    let ord = mem.len();
    if ord == 0 {
        return;
    }
    for s in buf.iter_mut() {
        let xi = *s;
        let yi = xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] + num[j + 1] * xi;
        }
        mem[ord - 1] = num[ord] * xi;
        *s = yi;
    }
}

/// Pole-zero filter `N(z)/D(z)` in place
pub fn filter_mem_in_place(buf: &mut [f32], num: &[f32], den: &[f32], mem: &mut [f32]) {
    let ord = mem.len();
    if ord == 0 {
        return;
    }
    for s in buf.iter_mut() {
        let xi = *s;
        let yi = xi + mem[0];
        for j in 0..ord - 1 {
            mem[j] = mem[j + 1] + num[j + 1] * xi - den[j + 1] * yi;
        }
        mem[ord - 1] = num[ord] * xi - den[ord] * yi;
        *s = yi;
    }
}

/// `y = x / A(z)`
pub fn iir_mem(x: &[f32], den: &[f32], y: &mut [f32], mem: &mut [f32]) {
    y.copy_from_slice(x);
    iir_mem_in_place(y, den, mem);
}

/// `y = A(z) x`
pub fn fir_mem(x: &[f32], num: &[f32], y: &mut [f32], mem: &mut [f32]) {
    y.copy_from_slice(x);
    fir_mem_in_place(y, num, mem);
}

/// `y = N(z)/D(z) x`
pub fn filter_mem(x: &[f32], num: &[f32], den: &[f32], y: &mut [f32], mem: &mut [f32]) {
    y.copy_from_slice(x);
    filter_mem_in_place(y, num, den, mem);
}

/// Impulse response of `A(z/γ1) / (A(z/γ2) Â(z))`, truncated to `y.len()`
///
/// `ak` is the quantized synthesis filter, `awk1`/`awk2` the weighting
/// numerator and denominator.
pub fn compute_impulse_response(ak: &[f32], awk1: &[f32], awk2: &[f32], y: &mut [f32]) {
    let ord = ak.len() - 1;
    y.fill(0.0);
    for (i, v) in y.iter_mut().enumerate().take(ord + 1) {
        *v = awk1[i];
    }
    let mut mem1 = [0.0f32; MAX_LPC_ORDER];
    let mut mem2 = [0.0f32; MAX_LPC_ORDER];
    iir_mem_in_place(y, awk2, &mut mem1[..ord]);
    iir_mem_in_place(y, ak, &mut mem2[..ord]);
}

/// Zero-state response of `A(z/γ1) / (Â(z) A(z/γ2))` to `x`
pub fn syn_percep_zero(x: &[f32], ak: &[f32], awk1: &[f32], awk2: &[f32], y: &mut [f32]) {
    let ord = ak.len() - 1;
    let mut mem = [0.0f32; MAX_LPC_ORDER];
    filter_mem(x, awk1, ak, y, &mut mem[..ord]);
    mem.fill(0.0);
    iir_mem_in_place(y, awk2, &mut mem[..ord]);
}

/// Zero-state inverse of [`syn_percep_zero`]: `Â(z) A(z/γ2) / A(z/γ1)`
pub fn residue_percep_zero(x: &[f32], ak: &[f32], awk1: &[f32], awk2: &[f32], y: &mut [f32]) {
    let ord = ak.len() - 1;
    let mut mem = [0.0f32; MAX_LPC_ORDER];
    filter_mem(x, ak, awk1, y, &mut mem[..ord]);
    mem.fill(0.0);
    fir_mem_in_place(y, awk2, &mut mem[..ord]);
}

/// Zero-state response through a truncated impulse response `r`
///
/// `y[n] = Σ_{m ≤ n} x[m] r[n - m]`, for `n < y.len()`.
pub fn convolve_response(x: &[f32], r: &[f32], y: &mut [f32]) {
    for (n, out) in y.iter_mut().enumerate() {
        *out = x
            .iter()
            .take(n + 1)
            .enumerate()
            .map(|(m, &v)| v * r[n - m])
            .sum();
    }
}

/// Filters of one subframe
///
/// `ak` is the quantized synthesis filter `Â(z)`, `awk1`/`awk2` the
/// weighting numerator and denominator and `impulse` the impulse response
/// of their cascade, truncated to the subframe length.
#[derive(Debug, Clone, Copy)]
pub struct SubframeFilters<'a> {
    /// Quantized synthesis filter
    pub ak: &'a [f32],
    /// Weighting numerator `A(z/γ1)`
    pub awk1: &'a [f32],
    /// Weighting denominator `A(z/γ2)`
    pub awk2: &'a [f32],
    /// Impulse response of the weighted synthesis cascade
    pub impulse: &'a [f32],
}

impl SubframeFilters<'_> {
    /// Weighted zero-state response of an excitation vector
    pub fn zero_state(&self, x: &[f32], y: &mut [f32]) {
        convolve_response(x, self.impulse, y);
    }
}

/// Root mean square of `x` (0 for an empty slice)
pub fn compute_rms(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

/// Energy `Σ x²`
pub fn energy(x: &[f32]) -> f32 {
    x.iter().map(|v| v * v).sum()
}

/// Inner product
pub fn inner_prod(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}
