//! Line spectral pair transform
//!
//! LSPs are kept in the angle domain (radians in `(0, π)`), ascending.
//! The LPC polynomial `A(z)` is split into a symmetric `P(z)` and an
//! antisymmetric `Q(z)` whose unit-circle roots interleave; removing the
//! trivial roots at `z = ±1` leaves order/2-degree polynomials in
//! `x = cos ω` that are evaluated as Chebyshev series.

use std::f32::consts::PI;

use crate::error::{CodecError, Result};

/// Largest LPC order the fixed-size work arrays support
pub const MAX_LPC_ORDER: usize = 20;

/// Evaluate the Chebyshev series `coef` (highest-order first) at `x`
fn cheb_poly_eval(coef: &[f32], x: f32) -> f32 {
    let m = coef.len() - 1;
    let mut sum = coef[m];
    if m == 0 {
        return sum;
    }
    let (mut t_prev, mut t_cur) = (1.0f32, x);
    sum += coef[m - 1] * t_cur;
    for i in 2..=m {
        let t_next = 2.0 * x * t_cur - t_prev;
        t_prev = t_cur;
        t_cur = t_next;
        sum += coef[m - i] * t_cur;
    }
    sum
}

/// Convert an LPC polynomial (with leading 1) to LSP angles
///
/// Roots of `P'` and `Q'` are searched alternately from `x = 1` down to
/// `x = -1` on a grid whose step shrinks near the band edges and where the
/// polynomial is close to zero, and each bracketed root is refined with
/// `bisections` halvings. Returns the number of roots found; when it is
/// less than the order, the entries of `lsp` past that count are untouched.
pub fn lpc_to_lsp(lpc: &[f32], lsp: &mut [f32], bisections: usize, delta: f32) -> usize {
    let order = lpc.len() - 1;
    let m = order / 2;
    let mut p = [0.0f32; MAX_LPC_ORDER / 2 + 1];
    let mut q = [0.0f32; MAX_LPC_ORDER / 2 + 1];

    // Step 1: P'(z) = P(z)/(1 + z^-1), Q'(z) = Q(z)/(1 - z^-1)
    p[0] = 1.0;
    q[0] = 1.0;
    for i in 1..=m {
        p[i] = lpc[i] + lpc[order + 1 - i] - p[i - 1];
        q[i] = lpc[i] - lpc[order + 1 - i] + q[i - 1];
    }
    for i in 0..m {
        p[i] *= 2.0;
        q[i] *= 2.0;
    }
    let (p, q) = (&p[..=m], &q[..=m]);

    // Step 2: alternate between the polynomials, sweeping x downwards
    let mut roots = 0;
    let mut xl = 1.0f32;
    let mut xr = 0.0f32;
    for j in 0..order {
        let poly = if j % 2 == 0 { p } else { q };
        let mut psuml = cheb_poly_eval(poly, xl);
        let mut found = false;
        while !found && xr >= -1.0 {
            let mut dd = delta * (1.0 - 0.9 * xl * xl);
            if psuml.abs() < 0.2 {
                dd *= 0.5;
            }
            xr = xl - dd;
            let psumr = cheb_poly_eval(poly, xr);

            if psumr * psuml < 0.0 {
                // Step 3: bisect the bracketed root
                let (mut lo, mut hi) = (xr, xl);
                let mut psum_hi = psuml;
                let mut xm = 0.0;
                for _ in 0..bisections {
                    xm = 0.5 * (lo + hi);
                    let psumm = cheb_poly_eval(poly, xm);
                    if psumm * psum_hi > 0.0 {
                        psum_hi = psumm;
                        hi = xm;
                    } else {
                        lo = xm;
                    }
                }
                lsp[j] = xm.clamp(-1.0, 1.0).acos();
                roots += 1;
                xl = xm;
                found = true;
            } else {
                psuml = psumr;
                xl = xr;
            }
        }
        if !found {
            break;
        }
    }
    roots
}

/// [`lpc_to_lsp`] that fails unless every root was found
pub fn lpc_to_lsp_checked(lpc: &[f32], lsp: &mut [f32], bisections: usize, delta: f32) -> Result<()> {
    let expected = lpc.len() - 1;
    let found = lpc_to_lsp(lpc, lsp, bisections, delta);
    if found != expected {
        return Err(CodecError::LspConversionFailed { found, expected });
    }
    Ok(())
}

/// Convert LSP angles back to an LPC polynomial (with leading 1)
pub fn lsp_to_lpc(lsp: &[f32], lpc: &mut [f32]) {
    let order = lsp.len();
    let m = order / 2;
    let mut x = [0.0f32; MAX_LPC_ORDER];
    for (xi, w) in x.iter_mut().zip(lsp) {
        *xi = w.cos();
    }

    // Delay lines for the cascaded second-order sections of P and Q, plus
    // the final (1 + z^-1) and (1 - z^-1) factors
    let mut wp = [0.0f32; 4 * MAX_LPC_ORDER + 2];
    let mut xin1 = 1.0f32;
    let mut xin2 = 1.0f32;
    for a in lpc.iter_mut().take(order + 1) {
        let mut n4 = 0;
        for i in 0..m {
            let n1 = i * 4;
            let (n2, n3) = (n1 + 1, n1 + 2);
            n4 = n1 + 3;
            let xout1 = xin1 - 2.0 * x[2 * i] * wp[n1] + wp[n2];
            let xout2 = xin2 - 2.0 * x[2 * i + 1] * wp[n3] + wp[n4];
            wp[n2] = wp[n1];
            wp[n4] = wp[n3];
            wp[n1] = xin1;
            wp[n3] = xin2;
            xin1 = xout1;
            xin2 = xout2;
        }
        let xout1 = xin1 + wp[n4 + 1];
        let xout2 = xin2 - wp[n4 + 2];
        *a = 0.5 * (xout1 + xout2);
        wp[n4 + 1] = xin1;
        wp[n4 + 2] = xin2;
        xin1 = 0.0;
        xin2 = 0.0;
    }
}

/// Force at least `margin` between neighbouring LSPs and keep every value
/// inside `(0, π)`
///
/// A forward pass pushes values up from the low edge, a backward pass
/// pulls them down from the high edge. Non-finite entries are replaced by
/// the value their neighbours force.
pub fn lsp_enforce_margin(lsp: &mut [f32], margin: f32) {
    let n = lsp.len();
    if n == 0 {
        return;
    }
    let sanitize = |v: f32| if v.is_finite() { v } else { 0.0 };

    lsp[0] = sanitize(lsp[0]).max(margin);
    for i in 1..n {
        lsp[i] = sanitize(lsp[i]).max(lsp[i - 1] + margin);
    }

    lsp[n - 1] = lsp[n - 1].min(PI - margin);
    for i in (0..n - 1).rev() {
        lsp[i] = lsp[i].min(lsp[i + 1] - margin);
    }
}

/// Linear interpolation `(1 - t) * old + t * new`
pub fn lsp_interpolate(old: &[f32], new: &[f32], t: f32, out: &mut [f32]) {
    for ((o, a), b) in out.iter_mut().zip(old).zip(new) {
        *o = (1.0 - t) * a + t * b;
    }
}

/// Interpolate two LSP sets, enforce `margin` and convert to LPC
pub fn lsp_interpolate_to_lpc(old: &[f32], new: &[f32], t: f32, margin: f32, lpc: &mut [f32]) {
    let mut buf = [0.0f32; MAX_LPC_ORDER];
    let lsp = &mut buf[..old.len()];
    lsp_interpolate(old, new, t, lsp);
    lsp_enforce_margin(lsp, margin);
    lsp_to_lpc(lsp, lpc);
}

/// Equally spaced LSPs, the spectrum of a flat filter
pub fn lsp_flat(lsp: &mut [f32]) {
    let n = lsp.len() as f32;
    for (i, w) in lsp.iter_mut().enumerate() {
        *w = PI * (i as f32 + 1.0) / (n + 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celp::lpc::levinson_durbin;
    use proptest::prelude::*;

    fn speech_like_lpc() -> [f32; 11] {
        // Resonant autocorrelation: damped cosines at two formants
        let ac: Vec<f32> = (0..11)
            .map(|k| {
                let k = k as f32;
                0.95f32.powf(k) * (0.6 * (0.35 * k).cos() + 0.4 * (1.2 * k).cos())
            })
            .collect();
        let mut lpc = [0.0; 11];
        let mut rc = [0.0; 10];
        levinson_durbin(&ac, &mut lpc, &mut rc);
        lpc
    }

    #[test]
    fn test_flat_filter_round_trip() {
        let mut lsp = [0.0; 10];
        lsp_flat(&mut lsp);
        let mut lpc = [0.0; 11];
        lsp_to_lpc(&lsp, &mut lpc);
        assert!((lpc[0] - 1.0).abs() < 1e-5);
        assert!(lpc[1..].iter().all(|a| a.abs() < 1e-4), "{:?}", lpc);
    }

    #[test]
    fn test_lpc_lsp_round_trip() {
        let lpc = speech_like_lpc();
        let mut lsp = [0.0; 10];
        let roots = lpc_to_lsp(&lpc, &mut lsp, 10, 0.02);
        assert_eq!(roots, 10);
        assert!(lsp.windows(2).all(|w| w[1] > w[0]));
        assert!(lsp.iter().all(|&w| w > 0.0 && w < PI));

        let mut back = [0.0; 11];
        lsp_to_lpc(&lsp, &mut back);
        for (a, b) in lpc.iter().zip(&back) {
            assert!((a - b).abs() < 0.02, "{:?} vs {:?}", lpc, back);
        }
    }

    #[test]
    fn test_checked_conversion_reports_missing_roots() {
        // Roots outside the unit circle leave the polynomials without
        // interleaved real roots
        let lpc = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0];
        let mut lsp = [0.0; 10];
        let err = lpc_to_lsp_checked(&lpc, &mut lsp, 10, 0.02).unwrap_err();
        assert!(matches!(err, CodecError::LspConversionFailed { expected: 10, .. }));
        assert!(err.is_recoverable());

        let mut flat = [0.0; 11];
        flat[0] = 1.0;
        assert!(lpc_to_lsp_checked(&flat, &mut lsp, 10, 0.02).is_ok());
    }

    #[test]
    fn test_margin_repairs_collisions() {
        let mut lsp = [0.5, 0.5, 0.5, 3.2, f32::NAN];
        lsp_enforce_margin(&mut lsp, 0.01);
        assert!(lsp.windows(2).all(|w| w[1] - w[0] >= 0.01 - 1e-6));
        assert!(lsp.iter().all(|&w| w > 0.0 && w < PI));
    }

    #[test]
    fn test_interpolate() {
        let mut out = [0.0; 2];
        lsp_interpolate(&[1.0, 2.0], &[2.0, 3.0], 0.25, &mut out);
        assert_eq!(out, [1.25, 2.25]);
    }

    proptest! {
        #[test]
        fn prop_enforce_margin_orders_and_bounds(
            mut lsp in proptest::collection::vec(-1.0f32..4.5, 10),
            margin in 0.0005f32..0.05,
        ) {
            lsp_enforce_margin(&mut lsp, margin);
            for pair in lsp.windows(2) {
                // Float rounding can shave an ulp off the spacing
                prop_assert!(pair[1] - pair[0] >= margin * (1.0 - 1e-4));
            }
            prop_assert!(lsp.iter().all(|&w| w > 0.0 && w < PI));
        }
    }
}
