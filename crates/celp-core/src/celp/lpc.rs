//! LPC analysis
//!
//! Windowed autocorrelation, lag windowing and the Levinson-Durbin
//! recursion. Coefficient vectors carry the leading `a[0] = 1`, so an
//! order-`p` filter is a slice of `p + 1` values describing
//! `A(z) = 1 + a[1] z^-1 + ... + a[p] z^-p`.

use once_cell::sync::Lazy;

use super::modes::{FRAME_SIZE, LAG_FACTOR, LPC_ORDER, WINDOW_SIZE};

/// Asymmetric analysis window over 40 past samples plus the frame: a slow
/// Hamming rise over the first 160 samples and a fast fall over the last
/// 40, peaking 40 samples before the end of the frame
pub static ANALYSIS_WINDOW: Lazy<Vec<f32>> = Lazy::new(|| {
    let rise = FRAME_SIZE;
    let fall = WINDOW_SIZE - FRAME_SIZE;
    apodize::hamming_iter(2 * rise)
        .take(rise)
        .chain(apodize::hamming_iter(2 * fall).skip(fall))
        .map(|w| w as f32)
        .collect()
});

/// Gaussian lag window applied to the autocorrelation (about 100 Hz of
/// bandwidth expansion at 8 kHz)
pub static LAG_WINDOW: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..=LPC_ORDER)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * LAG_FACTOR * i as f32;
            (-0.5 * x * x).exp()
        })
        .collect()
});

/// Autocorrelation of `x` at lags `0..ac.len()`
pub fn autocorrelate(x: &[f32], ac: &mut [f32]) {
    for (lag, r) in ac.iter_mut().enumerate() {
        *r = x
            .iter()
            .skip(lag)
            .zip(x.iter())
            .map(|(a, b)| a * b)
            .sum();
    }
}

/// Multiply each autocorrelation lag by the matching window weight
pub fn apply_lag_window(ac: &mut [f32], window: &[f32]) {
    for (r, w) in ac.iter_mut().zip(window) {
        *r *= w;
    }
}

/// Levinson-Durbin recursion
///
/// Solves for the order `lpc.len() - 1` predictor from `ac` (at least
/// `lpc.len()` lags), writing the polynomial into `lpc` and the reflection
/// coefficients into `rc`. Returns the final prediction error.
///
/// A zero-energy input (`ac[0] == 0`) yields the unit polynomial, all-zero
/// reflection coefficients and an error equal to the (zero) energy.
pub fn levinson_durbin(ac: &[f32], lpc: &mut [f32], rc: &mut [f32]) -> f32 {
    let order = lpc.len() - 1;
    lpc.fill(0.0);
    lpc[0] = 1.0;
    rc.fill(0.0);

    if ac[0] == 0.0 {
        return ac[0];
    }

    let mut error = ac[0];
    for i in 0..order {
        let mut rr = -ac[i + 1];
        for j in 0..i {
            rr -= lpc[j + 1] * ac[i - j];
        }
        // Small bias on the error keeps the recursion away from |k| >= 1
        let r = rr / (error + 0.003 * ac[0]);
        rc[i] = r;

        for j in 0..i / 2 {
            let tmp = lpc[j + 1];
            lpc[j + 1] += r * lpc[i - j];
            lpc[i - j] += r * tmp;
        }
        if i % 2 == 1 {
            lpc[i / 2 + 1] += lpc[i / 2 + 1] * r;
        }
        lpc[i + 1] = r;

        error -= r * r * error;
    }
    error
}

/// Window the analysis buffer, estimate autocorrelation with a noise floor
/// and lag window, and run Levinson-Durbin
///
/// `samples` must hold [`WINDOW_SIZE`] samples; `lpc` receives `LPC_ORDER + 1`
/// coefficients. Returns the prediction error.
pub fn analyze(samples: &[f32], windowed: &mut [f32], lpc: &mut [f32]) -> f32 {
    for ((w, s), win) in windowed.iter_mut().zip(samples).zip(ANALYSIS_WINDOW.iter()) {
        *w = s * win;
    }

    let mut ac = [0.0f32; LPC_ORDER + 1];
    autocorrelate(windowed, &mut ac);
    // Noise floor, then a slight white-noise correction
    ac[0] += 10.0;
    ac[0] *= super::modes::LPC_FLOOR;
    apply_lag_window(&mut ac, &LAG_WINDOW);

    let mut rc = [0.0f32; LPC_ORDER];
    levinson_durbin(&ac, lpc, &mut rc)
}
