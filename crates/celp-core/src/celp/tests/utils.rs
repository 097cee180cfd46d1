//! CELP Test Utilities
//!
//! Synthetic speech-like signals and helpers for driving encoder/decoder
//! pairs frame by frame.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::celp::bits::Bits;
use crate::celp::decoder::{CelpDecoder, DecodeStatus};
use crate::celp::encoder::CelpEncoder;
use crate::celp::modes::FRAME_SIZE;
use crate::types::CodecConfig;

/// Voiced signal: a harmonic series with slowly drifting pitch, a syllable
/// envelope and a little noise
pub fn voiced_signal(seed: u64, frames: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = frames * FRAME_SIZE;
    let mut f0 = rng.gen_range(90.0f32..220.0);
    let mut phase = 0.0f32;
    let mut out = Vec::with_capacity(len);
    for n in 0..len {
        if n % FRAME_SIZE == 0 {
            f0 = (f0 + rng.gen_range(-8.0f32..8.0)).clamp(70.0, 300.0);
        }
        phase += 2.0 * std::f32::consts::PI * f0 / 8000.0;
        let envelope = 0.6 + 0.4 * (n as f32 * 2.0 * std::f32::consts::PI / 2400.0).sin();
        let mut v = 0.0;
        for h in 1..=12 {
            let harmonic = h as f32;
            if harmonic * f0 >= 3800.0 {
                break;
            }
            // Formant-like spectral shaping
            let formant = if (400.0..900.0).contains(&(harmonic * f0)) {
                0.5
            } else {
                0.0
            };
            let weight = 1.0 / harmonic + formant;
            v += weight * (harmonic * phase).sin();
        }
        out.push(4000.0 * envelope * v + rng.gen_range(-80.0f32..80.0));
    }
    out
}

/// White noise of the given amplitude
pub fn noise_signal(seed: u64, frames: usize, amplitude: f32) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames * FRAME_SIZE)
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// Encoder and decoder for one submode; enhancement off so the decoder
/// reproduces the encoder's own synthesis
pub fn session(submode: u8) -> (CelpEncoder, CelpDecoder) {
    let config = CodecConfig::new()
        .with_submode(submode)
        .with_enhancement(false);
    (
        CelpEncoder::new(&config).unwrap(),
        CelpDecoder::new(&config).unwrap(),
    )
}

/// Encode one frame into a fresh terminated buffer; returns the bytes and
/// the encoder's reconstruction
pub fn encode_frame(encoder: &mut CelpEncoder, frame: &[f32]) -> (Vec<u8>, Vec<f32>) {
    let mut pcm = frame.to_vec();
    let mut bits = Bits::new(64);
    encoder.encode(&mut pcm, &mut bits).unwrap();
    bits.insert_terminator().unwrap();
    (bits.to_bytes(), pcm)
}

/// Decode a single-frame packet
pub fn decode_frame(decoder: &mut CelpDecoder, packet: &[u8]) -> Vec<f32> {
    let mut bits = Bits::from_bytes(packet);
    let mut out = vec![0.0; FRAME_SIZE];
    let status = decoder.decode(&mut bits, &mut out).unwrap();
    assert!(matches!(status, DecodeStatus::Decoded { .. }));
    out
}

/// Root mean square of a signal
pub fn rms(x: &[f32]) -> f32 {
    (x.iter().map(|v| v * v).sum::<f32>() / x.len().max(1) as f32).sqrt()
}

/// Largest absolute sample
pub fn peak(x: &[f32]) -> f32 {
    x.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

/// Signal-to-noise ratio of `decoded` against `reference`, in dB
pub fn snr_db(reference: &[f32], decoded: &[f32]) -> f32 {
    let signal: f32 = reference.iter().map(|v| v * v).sum();
    let noise: f32 = reference
        .iter()
        .zip(decoded)
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    10.0 * (signal / noise.max(1e-9)).log10()
}

/// Assert two reconstructions agree up to float rounding
pub fn assert_close(expected: &[f32], actual: &[f32]) {
    assert_eq!(expected.len(), actual.len());
    let tolerance = 1e-3 * peak(expected).max(1.0);
    for (i, (a, b)) in expected.iter().zip(actual).enumerate() {
        assert!((a - b).abs() <= tolerance, "sample {}: {} vs {}", i, a, b);
    }
}
