//! Interleaved multi-pulse codebook
//!
//! The subframe is split into interleaved tracks (track `t` owns positions
//! `t, t + tracks, t + 2·tracks, ...`). Two unit pulses are placed on each
//! track, one track at a time, each time choosing the position and sign
//! that maximize `C²/E` for the whole pulse set under one common gain.
//! The gain is then re-estimated and scalar quantized.
//!
//! Per track the bitstream carries one sign bit and two position indices.
//! Their order tells the decoder how the second pulse relates to the first:
//!
//! * first ≤ second: both pulses carry the sign (equal positions make a
//!   double pulse)
//! * first > second: the first pulse carries the sign, the second the
//!   opposite one

use tracing::trace;

use crate::error::Result;

use super::arena::Scratch;
use super::bits::Bits;
use super::filters::SubframeFilters;
use super::modes::MultiPulseParams;
use super::tables::{scalar_quant, SCAL_GAIN_3, SCAL_GAIN_3_BOUND};

/// Most pulses any layout places
const MAX_PULSES: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Pulse {
    position: usize,
    negative: bool,
}

impl Pulse {
    fn sign(&self) -> f32 {
        if self.negative {
            -1.0
        } else {
            1.0
        }
    }
}

/// Search, quantize and pack the pulses for `target`
pub fn multipulse_search(
    target: &mut [f32],
    filters: &SubframeFilters<'_>,
    params: &MultiPulseParams,
    innov: &mut [f32],
    bits: &mut Bits,
    scratch: &mut Scratch<'_>,
) -> Result<()> {
    let nsf = target.len();
    let h = filters.impulse;
    let mut scope = scratch.scope();

    // Backward-filtered target d[n] = Σ_k t[k] h[k - n]
    let d = scope.alloc(nsf)?;
    for (n, dn) in d.iter_mut().enumerate() {
        *dn = (n..nsf).map(|k| target[k] * h[k - n]).sum();
    }

    // Correlation matrix of the shifted impulse responses
    let phi = scope.alloc(nsf * nsf)?;
    for i in 0..nsf {
        for j in i..nsf {
            let v: f32 = (j..nsf).map(|k| h[k - i] * h[k - j]).sum();
            phi[i * nsf + j] = v;
            phi[j * nsf + i] = v;
        }
    }

    // Σ_p s_p phi[p][n] for the pulses placed so far
    let cross = scope.alloc(nsf)?;
    let mut pulses = [Pulse::default(); MAX_PULSES];
    let mut placed = 0;
    let (mut c, mut e) = (0.0f32, 0.0f32);

    for _ in 0..params.pulses_per_track {
        for track in 0..params.tracks {
            let mut best: Option<(Pulse, f32)> = None;
            for position in (track..nsf).step_by(params.tracks) {
                for negative in [false, true] {
                    let conflict = pulses[..placed]
                        .iter()
                        .any(|p| p.position == position && p.negative != negative);
                    if conflict {
                        continue;
                    }
                    let s = if negative { -1.0 } else { 1.0 };
                    let c_new = c + s * d[position];
                    let e_new = e + 2.0 * s * cross[position] + phi[position * nsf + position];
                    if c_new <= 0.0 || e_new <= 0.0 {
                        continue;
                    }
                    let score = c_new * c_new / e_new;
                    if best.map_or(true, |(_, b)| score > b) {
                        best = Some((Pulse { position, negative }, score));
                    }
                }
            }

            // Nothing improves the match: reuse the track's first position,
            // agreeing in sign with any pulse already there
            let pulse = best.map_or_else(
                || Pulse {
                    position: track,
                    negative: pulses[..placed]
                        .iter()
                        .any(|p| p.position == track && p.negative),
                },
                |(p, _)| p,
            );
            let s = pulse.sign();
            c += s * d[pulse.position];
            e += 2.0 * s * cross[pulse.position] + phi[pulse.position * nsf + pulse.position];
            for (n, x) in cross.iter_mut().enumerate() {
                *x += s * phi[pulse.position * nsf + n];
            }
            pulses[placed] = pulse;
            placed += 1;
        }
    }

    let gain = if e > 0.0 { c / e } else { 0.0 };
    let gain_index = scalar_quant(gain, &SCAL_GAIN_3_BOUND);
    bits.pack(gain_index as u32, params.gain_bits)?;

    for track in 0..params.tracks {
        let mut on_track = pulses[..placed].iter().filter(|p| p.position % params.tracks == track);
        let (Some(&first), Some(&second)) = (on_track.next(), on_track.next()) else {
            continue;
        };
        let (negative, a, b) = encode_track_pair(first, second);
        bits.pack(u32::from(negative), 1)?;
        bits.pack((a / params.tracks) as u32, params.position_bits)?;
        bits.pack((b / params.tracks) as u32, params.position_bits)?;
    }

    build_innovation(&pulses[..placed], SCAL_GAIN_3[gain_index], innov);

    let response = scope.alloc(nsf)?;
    filters.zero_state(innov, response);
    for (t, r) in target.iter_mut().zip(response.iter()) {
        *t -= r;
    }
    trace!(gain, gain_index, placed, "multi-pulse");
    Ok(())
}

/// Order a track's two pulses for transmission: (sign bit, first, second)
fn encode_track_pair(p: Pulse, q: Pulse) -> (bool, usize, usize) {
    let (lo, hi) = if p.position <= q.position { (p, q) } else { (q, p) };
    if lo.negative == hi.negative {
        (lo.negative, lo.position, hi.position)
    } else {
        (hi.negative, hi.position, lo.position)
    }
}

/// Decode the pulse pair of one track
fn decode_track_pair(negative: bool, a: usize, b: usize) -> [Pulse; 2] {
    let second_negative = if a > b { !negative } else { negative };
    [
        Pulse { position: a, negative },
        Pulse {
            position: b,
            negative: second_negative,
        },
    ]
}

fn build_innovation(pulses: &[Pulse], gain: f32, innov: &mut [f32]) {
    innov.fill(0.0);
    for p in pulses {
        innov[p.position] += gain * p.sign();
    }
}

/// Read the gain and pulses of one subframe
pub fn multipulse_unquant(params: &MultiPulseParams, innov: &mut [f32], bits: &mut Bits) -> Result<()> {
    let gain_index = bits.unpack_unsigned(params.gain_bits)? as usize;
    let gain = SCAL_GAIN_3[gain_index.min(SCAL_GAIN_3.len() - 1)];

    let mut pulses = [Pulse::default(); MAX_PULSES];
    let mut placed = 0;
    for track in 0..params.tracks {
        let negative = bits.unpack_unsigned(1)? != 0;
        let a = bits.unpack_unsigned(params.position_bits)? as usize * params.tracks + track;
        let b = bits.unpack_unsigned(params.position_bits)? as usize * params.tracks + track;
        for pulse in decode_track_pair(negative, a, b) {
            pulses[placed] = pulse;
            placed += 1;
        }
    }
    build_innovation(&pulses[..placed], gain, innov);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celp::arena::ScratchArena;
    use crate::celp::filters::{compute_impulse_response, inner_prod};
    use crate::celp::modes::{InnovationStrategy, NARROWBAND_SUBMODES};

    fn params() -> &'static MultiPulseParams {
        match NARROWBAND_SUBMODES[4].innovation {
            InnovationStrategy::MultiPulse(p) => p,
            _ => panic!("submode 4 is multi-pulse"),
        }
    }

    fn pulse(position: usize, negative: bool) -> Pulse {
        Pulse { position, negative }
    }

    #[test]
    fn test_track_pair_coding_is_order_invariant() {
        let cases = [
            (pulse(5, false), pulse(20, false)),
            (pulse(20, true), pulse(5, true)),
            (pulse(5, false), pulse(20, true)),
            (pulse(20, false), pulse(5, true)),
            (pulse(10, true), pulse(10, true)),
        ];
        for (p, q) in cases {
            let forward = encode_track_pair(p, q);
            assert_eq!(forward, encode_track_pair(q, p));
            let decoded = decode_track_pair(forward.0, forward.1, forward.2);
            let mut expected = [p, q];
            let mut got = decoded;
            expected.sort_by_key(|x| (x.position, x.negative));
            got.sort_by_key(|x| (x.position, x.negative));
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_double_pulse() {
        let mut innov = [0.0; 40];
        build_innovation(&decode_track_pair(false, 10, 10), 1.5, &mut innov);
        assert_eq!(innov[10], 3.0);
        assert_eq!(innov.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_search_round_trip() {
        let lpc = [1.0, -0.8, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut h = [0.0; 40];
        compute_impulse_response(&lpc, &lpc, &lpc, &mut h);
        let filters = SubframeFilters {
            ak: &lpc,
            awk1: &lpc,
            awk2: &lpc,
            impulse: &h,
        };

        // Target made of a few pulses the search should recover closely
        let mut excitation = [0.0; 40];
        excitation[3] = 2.0;
        excitation[17] = -2.0;
        excitation[31] = 2.0;
        let mut target = [0.0; 40];
        filters.zero_state(&excitation, &mut target);
        let before = inner_prod(&target, &target);

        let mut arena = ScratchArena::with_capacity(4096);
        let mut scratch = arena.scope();
        let mut bits = Bits::new(16);
        let mut innov = [0.0; 40];
        multipulse_search(&mut target, &filters, params(), &mut innov, &mut bits, &mut scratch)
            .unwrap();
        assert_eq!(bits.bits_written(), 38);
        assert!(inner_prod(&target, &target) < 0.5 * before);

        let mut decoded = [0.0; 40];
        multipulse_unquant(params(), &mut decoded, &mut bits).unwrap();
        assert_eq!(decoded, innov);
    }
}
