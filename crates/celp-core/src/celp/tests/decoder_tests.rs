//! Decoder Stream Handling Tests
//!
//! Malformed frames must fail without touching session state; control
//! codes (in-band requests, wideband layers, terminators) must be handled
//! in front of narrowband frames.

use super::utils::*;
use crate::celp::bits::Bits;
use crate::celp::decoder::{DecodeStatus, InbandRequest};
use crate::celp::encoder::CelpEncoder;
use crate::celp::modes::FRAME_SIZE;
use crate::error::CodecError;

/// Packets of `frames` consecutive voiced frames at `submode`
fn packets(submode: u8, frames: usize) -> Vec<Vec<u8>> {
    let (mut encoder, _) = session(submode);
    voiced_signal(31, frames)
        .chunks(FRAME_SIZE)
        .map(|frame| encode_frame(&mut encoder, frame).0)
        .collect()
}

#[test]
fn test_invalid_submode_leaves_state_intact() {
    let stream = packets(5, 4);
    let (_, mut reference) = session(5);
    let (_, mut decoder) = session(5);

    for (n, packet) in stream.iter().enumerate() {
        if n == 2 {
            let mut bad = Bits::new(64);
            bad.pack(0, 1).unwrap();
            bad.pack(9, 4).unwrap();
            bad.pack(0x1234_5678, 32).unwrap();
            let mut out = vec![0.0; FRAME_SIZE];
            assert_eq!(
                decoder.decode(&mut bad, &mut out),
                Err(CodecError::InvalidSubmode { submode: 9 })
            );
        }
        let expected = decode_frame(&mut reference, packet);
        let got = decode_frame(&mut decoder, packet);
        assert_eq!(expected, got, "frame {}", n);
    }
}

#[test]
fn test_truncated_frame_leaves_state_intact() {
    for id in [1u8, 3, 7] {
        let stream = packets(id, 4);
        let (_, mut reference) = session(id);
        let (_, mut decoder) = session(id);

        for (n, packet) in stream.iter().enumerate() {
            if n == 2 {
                let mut truncated = Bits::from_bytes(&packet[..packet.len() / 2]);
                let mut out = vec![0.0; FRAME_SIZE];
                let err = decoder.decode(&mut truncated, &mut out).unwrap_err();
                assert!(matches!(err, CodecError::BitstreamUnderflow { .. }));
                assert!(err.is_recoverable());
            }
            let expected = decode_frame(&mut reference, packet);
            let got = decode_frame(&mut decoder, packet);
            assert_eq!(expected, got, "submode {} frame {}", id, n);
        }
    }
}

#[test]
fn test_inband_request_before_frame() {
    let (mut encoder, mut decoder) = session(3);
    let frame = voiced_signal(1, 1);

    let mut bits = Bits::new(64);
    CelpEncoder::write_inband_request(&mut bits, 4, 0xa).unwrap();
    let mut pcm = frame.clone();
    encoder.encode(&mut pcm, &mut bits).unwrap();
    bits.insert_terminator().unwrap();

    let mut reader = Bits::from_bytes(&bits.to_bytes());
    let mut out = vec![0.0; FRAME_SIZE];
    assert_eq!(
        decoder.decode(&mut reader, &mut out).unwrap(),
        DecodeStatus::Decoded { submode: 3 }
    );
    assert_eq!(
        decoder.take_inband_requests(),
        vec![InbandRequest { id: 4, payload: 0xa }]
    );
    assert_close(&pcm, &out);
}

#[test]
fn test_inband_request_toggles_enhancement() {
    let (_, mut decoder) = session(5);
    assert!(!decoder.enhancement());
    let mut bits = Bits::new(8);
    CelpEncoder::write_inband_request(&mut bits, 0, 1).unwrap();
    let mut out = vec![0.0; FRAME_SIZE];
    assert_eq!(
        decoder.decode(&mut bits, &mut out).unwrap(),
        DecodeStatus::EndOfStream
    );
    assert!(decoder.enhancement());
}

#[test]
fn test_wideband_layer_is_skipped() {
    let (mut encoder, mut decoder) = session(3);
    let input = voiced_signal(6, 2);
    let mut bits = Bits::new(128);
    let mut synth = Vec::new();

    for frame in input.chunks(FRAME_SIZE) {
        let mut pcm = frame.to_vec();
        encoder.encode(&mut pcm, &mut bits).unwrap();
        synth.extend(pcm);
        // Layer 1 is 36 bits: flag, 3-bit id, 32 bits of payload
        bits.pack(1, 1).unwrap();
        bits.pack(1, 3).unwrap();
        bits.pack(0xffff_ffff, 32).unwrap();
    }
    bits.insert_terminator().unwrap();

    let mut reader = Bits::from_bytes(&bits.to_bytes());
    let mut out = vec![0.0; FRAME_SIZE];
    let mut decoded = Vec::new();
    while let DecodeStatus::Decoded { submode } = decoder.decode(&mut reader, &mut out).unwrap() {
        assert_eq!(submode, 3);
        decoded.extend_from_slice(&out);
    }
    assert_close(&synth, &decoded);
}

#[test]
fn test_truncated_wideband_layer_is_an_error() {
    let (_, mut decoder) = session(3);
    let mut bits = Bits::new(8);
    bits.pack(1, 1).unwrap();
    bits.pack(4, 3).unwrap();
    bits.pack(0, 20).unwrap();
    let mut out = vec![0.0; FRAME_SIZE];
    assert!(matches!(
        decoder.decode(&mut bits, &mut out),
        Err(CodecError::BitstreamUnderflow { .. })
    ));
}

#[test]
fn test_wrong_output_length_is_rejected() {
    let (_, mut decoder) = session(3);
    let mut bits = Bits::new(8);
    let mut out = vec![0.0; 80];
    assert_eq!(
        decoder.decode(&mut bits, &mut out),
        Err(CodecError::InvalidFrameSize {
            expected: 160,
            actual: 80
        })
    );
    assert!(decoder.decode_lost(&mut out).is_err());
}

#[test]
fn test_reset_matches_fresh_decoder() {
    let stream = packets(6, 3);
    let (_, mut used) = session(6);
    for packet in &stream {
        decode_frame(&mut used, packet);
    }
    used.reset();
    let (_, mut fresh) = session(6);
    for packet in &stream {
        assert_eq!(decode_frame(&mut used, packet), decode_frame(&mut fresh, packet));
    }
}
