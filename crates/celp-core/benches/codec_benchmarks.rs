use celp_core::celp::modes::FRAME_SIZE;
use celp_core::{AudioCodec, Bits, CelpCodec, CelpDecoder, CelpEncoder, CodecConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_speech(frames: usize, seed: u32) -> Vec<f32> {
    let mut state = seed;
    (0..frames * FRAME_SIZE)
        .map(|n| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let noise = (state as i32 >> 20) as f32;
            let t = n as f32;
            3000.0 * (t * 0.11).sin() + 1200.0 * (t * 0.33).sin() + noise
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let input = generate_speech(10, 42);
    let mut group = c.benchmark_group("celp_encode");
    for id in 1..8u8 {
        let config = CodecConfig::new().with_submode(id);
        group.bench_with_input(BenchmarkId::new("submode", id), &id, |b, _| {
            let mut encoder = CelpEncoder::new(&config).unwrap();
            let mut bits = Bits::new(64);
            let mut pcm = vec![0.0f32; FRAME_SIZE];
            let mut frames = input.chunks(FRAME_SIZE).cycle();
            b.iter(|| {
                pcm.copy_from_slice(frames.next().unwrap());
                bits.reset();
                encoder.encode(black_box(&mut pcm), &mut bits).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let input = generate_speech(10, 7);
    let mut group = c.benchmark_group("celp_decode");
    for id in 1..8u8 {
        let config = CodecConfig::new().with_submode(id);
        let mut encoder = CelpEncoder::new(&config).unwrap();
        let packets: Vec<Vec<u8>> = input
            .chunks(FRAME_SIZE)
            .map(|frame| {
                let mut pcm = frame.to_vec();
                let mut bits = Bits::new(64);
                encoder.encode(&mut pcm, &mut bits).unwrap();
                bits.insert_terminator().unwrap();
                bits.to_bytes()
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("submode", id), &id, |b, _| {
            let mut decoder = CelpDecoder::new(&config).unwrap();
            let mut bits = Bits::new(64);
            let mut out = vec![0.0f32; FRAME_SIZE];
            let mut stream = packets.iter().cycle();
            b.iter(|| {
                bits.read_from(stream.next().unwrap()).unwrap();
                decoder.decode(&mut bits, black_box(&mut out)).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_conceal(c: &mut Criterion) {
    let mut codec = CelpCodec::new(CodecConfig::default()).unwrap();
    let frame: Vec<i16> = generate_speech(1, 3).iter().map(|&v| v as i16).collect();
    let packet = codec.encode(&frame).unwrap();
    codec.decode(&packet).unwrap();
    c.bench_function("celp_decode_lost", |b| {
        b.iter(|| black_box(codec.decode_lost().unwrap()))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_conceal);
criterion_main!(benches);
