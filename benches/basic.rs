use criterion::{criterion_group, criterion_main, Criterion};
use serial_assistant::codec::{decode_hex, decode_text, encode_hex};
use std::hint::black_box;
use std::time::Duration;

pub fn bench_hex_codec(c: &mut Criterion) {
    // One full read buffer.
    let bytes: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
    let hex = encode_hex(&bytes);

    c.bench_function("decode_hex_1k", |b| {
        b.iter(|| black_box(decode_hex(black_box(&hex)).unwrap()))
    });
    c.bench_function("encode_hex_1k", |b| {
        b.iter(|| black_box(encode_hex(black_box(&bytes))))
    });
    c.bench_function("decode_text_1k", |b| {
        b.iter(|| black_box(decode_text(black_box(&bytes))))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_hex_codec
}
criterion_main!(benches);
