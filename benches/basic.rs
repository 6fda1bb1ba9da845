use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serial_line::port::{total_timeout_ms, ByteSize, LineSettings, Parity, StopBits};
use std::time::Duration;

pub fn bench_byte_time(c: &mut Criterion) {
    let settings = LineSettings {
        baud_rate: 115_200,
        byte_size: ByteSize::Seven,
        parity: Parity::Even,
        stop_bits: StopBits::OnePointFive,
        ..LineSettings::default()
    };
    c.bench_function("byte_time_7e1.5", |b| {
        b.iter(|| black_box(black_box(&settings).byte_time()))
    });
}

pub fn bench_total_timeout(c: &mut Criterion) {
    c.bench_function("total_timeout_saturating", |b| {
        b.iter(|| {
            black_box(total_timeout_ms(
                black_box(u32::MAX),
                black_box(u32::MAX),
                black_box(usize::MAX),
            ))
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_byte_time, bench_total_timeout
}
criterion_main!(benches);
