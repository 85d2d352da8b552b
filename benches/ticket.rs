use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use review_relay::{ReviewKind, TicketCoder};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ticket");
    group.throughput(Throughput::Elements(1));

    group.bench_function("encode/ledger_seed", |b| {
        b.iter(|| {
            TicketCoder::encode(
                black_box(ReviewKind::Deposit),
                black_box(48_213_907),
                black_box("3f7b9c2e-5d1a-4e8b-9a0c-1b2d3e4f5a6b"),
            )
        });
    });

    group.bench_function("encode/hashed_seed", |b| {
        b.iter(|| {
            TicketCoder::encode(
                black_box(ReviewKind::Kyc),
                black_box(0),
                black_box("3f7b9c2e-5d1a-4e8b-9a0c-1b2d3e4f5a6b"),
            )
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
