use aero_cpu_core::checksum::checksum;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn checksum_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");

    for &len in &[16usize, 64, 256, 1024, 4096] {
        let region: Vec<u8> = (0..len).map(|i| (i * 37) as u8).collect();
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &region, |b, region| {
            b.iter(|| checksum(black_box(region)))
        });
    }

    group.finish();
}

criterion_group!(benches, checksum_sizes);
criterion_main!(benches);
