use criterion::{black_box, criterion_group, criterion_main, Criterion};
use izprime::bitmap::Bitmap;
use izprime::{classic, iz, segment};

fn bench_sizm_1m(c: &mut Criterion) {
    c.bench_function("sizm(1_000_000)", |b| {
        b.iter(|| segment::sizm(black_box(1_000_000)));
    });
}

fn bench_soe_1m(c: &mut Criterion) {
    c.bench_function("soe(1_000_000)", |b| {
        b.iter(|| classic::soe(black_box(1_000_000)));
    });
}

fn bench_root_primes(c: &mut Criterion) {
    c.bench_function("root_primes(1_616_615)", |b| {
        b.iter(|| iz::root_primes(black_box(1_616_615)));
    });
}

fn bench_clear_steps(c: &mut Criterion) {
    let mut bm = Bitmap::new(1 << 21, true).unwrap();
    c.bench_function("clear_steps(step=13)", |b| {
        b.iter(|| bm.clear_steps(black_box(13), black_box(5), black_box((1 << 21) - 1)));
    });
    c.bench_function("clear_steps_scalar(step=13)", |b| {
        b.iter(|| bm.clear_steps_scalar(black_box(13), black_box(5), black_box((1 << 21) - 1)));
    });
}

fn bench_build_vx_base(c: &mut Criterion) {
    c.bench_function("build_vx_base(1_616_615)", |b| {
        b.iter(|| iz::build_vx_base(black_box(1_616_615)));
    });
}

criterion_group!(
    benches,
    bench_sizm_1m,
    bench_soe_1m,
    bench_root_primes,
    bench_clear_steps,
    bench_build_vx_base,
);
criterion_main!(benches);
