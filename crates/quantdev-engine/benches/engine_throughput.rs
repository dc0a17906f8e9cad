//! Engine throughput benchmarks.
//!
//! Run with: `cargo bench -p quantdev-engine`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quantdev_engine::{FeatureEngine, KernelParams, RingConfig, Tick};

fn synthetic_ticks(n: usize) -> Vec<Tick> {
    let mut price = 2_500.0;
    (0..n as u64)
        .map(|i| {
            let h = i.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17);
            let side = if h % 5 < 2 { -1.0 } else { 1.0 };
            price += side * ((h % 11) as f64) * 0.01;
            Tick {
                side,
                qty: 0.01 + (h % 499) as f64 / 200.0,
                price,
                ts: i as i64 * 150,
            }
        })
        .collect()
}

fn bench_engine_update(c: &mut Criterion) {
    let ticks = synthetic_ticks(100_000);

    let mut group = c.benchmark_group("engine_update");
    group.throughput(Throughput::Elements(ticks.len() as u64));
    group.bench_function("base_windows", |b| {
        b.iter(|| {
            let mut engine = FeatureEngine::new(
                RingConfig {
                    capacity: 20_000,
                    l_fast: 2.0,
                    l_slow: 300.0,
                    alpha_var_b: 0.001,
                },
                KernelParams::default(),
            );
            let mut acc = 0.0;
            for t in &ticks {
                let k = engine.update(black_box(t));
                acc += k[0];
            }
            black_box(acc)
        })
    });
    group.bench_function("fast_windows", |b| {
        b.iter(|| {
            let mut engine = FeatureEngine::new(
                RingConfig {
                    capacity: 20_000,
                    l_fast: 0.5,
                    l_slow: 60.0,
                    alpha_var_b: 0.001,
                },
                KernelParams::default(),
            );
            let mut acc = 0.0;
            for t in &ticks {
                let k = engine.update(black_box(t));
                acc += k[4];
            }
            black_box(acc)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_engine_update);
criterion_main!(benches);
