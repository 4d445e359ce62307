//! Benchmarks for pose smoothing and the calibrate/clamp filter

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use expressive_head::{
    filters::{create_filter, PoseFilter},
    motion::{HeadPose, SafetyLimits},
};

fn noisy_poses(count: usize) -> Vec<HeadPose> {
    (0..count)
        .map(|i| {
            let t = i as f64 * 0.1;
            HeadPose::new(
                10.0 * t.sin() + 0.5 * rand::random::<f64>(),
                15.0 * t.cos() + 0.5 * rand::random::<f64>(),
                3.0 * (0.5 * t).sin() + 0.5 * rand::random::<f64>(),
            )
        })
        .collect()
}

fn benchmark_smoothers(c: &mut Criterion) {
    let mut group = c.benchmark_group("smoothers");
    let data = noisy_poses(100);

    for name in ["none", "exponential"] {
        let mut smoother = create_filter(name, 0.25).expect("valid filter");
        group.bench_with_input(BenchmarkId::new("single_update", name), &data[0], |b, &pose| {
            b.iter(|| black_box(smoother.apply(black_box(pose))));
        });

        group.bench_with_input(BenchmarkId::new("sequence_100", name), &data, |b, data| {
            b.iter(|| {
                smoother.reset();
                for &pose in data {
                    black_box(smoother.apply(black_box(pose)));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_pose_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_filter");
    let data = noisy_poses(100);

    for factor in [0.0, 0.25, 0.75] {
        let smoother = create_filter("exponential", factor).expect("valid filter");
        let mut filter = PoseFilter::new(smoother, SafetyLimits::default()).with_deadband(1.5);
        group.bench_with_input(BenchmarkId::new("sequence_100", factor), &data, |b, data| {
            b.iter(|| {
                filter.reset();
                filter.calibrate_if_needed(data[0]);
                for &pose in data {
                    black_box(filter.update(black_box(pose)));
                }
            });
        });
    }

    let mut limits_only = PoseFilter::new(create_filter("none", 0.0).expect("valid filter"), SafetyLimits::default());
    let extreme = HeadPose::new(90.0, -120.0, f64::NAN);
    group.bench_function("clamp_extreme", |b| {
        b.iter(|| black_box(limits_only.update(black_box(extreme))));
    });

    group.finish();
}

criterion_group!(benches, benchmark_smoothers, benchmark_pose_filter);
criterion_main!(benches);
