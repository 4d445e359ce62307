//! Benchmarks for the per-frame mirroring hot path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use expressive_head::{
    filters::{create_filter, PoseFilter},
    landmarks::LandmarkScheme,
    motion::{HeadPose, SafetyLimits},
    pose_estimation::{euler_to_rotation, rotation_to_euler, FaceModel, PoseEstimator},
    simulation::{drifting_pose, SyntheticFaceDetector},
};

fn benchmark_pose_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pose_estimation");
    let detector = SyntheticFaceDetector::new();
    let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, false);

    for (width, height) in [(320, 240), (640, 480)] {
        let landmarks = detector
            .landmarks_for(&HeadPose::new(6.0, -14.0, 3.0), width, height)
            .expect("face in view");
        group.bench_with_input(
            BenchmarkId::new("estimate", format!("{width}x{height}")),
            &landmarks,
            |b, landmarks| {
                b.iter(|| black_box(estimator.estimate(black_box(landmarks), width, height)));
            },
        );
    }

    let mirrored = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, true);
    let landmarks = detector
        .landmarks_for(&HeadPose::new(6.0, -14.0, 3.0), 640, 480)
        .expect("face in view");
    group.bench_function("estimate_mirrored", |b| {
        b.iter(|| black_box(mirrored.estimate(black_box(&landmarks), 640, 480)));
    });

    group.bench_function("euler_round_trip", |b| {
        b.iter(|| black_box(rotation_to_euler(&euler_to_rotation(black_box(12.0), -25.0, 7.5))));
    });

    group.finish();
}

fn benchmark_frame_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_pipeline");
    let detector = SyntheticFaceDetector::new();
    let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, true);

    // 100 frames of a drifting face, from landmarks to a safe robot pose
    let frames: Vec<_> = (0..100)
        .filter_map(|i| detector.landmarks_for(&drifting_pose(f64::from(i) / 15.0), 640, 480))
        .collect();

    group.bench_function("landmarks_to_target_100", |b| {
        b.iter(|| {
            let smoother = create_filter("exponential", 0.25).expect("valid filter");
            let mut filter = PoseFilter::new(smoother, SafetyLimits::default());
            for landmarks in &frames {
                if let Some(raw) = estimator.estimate(landmarks, 640, 480) {
                    filter.calibrate_if_needed(raw);
                    black_box(filter.update(raw));
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_pose_estimation, benchmark_frame_pipeline);
criterion_main!(benches);
