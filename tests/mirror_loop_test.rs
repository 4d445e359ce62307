//! Mirror loop lifecycle and end-to-end pose copying


use expressive_head::{
    config::MirrorConfig,
    landmarks::{FaceLandmarks, Frame, LandmarkDetector, LandmarkScheme},
    mirror::{FrameSource, MirrorLoop, VisionBackend},
    motion::HeadPose,
    Error, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use test_helpers::{fast_mirror_config, recording_bus, ScriptedVision};

fn mirror(vision: &Arc<ScriptedVision>) -> (MirrorLoop, expressive_head::actuator::CommandLog) {
    let (bus, log) = recording_bus();
    let backend: Arc<dyn expressive_head::mirror::VisionBackend> = vision.clone();
    (MirrorLoop::new(backend, bus, fast_mirror_config()), log)
}

#[test]
fn test_start_and_stop() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::new(5.0, 0.0, 0.0)));
    let (mirror, log) = mirror(&vision);

    mirror.start(0).unwrap();
    assert!(mirror.is_running());
    thread::sleep(Duration::from_millis(200));
    mirror.stop();
    assert!(!mirror.is_running());

    let stats = mirror.stats();
    assert!(stats.dispatches > 0);
    assert_eq!(stats.dispatch_failures, 0);

    // A still face is the neutral pose and mirrors as zero, head only
    let commands = log.commands();
    assert_eq!(commands.len() as u64, stats.dispatches);
    for cmd in &commands {
        assert!(cmd.antennas.is_none());
        assert_eq!((cmd.head.pitch_deg, cmd.head.yaw_deg, cmd.head.roll_deg), (0.0, 0.0, 0.0));
        assert_eq!(cmd.duration, Duration::from_millis(100));
    }

    // No commands once stopped
    let count = log.len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(log.len(), count);
}

#[test]
fn test_every_other_frame_is_processed() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::ZERO));
    let (mirror, _) = mirror(&vision);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(150));
    mirror.stop();

    let stats = mirror.stats();
    assert!(stats.frames_captured >= 4);
    assert_eq!(stats.frames_processed, stats.frames_captured / 2);
    assert_eq!(vision.detections() as u64, stats.frames_processed);
    assert_eq!(stats.faces_detected, stats.frames_processed);
}

#[test]
fn test_head_motion_is_copied() {
    let vision = Arc::new(ScriptedVision::new(vec![vec![
        HeadPose::ZERO,
        HeadPose::new(8.0, 12.0, -6.0),
    ]]));
    let (mirror, log) = mirror(&vision);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(300));
    mirror.stop();

    let last = log.commands().pop().unwrap();
    // Looking up is a negative robot pitch
    assert!((last.head.pitch_deg + 8.0).abs() < 0.05, "pitch {}", last.head.pitch_deg);
    assert!((last.head.yaw_deg - 12.0).abs() < 0.05, "yaw {}", last.head.yaw_deg);
    assert!((last.head.roll_deg + 6.0).abs() < 0.05, "roll {}", last.head.roll_deg);
}

#[test]
fn test_mirrored_view_swaps_sides() {
    let vision = Arc::new(ScriptedVision::new(vec![vec![
        HeadPose::ZERO,
        HeadPose::new(8.0, 12.0, -6.0),
    ]]));
    let (bus, log) = recording_bus();
    let config = MirrorConfig {
        flip_horizontal: true,
        ..fast_mirror_config()
    };
    let mirror = MirrorLoop::new(vision, bus, config);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(300));
    mirror.stop();

    let last = log.commands().pop().unwrap();
    assert!((last.head.pitch_deg + 8.0).abs() < 0.05, "pitch {}", last.head.pitch_deg);
    assert!((last.head.yaw_deg + 12.0).abs() < 0.05, "yaw {}", last.head.yaw_deg);
    assert!((last.head.roll_deg - 6.0).abs() < 0.05, "roll {}", last.head.roll_deg);
}

#[test]
fn test_large_motion_is_clamped() {
    let vision = Arc::new(ScriptedVision::new(vec![vec![
        HeadPose::ZERO,
        HeadPose::new(-25.0, 30.0, 0.0),
    ]]));
    let (mirror, log) = mirror(&vision);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(300));
    mirror.stop();

    for cmd in log.commands() {
        assert!(cmd.head.pitch_deg.abs() <= 20.0);
        assert!(cmd.head.yaw_deg.abs() <= 40.0);
        assert!(cmd.head.roll_deg.abs() <= 30.0);
    }
    let last = log.commands().pop().unwrap();
    assert_eq!(last.head.pitch_deg, 20.0);
}

#[test]
fn test_camera_unavailable() {
    let vision = Arc::new(ScriptedVision::unplugged());
    let (mirror, log) = mirror(&vision);

    let result = mirror.start(3);
    assert!(matches!(result, Err(Error::SensorUnavailable(msg)) if msg.contains('3')));
    assert!(!mirror.is_running());
    assert!(log.is_empty());
    mirror.stop();
}

#[test]
fn test_second_start_is_ignored() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::ZERO));
    let (mirror, _) = mirror(&vision);

    mirror.start(0).unwrap();
    mirror.start(0).unwrap();
    assert_eq!(vision.opens(), 1);
    mirror.stop();
    mirror.stop();
    assert!(!mirror.is_running());
}

#[test]
fn test_restart_recalibrates() {
    let vision = Arc::new(ScriptedVision::new(vec![
        vec![HeadPose::new(5.0, -3.0, 0.0)],
        vec![HeadPose::new(12.0, 6.0, 2.0)],
    ]));
    let (mirror, log) = mirror(&vision);

    for _ in 0..2 {
        mirror.start(0).unwrap();
        thread::sleep(Duration::from_millis(100));
        mirror.stop();
    }

    assert_eq!(vision.opens(), 2);
    assert!(!log.is_empty());
    // Each session takes its own first pose as neutral
    for cmd in log.commands() {
        assert_eq!((cmd.head.pitch_deg, cmd.head.yaw_deg, cmd.head.roll_deg), (0.0, 0.0, 0.0));
    }
}

#[test]
fn test_capture_dropouts_are_skipped() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::ZERO).with_dropouts(3));
    let (mirror, _) = mirror(&vision);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(200));
    mirror.stop();

    let stats = mirror.stats();
    assert!(stats.capture_failures > 0);
    assert!(stats.dispatches > 0);
}

#[test]
fn test_actuator_failures_do_not_stop_the_loop() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::ZERO));
    let (mirror, log) = mirror(&vision);
    log.set_failing(true);

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(mirror.is_running());
    mirror.stop();

    let stats = mirror.stats();
    assert_eq!(stats.dispatches, 0);
    assert!(stats.dispatch_failures > 0);
    assert_eq!(log.rejected() as u64, stats.dispatch_failures);
}

/// Detector that panics during the first camera session and sees no face afterwards
struct CrashingDetector {
    session: usize,
}

impl LandmarkDetector for CrashingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<FaceLandmarks>> {
        if self.session == 1 {
            panic!("landmark model crashed");
        }
        Ok(None)
    }

    fn scheme(&self) -> LandmarkScheme {
        LandmarkScheme::FaceMesh
    }
}

struct CrashingVision {
    inner: ScriptedVision,
    opens: AtomicUsize,
}

impl VisionBackend for CrashingVision {
    fn open_camera(&self, index: i32) -> Result<Box<dyn FrameSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open_camera(index)
    }

    fn landmark_detector(&self) -> Result<Box<dyn LandmarkDetector>> {
        Ok(Box::new(CrashingDetector {
            session: self.opens.load(Ordering::SeqCst),
        }))
    }
}

#[test]
fn test_crashed_loop_reports_stopped_and_restarts() {
    let vision = Arc::new(CrashingVision {
        inner: ScriptedVision::still(HeadPose::ZERO),
        opens: AtomicUsize::new(0),
    });
    let (bus, log) = recording_bus();
    let mirror = MirrorLoop::new(vision.clone(), bus, fast_mirror_config());

    mirror.start(0).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(!mirror.is_running());
    assert!(log.is_empty());

    // No stop() needed before starting again
    mirror.start(0).unwrap();
    assert_eq!(vision.opens.load(Ordering::SeqCst), 2);
    assert!(mirror.is_running());
    thread::sleep(Duration::from_millis(50));
    assert!(mirror.is_running());
    mirror.stop();
    assert!(!mirror.is_running());
}

#[test]
fn test_invalid_timing_is_rejected_before_start() {
    let vision = Arc::new(ScriptedVision::still(HeadPose::ZERO));
    for config in [
        MirrorConfig {
            frame_sleep_secs: -0.5,
            ..fast_mirror_config()
        },
        MirrorConfig {
            stop_timeout_secs: f64::NAN,
            ..fast_mirror_config()
        },
    ] {
        let (bus, log) = recording_bus();
        let mirror = MirrorLoop::new(vision.clone(), bus, config);

        assert!(matches!(mirror.start(0), Err(Error::ConfigError(_))));
        assert!(!mirror.is_running());
        assert!(log.is_empty());
    }
    assert_eq!(vision.opens(), 0);
}
