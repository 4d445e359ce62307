//! Background loop that copies the operator's head pose onto the robot.
//!
//! The loop thread owns the camera and the landmark detector for the whole
//! session. Every other frame is processed: landmarks → [`PoseEstimator`] →
//! [`PoseFilter`] → [`MotionBus`]. Calibration is reset on every start.

use crate::{
    actuator::MotionBus,
    config::MirrorConfig,
    filters::{create_filter, PoseFilter},
    landmarks::{Frame, LandmarkDetector},
    motion::JointTarget,
    pose_estimation::{FaceModel, PoseEstimator},
    Error, Result,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A camera that has been opened
pub trait FrameSource: Send {
    /// Grab the next frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] when this frame could not be read
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Opens cameras and builds landmark detectors on the loop thread
pub trait VisionBackend: Send + Sync {
    /// Open camera `index`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SensorUnavailable`] if the device cannot be opened
    fn open_camera(&self, index: i32) -> Result<Box<dyn FrameSource>>;

    /// Create a landmark detector
    ///
    /// # Errors
    ///
    /// Returns an error if detector models cannot be loaded
    fn landmark_detector(&self) -> Result<Box<dyn LandmarkDetector>>;
}

/// Counters for the current mirroring session
#[derive(Debug, Default)]
pub struct MirrorStats {
    frames_captured: AtomicU64,
    frames_processed: AtomicU64,
    capture_failures: AtomicU64,
    faces_detected: AtomicU64,
    poses_estimated: AtomicU64,
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Point-in-time copy of [`MirrorStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorSnapshot {
    /// Frames read from the camera
    pub frames_captured: u64,
    /// Frames passed to the detector
    pub frames_processed: u64,
    /// Failed frame reads
    pub capture_failures: u64,
    /// Processed frames with a face
    pub faces_detected: u64,
    /// Faces with a solved pose
    pub poses_estimated: u64,
    /// Targets accepted by the actuator
    pub dispatches: u64,
    /// Targets rejected by the actuator
    pub dispatch_failures: u64,
}

impl MirrorStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.frames_captured,
            &self.frames_processed,
            &self.capture_failures,
            &self.faces_detected,
            &self.poses_estimated,
            &self.dispatches,
            &self.dispatch_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copy the counters
    #[must_use]
    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            poses_estimated: self.poses_estimated.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    thread: JoinHandle<()>,
    done: Receiver<()>,
    stop_timeout: Duration,
}

/// Clears `running` and signals `done` when the loop thread exits, including by panic
struct DoneGuard {
    done: Sender<()>,
    running: Arc<AtomicBool>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("Mirror loop thread panicked, mirroring stopped");
        }
        self.running.store(false, Ordering::SeqCst);
        let _ = self.done.try_send(());
    }
}

/// Loop sleeps and target duration, checked before the thread starts
#[derive(Debug, Clone, Copy)]
struct Timing {
    frame_sleep: Duration,
    skip_sleep: Duration,
    capture_retry: Duration,
    dispatch: Duration,
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::ConfigError(format!("mirror.{name} must be a non-negative number of seconds, got {value}")))
}

impl Timing {
    fn from_config(config: &MirrorConfig) -> Result<Self> {
        Ok(Self {
            frame_sleep: seconds("frame_sleep_secs", config.frame_sleep_secs)?,
            skip_sleep: seconds("skip_sleep_secs", config.skip_sleep_secs)?,
            capture_retry: seconds("capture_retry_secs", config.capture_retry_secs)?,
            dispatch: seconds("dispatch_secs", config.dispatch_secs)?,
        })
    }
}

/// Head-pose mirroring loop with a `Stopped → Running → Stopped` lifecycle
pub struct MirrorLoop {
    vision: Arc<dyn VisionBackend>,
    bus: Arc<MotionBus>,
    config: MirrorConfig,
    running: Arc<AtomicBool>,
    stats: Arc<MirrorStats>,
    worker: Mutex<Option<Worker>>,
}

impl MirrorLoop {
    /// Create a stopped loop
    #[must_use]
    pub fn new(vision: Arc<dyn VisionBackend>, bus: Arc<MotionBus>, config: MirrorConfig) -> Self {
        Self {
            vision,
            bus,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(MirrorStats::default()),
            worker: Mutex::new(None),
        }
    }

    /// True while the loop thread is running. A thread that died reads as stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Counters for the current or last session
    #[must_use]
    pub fn stats(&self) -> MirrorSnapshot {
        self.stats.snapshot()
    }

    /// Start mirroring from camera `camera_index`. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the timing settings, face model, filter, camera or detector
    /// cannot be set up; the loop stays stopped
    pub fn start(&self, camera_index: i32) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let alive = worker.as_ref().is_some_and(|w| !w.thread.is_finished());
        if alive && self.running.load(Ordering::SeqCst) {
            debug!("Mirror loop already running");
            return Ok(());
        }
        if let Some(stale) = worker.take() {
            // Previous session ended by itself
            self.running.store(false, Ordering::SeqCst);
            if stale.thread.join().is_err() {
                warn!("Previous mirror session ended in a panic");
            }
        }

        let timing = Timing::from_config(&self.config)?;
        let stop_timeout = seconds("stop_timeout_secs", self.config.stop_timeout_secs)?;

        let model = match &self.config.face_model {
            Some(path) => FaceModel::from_file(path)?,
            None => FaceModel::default(),
        };
        let smoother = create_filter(&self.config.filter, self.config.smoothing_factor)?;
        let filter = PoseFilter::new(smoother, *self.bus.limits()).with_deadband(self.config.deadband_deg);

        let session = Session {
            vision: Arc::clone(&self.vision),
            bus: Arc::clone(&self.bus),
            config: self.config.clone(),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            model,
            filter,
            timing,
        };

        let (opened_tx, opened_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let running = Arc::clone(&self.running);

        self.stats.reset();
        self.running.store(true, Ordering::SeqCst);
        let thread = thread::Builder::new()
            .name("mirror-loop".into())
            .spawn(move || {
                let _done = DoneGuard { done: done_tx, running };
                session.run(camera_index, &opened_tx);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::SensorUnavailable(format!("Failed to spawn mirror thread: {e}"))
            })?;

        let opened = opened_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::SensorUnavailable("Mirror thread exited during startup".into())));
        match opened {
            Ok(()) => {
                info!("Mirroring started on camera {camera_index}");
                *worker = Some(Worker {
                    thread,
                    done: done_rx,
                    stop_timeout,
                });
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                Err(e)
            }
        }
    }

    /// Signal the loop to exit and wait, bounded, for it to release the camera
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.running.store(false, Ordering::SeqCst);
        let Some(Worker {
            thread,
            done,
            stop_timeout: timeout,
        }) = worker.take()
        else {
            return;
        };

        match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                info!("Mirroring stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Mirror thread did not exit within {timeout:?}, detaching it");
            }
        }
    }
}

impl Drop for MirrorLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the loop thread owns for one session
struct Session {
    vision: Arc<dyn VisionBackend>,
    bus: Arc<MotionBus>,
    config: MirrorConfig,
    running: Arc<AtomicBool>,
    stats: Arc<MirrorStats>,
    model: FaceModel,
    filter: PoseFilter,
    timing: Timing,
}

impl Session {
    fn run(mut self, camera_index: i32, opened: &Sender<Result<()>>) {
        let setup = self
            .vision
            .open_camera(camera_index)
            .and_then(|camera| Ok((camera, self.vision.landmark_detector()?)));
        let (mut camera, mut detector) = match setup {
            Ok(parts) => {
                let _ = opened.send(Ok(()));
                parts
            }
            Err(e) => {
                warn!("Mirroring could not start: {e}");
                let _ = opened.send(Err(e));
                return;
            }
        };

        let estimator = PoseEstimator::new(self.model.clone(), detector.scheme(), self.config.flip_horizontal)
            .with_max_reprojection_error(self.config.max_reprojection_error);
        let Timing {
            frame_sleep,
            skip_sleep,
            capture_retry: retry_sleep,
            dispatch,
        } = self.timing;

        let mut frame_count: u64 = 0;
        while self.running.load(Ordering::SeqCst) {
            let frame = match camera.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Frame capture failed: {e}");
                    MirrorStats::bump(&self.stats.capture_failures);
                    thread::sleep(retry_sleep);
                    continue;
                }
            };
            MirrorStats::bump(&self.stats.frames_captured);

            frame_count += 1;
            if frame_count % 2 != 0 {
                thread::sleep(skip_sleep);
                continue;
            }

            MirrorStats::bump(&self.stats.frames_processed);
            self.process(&frame, detector.as_mut(), &estimator, dispatch);
            thread::sleep(frame_sleep);
        }

        debug!("Mirror loop exiting after {frame_count} frames");
    }

    fn process(&mut self, frame: &Frame, detector: &mut dyn LandmarkDetector, estimator: &PoseEstimator, dispatch: Duration) {
        let landmarks = match detector.detect(frame) {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => return,
            Err(e) => {
                warn!("Landmark detection failed: {e}");
                return;
            }
        };
        MirrorStats::bump(&self.stats.faces_detected);

        let Some(raw) = estimator.estimate(&landmarks, frame.width(), frame.height()) else {
            return;
        };
        MirrorStats::bump(&self.stats.poses_estimated);

        self.filter.calibrate_if_needed(raw);
        let pose = self.filter.update(raw);
        match self.bus.dispatch(&JointTarget::head(pose, dispatch)) {
            Ok(_) => MirrorStats::bump(&self.stats.dispatches),
            Err(e) => {
                debug!("Mirror dispatch failed: {e}");
                MirrorStats::bump(&self.stats.dispatch_failures);
            }
        }
    }
}
