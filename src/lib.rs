//! Expressive robot head control.
//!
//! Two behaviours share one actuator:
//! - **Mirroring**: camera frames → face landmarks → `PnP` head pose →
//!   calibrated, smoothed and clamped joint targets, copied onto the robot
//! - **Conversation**: text or speech → chat reply → emotion label → a
//!   gesture script played while the reply is spoken with procedural
//!   head and antenna motion
//!
//! Every command goes through [`actuator::MotionBus`], which clamps it into
//! the configured safety envelope and serializes writers.
//!
//! # Examples
//!
//! ## Smoothing raw poses
//!
//! ```no_run
//! use expressive_head::{
//!     filters::{create_filter, PoseFilter},
//!     motion::{HeadPose, SafetyLimits},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let smoother = create_filter("exponential", 0.25)?;
//! let mut filter = PoseFilter::new(smoother, SafetyLimits::default()).with_deadband(1.5);
//!
//! // The first pose becomes the neutral offset
//! let first = HeadPose::new(5.0, 0.0, 0.0);
//! filter.calibrate_if_needed(first);
//! assert_eq!(filter.update(first), HeadPose::ZERO);
//!
//! let target = filter.update(HeadPose::new(15.0, 10.0, 0.0));
//! println!("pitch {:.1}°, yaw {:.1}°", target.pitch, target.yaw);
//! # Ok(())
//! # }
//! ```
//!
//! ## Estimating pose from landmarks
//!
//! ```no_run
//! use expressive_head::{
//!     landmarks::{Frame, LandmarkDetector},
//!     pose_estimation::{FaceModel, PoseEstimator},
//!     simulation::SyntheticFaceDetector,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut detector = SyntheticFaceDetector::new();
//! let estimator = PoseEstimator::new(FaceModel::default(), detector.scheme(), false);
//!
//! let frame = Frame::new(640, 480);
//! if let Some(landmarks) = detector.detect(&frame)? {
//!     if let Some(pose) = estimator.estimate(&landmarks, frame.width(), frame.height()) {
//!         println!("Pitch: {:.2}°, Yaw: {:.2}°, Roll: {:.2}°", pose.pitch, pose.yaw, pose.roll);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Joint targets, poses and the safety envelope
pub mod motion;

/// Actuator boundary and the shared motion bus
pub mod actuator;

/// Face landmarks and the detector boundary
pub mod landmarks;

/// Head pose estimation using `PnP`
pub mod pose_estimation;

/// Calibration, smoothing and clamping of raw poses
pub mod filters;

/// Background head-pose mirroring loop
pub mod mirror;

/// Procedural motion while speaking
pub mod animator;

/// Emotion labels and classification
pub mod emotion;

/// Gesture scripts and their player
pub mod gesture;

/// Audio buffers, capture and playback
pub mod audio;

/// Chat and speech service clients
pub mod services;

/// Chat history and the per-turn pipeline
pub mod conversation;

/// OpenCV camera and facemark detector
#[cfg(feature = "camera")]
pub mod camera;

/// Hardware-free stand-ins
pub mod simulation;

/// Interactive console
pub mod app;

/// Error types and result handling
pub mod error;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{ActuatorError, Error, Result};
