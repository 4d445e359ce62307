//! Stand-ins for camera, detector and speaker when running without hardware.

use crate::{
    audio::{AudioPlayer, SpeechAudio},
    landmarks::{FaceLandmarks, Frame, LandmarkDetector, LandmarkScheme},
    mirror::{FrameSource, VisionBackend},
    motion::HeadPose,
    pose_estimation::{rotation_for_pose, CameraIntrinsics, FaceModel},
    services::SpeechSynthesizer,
    Error, Result,
};
use log::{debug, info};
use nalgebra::Vector3;
use std::thread;
use std::time::{Duration, Instant};

/// Depth of the synthetic face in millimetres
const FACE_DISTANCE_MM: f64 = 1500.0;

/// Simulated frame period
const FRAME_PERIOD_SECS: f64 = 1.0 / 30.0;

/// Pose of the synthetic face at `t` seconds: a slow drift on every axis
#[must_use]
pub fn drifting_pose(t: f64) -> HeadPose {
    HeadPose::new(8.0 * (0.5 * t).sin(), 15.0 * (0.3 * t).sin(), 5.0 * (0.7 * t).sin())
}

/// Blank frames at a fixed size
pub struct SyntheticCamera {
    width: u32,
    height: u32,
}

impl FrameSource for SyntheticCamera {
    fn read_frame(&mut self) -> Result<Frame> {
        Ok(Frame::new(self.width, self.height))
    }
}

/// Landmark detector that reports a face whose pose follows [`drifting_pose`]
pub struct SyntheticFaceDetector {
    model: FaceModel,
    frames: u64,
}

impl SyntheticFaceDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: FaceModel::default(),
            frames: 0,
        }
    }

    /// Landmarks for `pose` as seen in a `width` x `height` frame
    #[must_use]
    pub fn landmarks_for(&self, pose: &HeadPose, width: u32, height: u32) -> Option<FaceLandmarks> {
        let scheme = LandmarkScheme::FaceMesh;
        let camera = CameraIntrinsics::for_frame(width, height);
        let translation = Vector3::new(0.0, 0.0, FACE_DISTANCE_MM);
        let key_points = self.model.project(&rotation_for_pose(pose), &translation, &camera)?;

        let center = [f64::from(width) / 2.0, f64::from(height) / 2.0];
        let mut pixels = vec![center; scheme.landmark_count()];
        for (&index, point) in scheme.key_indices(false).iter().zip(key_points) {
            pixels[index] = point;
        }
        Some(FaceLandmarks::from_pixels(&pixels, width, height))
    }
}

impl Default for SyntheticFaceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LandmarkDetector for SyntheticFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>> {
        let t = self.frames as f64 * FRAME_PERIOD_SECS;
        self.frames += 1;
        Ok(self.landmarks_for(&drifting_pose(t), frame.width(), frame.height()))
    }

    fn scheme(&self) -> LandmarkScheme {
        LandmarkScheme::FaceMesh
    }
}

/// Vision backend made of [`SyntheticCamera`] and [`SyntheticFaceDetector`]
pub struct SyntheticVision {
    width: u32,
    height: u32,
    available: bool,
}

impl SyntheticVision {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            available: true,
        }
    }

    /// A backend whose camera never opens
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(320, 240)
        }
    }
}

impl VisionBackend for SyntheticVision {
    fn open_camera(&self, index: i32) -> Result<Box<dyn FrameSource>> {
        if !self.available {
            return Err(Error::SensorUnavailable(format!("simulated camera {index} is unplugged")));
        }
        info!("Simulated camera {index} open at {}x{}", self.width, self.height);
        Ok(Box::new(SyntheticCamera {
            width: self.width,
            height: self.height,
        }))
    }

    fn landmark_detector(&self) -> Result<Box<dyn LandmarkDetector>> {
        Ok(Box::new(SyntheticFaceDetector::new()))
    }
}

/// Speech whose length is estimated from the word count; no audio is produced
pub struct EstimatedSpeech {
    words_per_minute: f64,
    sample_rate: u32,
}

impl EstimatedSpeech {
    #[must_use]
    pub fn new(words_per_minute: f64, sample_rate: u32) -> Self {
        Self {
            words_per_minute,
            sample_rate,
        }
    }

    /// Estimated speaking time for `text`
    #[must_use]
    pub fn estimate(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count();
        if words == 0 || self.words_per_minute <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(words as f64 * 60.0 / self.words_per_minute)
    }
}

impl SpeechSynthesizer for EstimatedSpeech {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        let duration = self.estimate(text);
        debug!("Simulated speech: {:.2}s", duration.as_secs_f64());
        Ok(SpeechAudio::silent(duration, self.sample_rate))
    }
}

/// Player that takes as long as the audio would, without making a sound
#[derive(Debug, Default)]
pub struct SilentPlayer;

impl AudioPlayer for SilentPlayer {
    fn play(&self, audio: &SpeechAudio) -> Result<()> {
        let start = Instant::now();
        thread::sleep(audio.duration);
        debug!("Silent playback for {:.2}s", start.elapsed().as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose_estimation::PoseEstimator;

    #[test]
    fn test_synthetic_landmarks_recover_pose() {
        let detector = SyntheticFaceDetector::new();
        let pose = drifting_pose(4.2);
        let marks = detector.landmarks_for(&pose, 320, 240).unwrap();
        assert_eq!(marks.len(), 468);

        let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, false);
        let estimated = estimator.estimate(&marks, 320, 240).unwrap();
        assert!((estimated.pitch - pose.pitch).abs() < 1e-3);
        assert!((estimated.yaw - pose.yaw).abs() < 1e-3);
        assert!((estimated.roll - pose.roll).abs() < 1e-3);
    }

    #[test]
    fn test_mirrored_view_negates_yaw_and_roll() {
        let detector = SyntheticFaceDetector::new();
        let pose = HeadPose::new(6.0, 12.0, -4.0);
        let marks = detector.landmarks_for(&pose, 320, 240).unwrap();

        let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, true);
        let mirrored = estimator.estimate(&marks, 320, 240).unwrap();
        assert!((mirrored.pitch - 6.0).abs() < 1e-3);
        assert!((mirrored.yaw + 12.0).abs() < 1e-3);
        assert!((mirrored.roll - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_speech_estimate() {
        let speech = EstimatedSpeech::new(120.0, 24_000);
        assert_eq!(speech.estimate("one two three four"), Duration::from_secs(2));
        assert_eq!(speech.estimate("   "), Duration::ZERO);

        let audio = speech.synthesize("hello there").unwrap();
        assert!(audio.pcm.samples.is_empty());
        assert_eq!(audio.duration, Duration::from_secs(1));
    }

    #[test]
    fn test_unavailable_camera() {
        assert!(matches!(
            SyntheticVision::unavailable().open_camera(0),
            Err(Error::SensorUnavailable(_))
        ));
    }
}
