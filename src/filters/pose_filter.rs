use super::PoseSmoother;
use crate::constants::DEFAULT_DEADBAND_DEG;
use crate::motion::{HeadPose, SafetyLimits};
use log::debug;

/// Turns raw estimator poses into robot head poses.
///
/// Per update: subtract the calibration offset, smooth, flip pitch into the
/// robot convention (positive looks down), clamp to the safety envelope and
/// zero any axis inside the deadband.
pub struct PoseFilter {
    smoother: Box<dyn PoseSmoother>,
    limits: SafetyLimits,
    deadband: f64,
    offset: Option<HeadPose>,
}

impl PoseFilter {
    /// Create an uncalibrated filter
    #[must_use]
    pub fn new(smoother: Box<dyn PoseSmoother>, limits: SafetyLimits) -> Self {
        Self {
            smoother,
            limits,
            deadband: DEFAULT_DEADBAND_DEG,
            offset: None,
        }
    }

    /// Set the deadband half-width in degrees
    #[must_use]
    pub fn with_deadband(mut self, degrees: f64) -> Self {
        self.deadband = degrees.abs();
        self
    }

    /// Neutral baseline, if captured
    #[must_use]
    pub fn offset(&self) -> Option<HeadPose> {
        self.offset
    }

    /// True once a baseline has been captured
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.offset.is_some()
    }

    /// Capture `raw` as the neutral baseline unless one is already set.
    /// Returns true if this call calibrated the filter.
    pub fn calibrate_if_needed(&mut self, raw: HeadPose) -> bool {
        if self.offset.is_some() || !raw.is_finite() {
            return false;
        }
        debug!(
            "Calibrated neutral pose: pitch={:.1} yaw={:.1} roll={:.1}",
            raw.pitch, raw.yaw, raw.roll
        );
        self.offset = Some(raw);
        true
    }

    /// Filter one raw pose into a safe robot pose
    pub fn update(&mut self, raw: HeadPose) -> HeadPose {
        let raw = raw.map(|v| if v.is_finite() { v } else { 0.0 });
        let corrected = raw - self.offset.unwrap_or(HeadPose::ZERO);
        let smoothed = self.smoother.apply(corrected);

        let robot = HeadPose {
            pitch: -smoothed.pitch,
            ..smoothed
        };
        let deadband = self.deadband;
        self.limits
            .clamp_pose(robot)
            .map(|v| if v.abs() < deadband { 0.0 } else { v })
    }

    /// Forget the baseline and the smoothing history
    pub fn reset(&mut self) {
        self.offset = None;
        self.smoother.reset();
    }

    /// Active safety envelope
    #[must_use]
    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }
}

/// Number of updates a constant input needs before exponential smoothing
/// with `factor` is within `tolerance` (relative) of it
#[must_use]
pub fn settling_steps(factor: f64, tolerance: f64) -> usize {
    if factor <= 0.0 {
        return 1;
    }
    let steps = (tolerance.ln() / factor.ln()).ceil();
    if steps.is_finite() && steps >= 1.0 {
        steps as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_SMOOTHING_FACTOR;
    use crate::filters::exponential::ExponentialFilter;

    fn default_filter() -> PoseFilter {
        PoseFilter::new(
            Box::new(ExponentialFilter::new(DEFAULT_SMOOTHING_FACTOR)),
            SafetyLimits::default(),
        )
    }

    #[test]
    fn test_first_detection_becomes_offset() {
        let mut filter = default_filter();
        let raw = HeadPose::new(5.0, 0.0, 0.0);

        assert!(filter.calibrate_if_needed(raw));
        assert_eq!(filter.offset(), Some(raw));

        let out = filter.update(raw);
        assert_eq!(out, HeadPose::ZERO);
    }

    #[test]
    fn test_calibration_is_idempotent() {
        let mut filter = default_filter();
        filter.calibrate_if_needed(HeadPose::new(3.0, -2.0, 1.0));
        assert!(!filter.calibrate_if_needed(HeadPose::new(9.0, 9.0, 9.0)));
        assert_eq!(filter.offset(), Some(HeadPose::new(3.0, -2.0, 1.0)));
    }

    #[test]
    fn test_non_finite_pose_does_not_calibrate() {
        let mut filter = default_filter();
        assert!(!filter.calibrate_if_needed(HeadPose::new(f64::NAN, 0.0, 0.0)));
        assert!(!filter.is_calibrated());

        let out = filter.update(HeadPose::new(f64::NAN, f64::INFINITY, 3.0));
        assert!(out.is_finite());
    }

    #[test]
    fn test_pitch_is_inverted() {
        let mut filter = PoseFilter::new(Box::new(crate::filters::NoFilter), SafetyLimits::default());
        let out = filter.update(HeadPose::new(10.0, 12.0, -6.0));
        assert_eq!(out, HeadPose::new(-10.0, 12.0, -6.0));
    }

    #[test]
    fn test_deadband_zeroes_small_axes() {
        let mut filter = PoseFilter::new(Box::new(crate::filters::NoFilter), SafetyLimits::default());
        let out = filter.update(HeadPose::new(1.4, -1.49, 1.5));
        assert_eq!(out.pitch, 0.0);
        assert_eq!(out.yaw, 0.0);
        assert_eq!(out.roll, 1.5);
    }

    #[test]
    fn test_clamping_to_envelope() {
        let mut filter = PoseFilter::new(Box::new(crate::filters::NoFilter), SafetyLimits::default());
        let out = filter.update(HeadPose::new(-90.0, 90.0, -90.0));
        assert_eq!(out, HeadPose::new(20.0, 40.0, -30.0));
    }

    #[test]
    fn test_constant_input_converges_monotonically() {
        let mut filter = default_filter();
        filter.calibrate_if_needed(HeadPose::ZERO);
        let target = 15.0;
        let steps = settling_steps(DEFAULT_SMOOTHING_FACTOR, 0.01);

        let mut last = 0.0;
        for _ in 0..steps {
            let yaw = filter.update(HeadPose::new(0.0, target, 0.0)).yaw;
            assert!(yaw >= last);
            last = yaw;
        }
        assert!((target - last).abs() <= target * 0.01);
    }

    #[test]
    fn test_settling_steps() {
        assert_eq!(settling_steps(0.25, 0.01), 4);
        assert_eq!(settling_steps(0.5, 0.01), 7);
        assert_eq!(settling_steps(0.0, 0.01), 1);
    }

    #[test]
    fn test_reset_clears_calibration_and_history() {
        let mut filter = default_filter();
        filter.calibrate_if_needed(HeadPose::new(4.0, 4.0, 4.0));
        filter.update(HeadPose::new(30.0, 30.0, 30.0));
        filter.reset();

        assert!(!filter.is_calibrated());
        filter.calibrate_if_needed(HeadPose::new(1.0, 1.0, 1.0));
        let out = filter.update(HeadPose::new(1.0, 1.0, 1.0));
        assert_eq!(out, HeadPose::ZERO);
    }

    #[test]
    fn test_output_within_envelope_for_random_input() {
        let mut filter = default_filter();
        let limits = SafetyLimits::default();
        filter.calibrate_if_needed(HeadPose::new(
            rand::random::<f64>() * 20.0 - 10.0,
            rand::random::<f64>() * 20.0 - 10.0,
            rand::random::<f64>() * 20.0 - 10.0,
        ));

        for _ in 0..1000 {
            let raw = HeadPose::new(
                rand::random::<f64>() * 360.0 - 180.0,
                rand::random::<f64>() * 360.0 - 180.0,
                rand::random::<f64>() * 360.0 - 180.0,
            );
            let out = filter.update(raw);
            assert!(limits.pitch.contains(out.pitch));
            assert!(limits.yaw.contains(out.yaw));
            assert!(limits.roll.contains(out.roll));
            for v in [out.pitch, out.yaw, out.roll] {
                assert!(v == 0.0 || v.abs() >= DEFAULT_DEADBAND_DEG);
            }
        }
    }
}
