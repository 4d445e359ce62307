use super::PoseSmoother;
use crate::motion::HeadPose;

/// Exponential smoothing filter.
///
/// `smoothed = k * previous + (1 - k) * input`, with the previous value
/// starting at the neutral pose, so the first output is pulled toward zero.
pub struct ExponentialFilter {
    factor: f64,
    previous: HeadPose,
}

impl ExponentialFilter {
    /// Create a filter; `factor` is the weight kept from the previous output
    ///
    /// # Panics
    ///
    /// Panics if `factor` is outside `[0, 1)`
    #[must_use]
    pub fn new(factor: f64) -> Self {
        assert!((0.0..1.0).contains(&factor), "Smoothing factor must be in [0, 1)");
        Self {
            factor,
            previous: HeadPose::ZERO,
        }
    }

    /// Last smoothed value
    #[must_use]
    pub fn previous(&self) -> HeadPose {
        self.previous
    }
}

impl PoseSmoother for ExponentialFilter {
    fn apply(&mut self, pose: HeadPose) -> HeadPose {
        let k = self.factor;
        let prev = self.previous;
        let smoothed = HeadPose {
            pitch: k * prev.pitch + (1.0 - k) * pose.pitch,
            yaw: k * prev.yaw + (1.0 - k) * pose.yaw,
            roll: k * prev.roll + (1.0 - k) * pose.roll,
        };
        self.previous = smoothed;
        smoothed
    }

    fn reset(&mut self) {
        self.previous = HeadPose::ZERO;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}
