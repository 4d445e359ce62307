//! Pose and joint target types shared by every motion producer.
//!
//! Angles are degrees everywhere in this module. Conversion to the radians
//! the robot expects for its antennas happens at the actuator boundary.

use serde::{Deserialize, Serialize};
use std::ops::Sub;
use std::time::Duration;

/// Head orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    /// Rotation about the lateral axis
    pub pitch: f64,
    /// Rotation about the vertical axis
    pub yaw: f64,
    /// Rotation about the viewing axis
    pub roll: f64,
}

impl HeadPose {
    /// The neutral pose
    pub const ZERO: Self = Self {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    /// Create a pose from pitch, yaw and roll in degrees
    #[must_use]
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// True when every axis is a finite number
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }

    /// Apply `f` to every axis
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            pitch: f(self.pitch),
            yaw: f(self.yaw),
            roll: f(self.roll),
        }
    }
}

impl Sub for HeadPose {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            pitch: self.pitch - rhs.pitch,
            yaw: self.yaw - rhs.yaw,
            roll: self.roll - rhs.roll,
        }
    }
}

/// The atomic unit of motion sent to the actuator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTarget {
    /// Head yaw in degrees
    pub yaw: f64,
    /// Head pitch in degrees
    pub pitch: f64,
    /// Head roll in degrees
    pub roll: f64,
    /// Left and right antenna angles in degrees; `None` leaves them in place
    pub antennas: Option<[f64; 2]>,
    /// Time the actuator takes to reach the target
    pub duration: Duration,
}

impl JointTarget {
    /// Full target with head and antennas
    #[must_use]
    pub const fn new(yaw: f64, pitch: f64, roll: f64, antenna_left: f64, antenna_right: f64, duration: Duration) -> Self {
        Self {
            yaw,
            pitch,
            roll,
            antennas: Some([antenna_left, antenna_right]),
            duration,
        }
    }

    /// Head-only target that leaves the antennas where they are
    #[must_use]
    pub const fn head(pose: HeadPose, duration: Duration) -> Self {
        Self {
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            antennas: None,
            duration,
        }
    }

    /// All joints at zero
    #[must_use]
    pub const fn neutral(duration: Duration) -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0, duration)
    }

    /// Head part of the target
    #[must_use]
    pub const fn head_pose(&self) -> HeadPose {
        HeadPose::new(self.pitch, self.yaw, self.roll)
    }

    /// True when every angle is zero
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.yaw == 0.0
            && self.pitch == 0.0
            && self.roll == 0.0
            && self.antennas.map_or(true, |[l, r]| l == 0.0 && r == 0.0)
    }
}

/// Inclusive range for one joint axis in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl AxisRange {
    /// Range from `-limit` to `limit`
    #[must_use]
    pub const fn symmetric(limit: f64) -> Self {
        Self { min: -limit, max: limit }
    }

    /// Clamp a value into the range; NaN maps to the point of the range closest to zero
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            0.0_f64.clamp(self.min, self.max)
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// True when `value` lies inside the range
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// True when the range is well formed
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Per-axis safety envelope every dispatched target must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Head pitch range
    pub pitch: AxisRange,
    /// Head yaw range
    pub yaw: AxisRange,
    /// Head roll range
    pub roll: AxisRange,
    /// Range shared by both antennas
    pub antenna: AxisRange,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_ANTENNA_LIMIT_DEG, DEFAULT_PITCH_LIMIT_DEG, DEFAULT_ROLL_LIMIT_DEG, DEFAULT_YAW_LIMIT_DEG,
        };

        Self {
            pitch: AxisRange::symmetric(DEFAULT_PITCH_LIMIT_DEG),
            yaw: AxisRange::symmetric(DEFAULT_YAW_LIMIT_DEG),
            roll: AxisRange::symmetric(DEFAULT_ROLL_LIMIT_DEG),
            antenna: AxisRange::symmetric(DEFAULT_ANTENNA_LIMIT_DEG),
        }
    }
}

impl SafetyLimits {
    /// Clamp the head axes of a pose
    #[must_use]
    pub fn clamp_pose(&self, pose: HeadPose) -> HeadPose {
        HeadPose {
            pitch: self.pitch.clamp(pose.pitch),
            yaw: self.yaw.clamp(pose.yaw),
            roll: self.roll.clamp(pose.roll),
        }
    }

    /// Clamp every angle of a target
    #[must_use]
    pub fn clamp_target(&self, target: &JointTarget) -> JointTarget {
        JointTarget {
            yaw: self.yaw.clamp(target.yaw),
            pitch: self.pitch.clamp(target.pitch),
            roll: self.roll.clamp(target.roll),
            antennas: target
                .antennas
                .map(|[l, r]| [self.antenna.clamp(l), self.antenna.clamp(r)]),
            duration: target.duration,
        }
    }

    /// True when every angle of `target` is inside the envelope
    #[must_use]
    pub fn contains(&self, target: &JointTarget) -> bool {
        self.yaw.contains(target.yaw)
            && self.pitch.contains(target.pitch)
            && self.roll.contains(target.roll)
            && target
                .antennas
                .map_or(true, |[l, r]| self.antenna.contains(l) && self.antenna.contains(r))
    }
}
