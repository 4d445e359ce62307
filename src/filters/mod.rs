//! Smoothing and conditioning of raw head pose estimates.
//!
//! Raw poses from the estimator jitter from frame to frame. A
//! [`PoseSmoother`] removes the high-frequency part and the
//! [`PoseFilter`] turns the result into a safe, calibrated robot pose.

/// Exponential filter for responsive smoothing
pub mod exponential;

/// Calibration, smoothing, clamping and deadband for the mirror loop
pub mod pose_filter;

pub use pose_filter::PoseFilter;

use crate::{motion::HeadPose, Error, Result};

/// Trait for all pose smoothers
pub trait PoseSmoother: Send {
    /// Feed one pose and return the smoothed pose
    fn apply(&mut self, pose: HeadPose) -> HeadPose;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes through values unchanged
pub struct NoFilter;

impl PoseSmoother for NoFilter {
    fn apply(&mut self, pose: HeadPose) -> HeadPose {
        pose
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a pose smoother by type name
///
/// # Errors
///
/// Returns an error for an unknown type or a factor outside `[0, 1)`
pub fn create_filter(filter_type: &str, smoothing_factor: f64) -> Result<Box<dyn PoseSmoother>> {
    match filter_type.to_lowercase().as_str() {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "exponential" => {
            if !(0.0..1.0).contains(&smoothing_factor) {
                return Err(Error::InvalidInput(format!(
                    "Smoothing factor must be in [0, 1), got {smoothing_factor}"
                )));
            }
            Ok(Box::new(exponential::ExponentialFilter::new(smoothing_factor)))
        }
        _ => Err(Error::ConfigError(format!("Unknown filter type: {filter_type}"))),
    }
}
