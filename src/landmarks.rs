//! Facial landmark types and the detector boundary.

use crate::{constants::NUM_KEY_LANDMARKS, Result};
use serde::{Deserialize, Serialize};

/// An RGB camera frame
pub type Frame = image::RgbImage;

/// Indexing convention of a landmark detector's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkScheme {
    /// 468-point face mesh
    FaceMesh,
    /// 68-point iBUG annotation
    Ibug68,
}

impl LandmarkScheme {
    /// Number of landmarks a detector of this scheme produces
    #[must_use]
    pub const fn landmark_count(self) -> usize {
        match self {
            Self::FaceMesh => 468,
            Self::Ibug68 => 68,
        }
    }

    /// Indices of nose tip, chin, image-left eye corner, image-right eye corner,
    /// image-left mouth corner and image-right mouth corner.
    ///
    /// Mirroring the image swaps which side of the face lands on the left.
    #[must_use]
    pub const fn key_indices(self, mirrored: bool) -> [usize; NUM_KEY_LANDMARKS] {
        match (self, mirrored) {
            (Self::FaceMesh, false) => [1, 152, 33, 263, 61, 291],
            (Self::FaceMesh, true) => [1, 152, 263, 33, 291, 61],
            (Self::Ibug68, false) => [30, 8, 36, 45, 48, 54],
            (Self::Ibug68, true) => [30, 8, 45, 36, 54, 48],
        }
    }
}

/// One face's landmarks in normalized image coordinates (0..1), indexed by
/// the detector's stable landmark ids
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<[f64; 2]>,
}

impl FaceLandmarks {
    /// Wrap normalized points
    #[must_use]
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// Build from pixel coordinates of a `width` x `height` frame
    #[must_use]
    pub fn from_pixels(points: &[[f64; 2]], width: u32, height: u32) -> Self {
        let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));
        Self {
            points: points.iter().map(|&[x, y]| [x / w, y / h]).collect(),
        }
    }

    /// Number of landmarks
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when there are no landmarks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Normalized position of landmark `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<[f64; 2]> {
        self.points.get(index).copied()
    }

    /// The same landmarks as seen in a horizontally flipped image
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self {
            points: self.points.iter().map(|&[x, y]| [1.0 - x, y]).collect(),
        }
    }

    /// Pixel positions of the selected landmarks, or `None` if any index is missing
    #[must_use]
    pub fn select_pixels(&self, indices: &[usize], width: u32, height: u32) -> Option<Vec<[f64; 2]>> {
        let (w, h) = (f64::from(width), f64::from(height));
        indices
            .iter()
            .map(|&i| self.get(i).map(|[x, y]| [x * w, y * h]))
            .collect()
    }
}

/// Finds at most one face in a frame
pub trait LandmarkDetector: Send {
    /// Detect landmarks of the most prominent face
    ///
    /// # Errors
    ///
    /// Returns an error when inference fails on this frame; the caller skips the frame
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>>;

    /// Indexing convention of the returned landmarks
    fn scheme(&self) -> LandmarkScheme;
}
