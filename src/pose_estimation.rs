use crate::{
    constants::{
        CAMERA_CENTER_FACTOR, DEFAULT_MAX_REPROJECTION_ERROR, EPSILON, FACE_MODEL_MM, MIN_PNP_POINTS,
        NUM_KEY_LANDMARKS, PNP_MAX_ITERATIONS,
    },
    landmarks::{FaceLandmarks, LandmarkScheme},
    motion::HeadPose,
    Error, Result,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Matrix2, Rotation3, Vector2, Vector3, Vector6};
use std::fs;
use std::path::Path;

/// Pinhole camera intrinsics without lens distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length along x in pixels
    pub fx: f64,
    /// Focal length along y in pixels
    pub fy: f64,
    /// Principal point x
    pub cx: f64,
    /// Principal point y
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Approximate intrinsics for a frame: focal length equal to the width,
    /// principal point at the center
    #[must_use]
    pub fn for_frame(width: u32, height: u32) -> Self {
        let focal_length = f64::from(width);
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: f64::from(width) / CAMERA_CENTER_FACTOR,
            cy: f64::from(height) / CAMERA_CENTER_FACTOR,
        }
    }

    /// Project a camera-space point; `None` if it is not in front of the camera
    #[must_use]
    pub fn project(&self, point: &Vector3<f64>) -> Option<[f64; 2]> {
        if point.z <= EPSILON {
            return None;
        }
        Some([
            self.fx * point.x / point.z + self.cx,
            self.fy * point.y / point.z + self.cy,
        ])
    }
}

/// Rigid 3-D face model expressed in camera axes (x right, y down, z forward)
#[derive(Debug, Clone, PartialEq)]
pub struct FaceModel {
    points: Vec<Vector3<f64>>,
}

impl Default for FaceModel {
    fn default() -> Self {
        Self::from_points_mm(&FACE_MODEL_MM)
    }
}

impl FaceModel {
    /// Build from y-up, z-out-of-face millimetre coordinates.
    ///
    /// The points are turned half a revolution about x so that a face
    /// looking straight into the camera solves to the identity rotation.
    #[must_use]
    pub fn from_points_mm(points: &[[f64; 3]]) -> Self {
        Self {
            points: points.iter().map(|&[x, y, z]| Vector3::new(x, -y, -z)).collect(),
        }
    }

    /// Load a model from a text file with one coordinate per line
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold exactly
    /// six points
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading face model from {}", path.as_ref().display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let values: Vec<f64> = content
            .lines()
            .filter_map(|line| line.trim().parse::<f64>().ok())
            .collect();

        let expected = NUM_KEY_LANDMARKS * 3;
        if values.len() != expected {
            return Err(Error::InvalidInput(format!(
                "Expected {expected} coordinate values ({NUM_KEY_LANDMARKS} points x 3), got {}",
                values.len()
            )));
        }

        let points: Vec<[f64; 3]> = values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Ok(Self::from_points_mm(&points))
    }

    /// Model points in camera axes
    #[must_use]
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    /// Project the model posed by `rotation` and `translation`
    #[must_use]
    pub fn project(
        &self,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
        camera: &CameraIntrinsics,
    ) -> Option<Vec<[f64; 2]>> {
        self.points
            .iter()
            .map(|p| camera.project(&(rotation * p + translation)))
            .collect()
    }
}

/// Result of a perspective-n-point solve
#[derive(Debug, Clone, PartialEq)]
pub struct PnpSolution {
    /// Rotation taking model axes to camera axes
    pub rotation: Rotation3<f64>,
    /// Model origin in camera space (millimetres)
    pub translation: Vector3<f64>,
    /// Root-mean-square reprojection error in pixels
    pub rms_error: f64,
    /// Levenberg-Marquardt iterations used
    pub iterations: usize,
}

fn pose_from_params(params: &Vector6<f64>) -> (Rotation3<f64>, Vector3<f64>) {
    (
        Rotation3::new(Vector3::new(params[0], params[1], params[2])),
        Vector3::new(params[3], params[4], params[5]),
    )
}

fn reprojection_residuals(
    params: &Vector6<f64>,
    model: &[Vector3<f64>],
    image: &[[f64; 2]],
    camera: &CameraIntrinsics,
) -> Option<DVector<f64>> {
    let (rotation, translation) = pose_from_params(params);
    let mut residuals = DVector::zeros(model.len() * 2);
    for (i, (point, observed)) in model.iter().zip(image).enumerate() {
        let [u, v] = camera.project(&(rotation * point + translation))?;
        residuals[2 * i] = u - observed[0];
        residuals[2 * i + 1] = v - observed[1];
    }
    Some(residuals)
}

fn numeric_jacobian(
    params: &Vector6<f64>,
    model: &[Vector3<f64>],
    image: &[[f64; 2]],
    camera: &CameraIntrinsics,
) -> Option<DMatrix<f64>> {
    let mut jacobian = DMatrix::zeros(model.len() * 2, 6);
    for j in 0..6 {
        let step = 1e-6 * params[j].abs().max(1.0);
        let mut forward = *params;
        let mut backward = *params;
        forward[j] += step;
        backward[j] -= step;
        let r_fwd = reprojection_residuals(&forward, model, image, camera)?;
        let r_bwd = reprojection_residuals(&backward, model, image, camera)?;
        jacobian.set_column(j, &((r_fwd - r_bwd) / (2.0 * step)));
    }
    Some(jacobian)
}

/// Reject point sets that cannot constrain a pose
fn check_geometry(image: &[[f64; 2]]) -> Result<(Vector2<f64>, f64)> {
    let n = image.len() as f64;
    let centroid = image
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + Vector2::new(p[0], p[1]))
        / n;

    let mut scatter = Matrix2::zeros();
    for p in image {
        let d = Vector2::new(p[0], p[1]) - centroid;
        scatter += d * d.transpose();
    }
    scatter /= n;

    let spread = scatter.trace().sqrt();
    if !spread.is_finite() || spread < 1e-6 {
        return Err(Error::Estimation("Landmarks collapse to a single point".to_string()));
    }

    let eigen = scatter.symmetric_eigenvalues();
    let (lo, hi) = (eigen.min(), eigen.max());
    if lo <= hi * 1e-6 {
        return Err(Error::Estimation("Landmarks are collinear".to_string()));
    }

    Ok((centroid, spread))
}

/// Initial pose: facing the camera, at the depth that matches the image spread
fn initial_guess(model: &[Vector3<f64>], centroid: Vector2<f64>, spread: f64, camera: &CameraIntrinsics) -> Vector6<f64> {
    let n = model.len() as f64;
    let model_centroid = model.iter().fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p) / n;
    let model_spread = (model
        .iter()
        .map(|p| (p.xy() - model_centroid.xy()).norm_squared())
        .sum::<f64>()
        / n)
        .sqrt();

    let depth = camera.fx * model_spread / spread;
    let tx = (centroid.x - camera.cx) * depth / camera.fx - model_centroid.x;
    let ty = (centroid.y - camera.cy) * depth / camera.fy - model_centroid.y;
    Vector6::new(0.0, 0.0, 0.0, tx, ty, depth - model_centroid.z)
}

/// Solve the perspective-n-point problem with Levenberg-Marquardt
///
/// # Errors
///
/// Returns [`Error::Estimation`] if there are too few points, the geometry is
/// degenerate, or the normal equations become ill-conditioned
pub fn solve_pnp(model: &[Vector3<f64>], image: &[[f64; 2]], camera: &CameraIntrinsics) -> Result<PnpSolution> {
    if model.len() != image.len() {
        return Err(Error::InvalidInput(format!(
            "Model has {} points but {} image points were given",
            model.len(),
            image.len()
        )));
    }
    if image.len() < MIN_PNP_POINTS {
        return Err(Error::Estimation(format!(
            "Need at least {MIN_PNP_POINTS} points, got {}",
            image.len()
        )));
    }
    if image.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::Estimation("Non-finite landmark coordinate".to_string()));
    }

    let (centroid, spread) = check_geometry(image)?;
    let mut params = initial_guess(model, centroid, spread, camera);
    let mut residuals = reprojection_residuals(&params, model, image, camera)
        .ok_or_else(|| Error::Estimation("Initial guess places the face behind the camera".to_string()))?;
    let mut cost = residuals.norm_squared();
    let mut lambda = 1e-3;
    let mut iterations = 0;

    while iterations < PNP_MAX_ITERATIONS {
        iterations += 1;
        let jacobian = numeric_jacobian(&params, model, image, camera)
            .ok_or_else(|| Error::Estimation("Pose left the camera frustum".to_string()))?;
        let jtj = jacobian.tr_mul(&jacobian);
        let gradient = jacobian.tr_mul(&residuals);
        if gradient.amax() < 1e-12 {
            break;
        }

        let mut accepted = None;
        while lambda < 1e12 {
            let mut damped = jtj.clone();
            for i in 0..6 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(EPSILON);
            }
            let Some(cholesky) = damped.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let step = cholesky.solve(&(-gradient.clone()));
            let candidate = params + Vector6::from_iterator(step.iter().copied());
            match reprojection_residuals(&candidate, model, image, camera) {
                Some(r) if r.norm_squared() < cost => {
                    accepted = Some((candidate, r, step.norm()));
                    lambda = (lambda / 10.0).max(1e-12);
                    break;
                }
                _ => lambda *= 10.0,
            }
        }

        let Some((candidate, r, step_norm)) = accepted else {
            // No damping reduces the cost: a minimum
            break;
        };
        let previous_cost = cost;
        params = candidate;
        cost = r.norm_squared();
        residuals = r;

        if step_norm < 1e-10 * (params.norm() + 1e-10) || previous_cost - cost < 1e-14 * previous_cost.max(1.0) {
            break;
        }
    }

    let rms_error = (cost / image.len() as f64).sqrt();
    if !rms_error.is_finite() || params.iter().any(|v| !v.is_finite()) {
        return Err(Error::Estimation("Solver diverged".to_string()));
    }

    let (rotation, translation) = pose_from_params(&params);
    Ok(PnpSolution {
        rotation,
        translation,
        rms_error,
        iterations,
    })
}

/// Convert a rotation matrix to `[pitch, yaw, roll]` in degrees, for
/// `R = Ry(yaw) * Rx(pitch) * Rz(roll)` in camera axes
#[must_use]
pub fn rotation_to_euler(rotation: &Rotation3<f64>) -> [f64; 3] {
    let m = rotation.matrix();
    let pitch = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
    let yaw = m[(0, 2)].atan2(m[(2, 2)]);
    let roll = m[(1, 0)].atan2(m[(1, 1)]);
    [pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees()]
}

/// Inverse of [`rotation_to_euler`]
#[must_use]
pub fn euler_to_rotation(pitch_deg: f64, yaw_deg: f64, roll_deg: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), yaw_deg.to_radians())
        * Rotation3::from_axis_angle(&Vector3::x_axis(), pitch_deg.to_radians())
        * Rotation3::from_axis_angle(&Vector3::z_axis(), roll_deg.to_radians())
}

/// Camera-space rotation for a head pose; [`HeadPose`] pitch is positive
/// when the face tilts up, the camera x rotation is positive downwards.
#[must_use]
pub fn rotation_for_pose(pose: &HeadPose) -> Rotation3<f64> {
    euler_to_rotation(-pose.pitch, pose.yaw, pose.roll)
}

/// Head pose estimator using the `PnP` algorithm on six key landmarks
pub struct PoseEstimator {
    model: FaceModel,
    scheme: LandmarkScheme,
    mirrored: bool,
    max_reprojection_error: f64,
}

impl PoseEstimator {
    /// Create an estimator for a landmark scheme
    #[must_use]
    pub fn new(model: FaceModel, scheme: LandmarkScheme, mirrored: bool) -> Self {
        Self {
            model,
            scheme,
            mirrored,
            max_reprojection_error: DEFAULT_MAX_REPROJECTION_ERROR,
        }
    }

    /// Reject solves whose RMS reprojection error exceeds `pixels`
    #[must_use]
    pub fn with_max_reprojection_error(mut self, pixels: f64) -> Self {
        self.max_reprojection_error = pixels;
        self
    }

    /// The rigid model used for solving
    #[must_use]
    pub fn model(&self) -> &FaceModel {
        &self.model
    }

    /// Estimate pose from detector landmarks; `None` when no pose can be solved
    #[must_use]
    pub fn estimate(&self, landmarks: &FaceLandmarks, width: u32, height: u32) -> Option<HeadPose> {
        let view = if self.mirrored {
            landmarks.mirrored()
        } else {
            landmarks.clone()
        };
        let Some(points) = view.select_pixels(&self.scheme.key_indices(self.mirrored), width, height) else {
            debug!("Detector returned {} landmarks, key points missing", landmarks.len());
            return None;
        };

        match self.estimate_from_points(&points, width, height) {
            Ok(pose) => Some(pose),
            Err(e) => {
                debug!("No pose this frame: {e}");
                None
            }
        }
    }

    /// Estimate pose from the six key points in pixel coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the solve fails or its reprojection error is too large
    pub fn estimate_from_points(&self, points: &[[f64; 2]], width: u32, height: u32) -> Result<HeadPose> {
        let camera = CameraIntrinsics::for_frame(width, height);
        let solution = solve_pnp(self.model.points(), points, &camera)?;
        if solution.rms_error > self.max_reprojection_error {
            return Err(Error::Estimation(format!(
                "Reprojection error {:.1}px exceeds {:.1}px",
                solution.rms_error, self.max_reprojection_error
            )));
        }

        let [pitch, yaw, roll] = rotation_to_euler(&solution.rotation);
        Ok(HeadPose::new(-pitch, yaw, roll))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_points(pose: &HeadPose, translation: Vector3<f64>, width: u32, height: u32) -> Vec<[f64; 2]> {
        FaceModel::default()
            .project(&rotation_for_pose(pose), &translation, &CameraIntrinsics::for_frame(width, height))
            .unwrap()
    }

    #[test]
    fn test_euler_angle_conversion() {
        let angles = rotation_to_euler(&Rotation3::identity());
        assert!(angles.iter().all(|a| a.abs() < 1e-9));

        let rotation = euler_to_rotation(12.0, -25.0, 7.5);
        let [pitch, yaw, roll] = rotation_to_euler(&rotation);
        assert!((pitch - 12.0).abs() < 1e-9);
        assert!((yaw + 25.0).abs() < 1e-9);
        assert!((roll - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_solve_recovers_synthetic_pose() {
        let truth = HeadPose::new(10.0, -15.0, 5.0);
        let translation = Vector3::new(30.0, -20.0, 1500.0);
        let points = synthetic_points(&truth, translation, 640, 480);

        let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, false);
        let pose = estimator.estimate_from_points(&points, 640, 480).unwrap();

        assert!((pose.pitch - truth.pitch).abs() < 1e-3, "pitch {}", pose.pitch);
        assert!((pose.yaw - truth.yaw).abs() < 1e-3, "yaw {}", pose.yaw);
        assert!((pose.roll - truth.roll).abs() < 1e-3, "roll {}", pose.roll);
    }

    #[test]
    fn test_frontal_face_is_neutral() {
        let points = synthetic_points(&HeadPose::ZERO, Vector3::new(0.0, 0.0, 1200.0), 480, 360);
        let camera = CameraIntrinsics::for_frame(480, 360);
        let solution = solve_pnp(FaceModel::default().points(), &points, &camera).unwrap();

        assert!(solution.rms_error < 1e-4);
        assert!((solution.translation.z - 1200.0).abs() < 1e-3);
        assert!(rotation_to_euler(&solution.rotation).iter().all(|a| a.abs() < 1e-3));
    }

    #[test]
    fn test_too_few_points_fails() {
        let camera = CameraIntrinsics::for_frame(640, 480);
        let full = FaceModel::default();
        let model = &full.points()[..3];
        let image = [[1.0, 2.0], [30.0, 4.0], [5.0, 60.0]];
        assert!(matches!(solve_pnp(model, &image, &camera), Err(Error::Estimation(_))));
    }

    #[test]
    fn test_degenerate_geometry_fails() {
        let camera = CameraIntrinsics::for_frame(640, 480);
        let model = FaceModel::default();

        let same_point = [[100.0, 100.0]; 6];
        assert!(solve_pnp(model.points(), &same_point, &camera).is_err());

        let collinear: Vec<[f64; 2]> = (0..6).map(|i| [10.0 * f64::from(i), 5.0 * f64::from(i)]).collect();
        assert!(solve_pnp(model.points(), &collinear, &camera).is_err());

        let mut with_nan = synthetic_points(&HeadPose::ZERO, Vector3::new(0.0, 0.0, 1200.0), 640, 480);
        with_nan[2][0] = f64::NAN;
        assert!(solve_pnp(model.points(), &with_nan, &camera).is_err());
    }

    #[test]
    fn test_estimate_uses_scheme_indices_and_mirroring() {
        let truth = HeadPose::new(-6.0, 12.0, -4.0);
        let (width, height) = (640, 480);
        let key_px = synthetic_points(&truth, Vector3::new(0.0, 0.0, 1400.0), width, height);

        // Place the key points where a mirrored 68-point detector would report them
        let scheme = LandmarkScheme::Ibug68;
        let mut raw = vec![[0.5, 0.5]; scheme.landmark_count()];
        for (slot, &[x, y]) in scheme.key_indices(true).iter().zip(&key_px) {
            raw[*slot] = [1.0 - x / f64::from(width), y / f64::from(height)];
        }

        let estimator = PoseEstimator::new(FaceModel::default(), scheme, true);
        let pose = estimator.estimate(&FaceLandmarks::new(raw), width, height).unwrap();
        assert!((pose.pitch - truth.pitch).abs() < 1e-3);
        assert!((pose.yaw - truth.yaw).abs() < 1e-3);
        assert!((pose.roll - truth.roll).abs() < 1e-3);
    }

    #[test]
    fn test_estimate_without_key_points_is_none() {
        let estimator = PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, false);
        let marks = FaceLandmarks::new(vec![[0.5, 0.5]; 10]);
        assert!(estimator.estimate(&marks, 640, 480).is_none());
    }

    #[test]
    fn test_reprojection_bound_rejects_noisy_points() {
        let mut points = synthetic_points(&HeadPose::ZERO, Vector3::new(0.0, 0.0, 1200.0), 640, 480);
        points[1][1] += 200.0;
        let estimator =
            PoseEstimator::new(FaceModel::default(), LandmarkScheme::FaceMesh, false).with_max_reprojection_error(1.0);
        assert!(estimator.estimate_from_points(&points, 640, 480).is_err());
    }

    #[test]
    fn test_parse_face_model() {
        let values: Vec<String> = FACE_MODEL_MM.iter().flatten().map(|v| format!("{v}")).collect();
        let model = FaceModel::parse(&values.join("\n")).unwrap();
        assert_eq!(model, FaceModel::default());

        assert!(FaceModel::parse("1.0\n2.0\n3.0").is_err());
        assert!(FaceModel::parse("").is_err());
    }
}
