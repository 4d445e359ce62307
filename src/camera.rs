//! OpenCV camera capture and the cascade + LBF facemark landmark detector.

use crate::{
    config::MirrorConfig,
    landmarks::{FaceLandmarks, Frame, LandmarkDetector, LandmarkScheme},
    mirror::{FrameSource, VisionBackend},
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    core::{self, Mat, Point2f, Rect, Scalar, Size, Vector, CV_8UC3},
    face::{FacemarkLBF, FacemarkLBF_Params, FacemarkTrait},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::path::{Path, PathBuf};

/// Smallest face the cascade will report, in pixels
const MIN_FACE_SIZE: i32 = 60;

/// Webcam opened through `VideoCapture`
pub struct OpenCvCamera {
    capture: VideoCapture,
    bgr: Mat,
    rgb: Mat,
}

impl OpenCvCamera {
    /// Open camera `index` with the requested format
    ///
    /// # Errors
    ///
    /// Returns [`Error::SensorUnavailable`] if the device does not open
    pub fn open(index: i32, width: u32, height: u32, fps: u32) -> Result<Self> {
        info!("Opening camera {index}");
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::SensorUnavailable(format!("camera {index} could not be opened")));
        }

        // Keep only the newest frame
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
        capture.set(CAP_PROP_FRAME_WIDTH, f64::from(width))?;
        capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(height))?;
        capture.set(CAP_PROP_FPS, f64::from(fps))?;
        info!(
            "Camera {index} running at {}x{} @ {} fps",
            capture.get(CAP_PROP_FRAME_WIDTH)?,
            capture.get(CAP_PROP_FRAME_HEIGHT)?,
            capture.get(CAP_PROP_FPS)?
        );

        Ok(Self {
            capture,
            bgr: Mat::default(),
            rgb: Mat::default(),
        })
    }
}

impl FrameSource for OpenCvCamera {
    fn read_frame(&mut self) -> Result<Frame> {
        if !self.capture.read(&mut self.bgr)? || self.bgr.empty() {
            return Err(Error::Capture("camera returned no frame".into()));
        }
        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0)?;
        mat_to_frame(&self.rgb)
    }
}

fn mat_to_frame(rgb: &Mat) -> Result<Frame> {
    let width = u32::try_from(rgb.cols()).map_err(|_| Error::Capture("negative frame width".into()))?;
    let height = u32::try_from(rgb.rows()).map_err(|_| Error::Capture("negative frame height".into()))?;
    let data = if rgb.is_continuous() {
        rgb.data_bytes()?.to_vec()
    } else {
        rgb.try_clone()?.data_bytes()?.to_vec()
    };
    Frame::from_raw(width, height, data)
        .ok_or_else(|| Error::Capture(format!("frame buffer does not match {width}x{height}")))
}

fn frame_to_bgr(frame: &Frame) -> Result<Mat> {
    let rows = i32::try_from(frame.height()).map_err(|_| Error::InvalidInput("frame too tall".into()))?;
    let cols = i32::try_from(frame.width()).map_err(|_| Error::InvalidInput("frame too wide".into()))?;
    let mut rgb = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(0.0))?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());

    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// Haar cascade face detection followed by LBF facemark fitting (68 points)
pub struct FacemarkDetector {
    cascade: CascadeClassifier,
    facemark: core::Ptr<FacemarkLBF>,
}

impl FacemarkDetector {
    /// Load the cascade and the trained LBF model
    ///
    /// # Errors
    ///
    /// Returns [`Error::Detection`] if either model file is missing or unreadable
    pub fn new(cascade_path: &Path, model_path: &Path) -> Result<Self> {
        for path in [cascade_path, model_path] {
            if !path.exists() {
                return Err(Error::Detection(format!("model file not found: {}", path.display())));
            }
        }

        let cascade = CascadeClassifier::new(&cascade_path.to_string_lossy())?;
        if cascade.empty()? {
            return Err(Error::Detection(format!(
                "failed to load face cascade {}",
                cascade_path.display()
            )));
        }

        let mut facemark = FacemarkLBF::create(&FacemarkLBF_Params::default()?)?;
        facemark.load_model(&model_path.to_string_lossy())?;
        info!("Loaded facemark model {}", model_path.display());

        Ok(Self { cascade, facemark })
    }

    /// Largest detected face, if any
    fn largest_face(&mut self, bgr: &Mat) -> Result<Option<Rect>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;

        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            &equalized,
            &mut faces,
            1.1,
            3,
            0,
            Size::new(MIN_FACE_SIZE, MIN_FACE_SIZE),
            Size::new(0, 0),
        )?;
        Ok(faces.iter().max_by_key(|r| r.width * r.height))
    }
}

impl LandmarkDetector for FacemarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>> {
        let bgr = frame_to_bgr(frame)?;
        let Some(face) = self.largest_face(&bgr)? else {
            return Ok(None);
        };

        let faces = Vector::<Rect>::from_iter([face]);
        let mut fitted = Vector::<Vector<Point2f>>::new();
        if !self.facemark.fit(&bgr, &faces, &mut fitted)? {
            debug!("Facemark fit failed for face at {face:?}");
            return Ok(None);
        }

        let Some(points) = fitted.iter().next() else {
            return Ok(None);
        };
        let pixels: Vec<[f64; 2]> = points.iter().map(|p| [f64::from(p.x), f64::from(p.y)]).collect();
        if pixels.len() != LandmarkScheme::Ibug68.landmark_count() {
            warn!("Facemark returned {} points, expected 68", pixels.len());
            return Ok(None);
        }
        Ok(Some(FaceLandmarks::from_pixels(&pixels, frame.width(), frame.height())))
    }

    fn scheme(&self) -> LandmarkScheme {
        LandmarkScheme::Ibug68
    }
}

/// OpenCV camera plus [`FacemarkDetector`]
pub struct OpenCvVision {
    width: u32,
    height: u32,
    fps: u32,
    cascade: PathBuf,
    model: PathBuf,
}

impl OpenCvVision {
    #[must_use]
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            width: config.frame_width,
            height: config.frame_height,
            fps: config.fps,
            cascade: config.face_cascade.clone(),
            model: config.facemark_model.clone(),
        }
    }
}

impl VisionBackend for OpenCvVision {
    fn open_camera(&self, index: i32) -> Result<Box<dyn FrameSource>> {
        let camera = OpenCvCamera::open(index, self.width, self.height, self.fps).map_err(|e| match e {
            Error::OpenCV(cv) => Error::SensorUnavailable(format!("camera {index}: {cv}")),
            other => other,
        })?;
        Ok(Box::new(camera))
    }

    fn landmark_detector(&self) -> Result<Box<dyn LandmarkDetector>> {
        Ok(Box::new(FacemarkDetector::new(&self.cascade, &self.model)?))
    }
}
