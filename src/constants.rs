//! Constants used throughout the application

/// Number of key landmarks used by the PnP solve
pub const NUM_KEY_LANDMARKS: usize = 6;

/// Rigid face model in millimetres, y up and z out of the face:
/// nose tip, chin, image-left eye corner, image-right eye corner,
/// image-left mouth corner, image-right mouth corner.
pub const FACE_MODEL_MM: [[f64; 3]; NUM_KEY_LANDMARKS] = [
    [0.0, 0.0, 0.0],
    [0.0, -330.0, -65.0],
    [-225.0, 170.0, -135.0],
    [225.0, 170.0, -135.0],
    [-150.0, -150.0, -125.0],
    [150.0, -150.0, -125.0],
];

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Minimum number of correspondences accepted by the PnP solver
pub const MIN_PNP_POINTS: usize = 4;

/// Levenberg-Marquardt iteration cap
pub const PNP_MAX_ITERATIONS: usize = 100;

/// Default RMS reprojection error (pixels) above which a solve is rejected
pub const DEFAULT_MAX_REPROJECTION_ERROR: f64 = 30.0;

/// Default exponential smoothing factor (weight on the previous value)
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.25;

/// Default deadband half-width in degrees
pub const DEFAULT_DEADBAND_DEG: f64 = 1.5;

/// Default head limits in degrees
pub const DEFAULT_PITCH_LIMIT_DEG: f64 = 20.0;
pub const DEFAULT_ROLL_LIMIT_DEG: f64 = 30.0;
pub const DEFAULT_YAW_LIMIT_DEG: f64 = 40.0;
pub const DEFAULT_ANTENNA_LIMIT_DEG: f64 = 80.0;

/// Mirror loop timing
pub const DEFAULT_MIRROR_DISPATCH_SECS: f64 = 0.1;
pub const DEFAULT_MIRROR_FRAME_SLEEP_SECS: f64 = 0.01;
pub const DEFAULT_MIRROR_SKIP_SLEEP_SECS: f64 = 0.005;
pub const DEFAULT_CAPTURE_RETRY_SECS: f64 = 0.01;
pub const DEFAULT_STOP_TIMEOUT_SECS: f64 = 1.0;

/// Speech animator motion law
pub const DEFAULT_ANIMATOR_TICK_SECS: f64 = 0.1;
pub const DEFAULT_ANIMATOR_PHASE_STEP: f64 = 0.18;
pub const DEFAULT_ANIMATOR_SETTLE_SECS: f64 = 0.3;

/// Speech listener defaults
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_CHUNK_SIZE: usize = 2048;
pub const DEFAULT_LISTEN_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_LISTEN_POLL_SECS: f64 = 0.5;
pub const DEFAULT_VOICE_THRESHOLD: f64 = 0.001;
pub const DEFAULT_TRAILING_SILENCE_SECS: f64 = 2.5;

/// Full-scale value of 16-bit PCM
pub const PCM_FULL_SCALE: f32 = 32767.0;

/// Conversation defaults
pub const DEFAULT_MAX_HISTORY: usize = 20;
pub const DEFAULT_APOLOGY: &str = "Having trouble thinking. Try again?";

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
