//! Error types for the expressive head library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[cfg(feature = "camera")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request to an upstream service failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Camera or microphone could not be opened
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// A single frame or audio chunk could not be captured
    #[error("Capture error: {0}")]
    Capture(String),

    /// The perspective-n-point solve did not produce a usable pose
    #[error("Pose estimation error: {0}")]
    Estimation(String),

    /// Landmark detection failed on a frame
    #[error("Landmark detection error: {0}")]
    Detection(String),

    /// The actuator rejected a command
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Chat, transcription or synthesis service failed
    #[error("Service error: {0}")]
    Service(String),

    /// Audio device or encoding error
    #[error("Audio error: {0}")]
    Audio(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failure reported by an actuator for a single command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    /// The robot is not connected or still booting
    #[error("device not ready: {0}")]
    NotReady(String),

    /// The device refused a target outside its own range
    #[error("target out of range: {0}")]
    OutOfRange(String),

    /// Transport or device-side failure
    #[error("device failure: {0}")]
    Device(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
