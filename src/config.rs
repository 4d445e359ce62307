//! Configuration management for the expressive head application

use crate::{
    constants::*,
    gesture::{GestureLibrary, GestureStepConfig},
    motion::{AxisRange, SafetyLimits},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Joint envelope applied to every dispatched target
    pub safety: SafetyLimits,

    /// Head mirroring loop
    pub mirror: MirrorConfig,

    /// Speech animation motion law
    pub animator: AnimatorConfig,

    /// Microphone listening
    pub listener: ListenerConfig,

    /// Chat model and history
    pub conversation: ConversationConfig,

    /// Emotion classifier thresholds
    pub emotion: EmotionConfig,

    /// Speech-to-text and text-to-speech services
    pub speech: SpeechConfig,

    /// Gesture scripts replacing the built-in ones, keyed by emotion label
    pub gestures: HashMap<String, Vec<GestureStepConfig>>,
}

/// Head mirroring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Camera device index
    pub camera_index: i32,

    /// Requested capture width
    pub frame_width: u32,

    /// Requested capture height
    pub frame_height: u32,

    /// Requested capture rate
    pub fps: u32,

    /// Mirror landmarks horizontally so the robot moves like a reflection
    pub flip_horizontal: bool,

    /// Optional file with the six 3-D model points; built-in model if unset
    pub face_model: Option<PathBuf>,

    /// Smoother type: "exponential" or "none"
    pub filter: String,

    /// Weight kept from the previous smoothed pose
    pub smoothing_factor: f64,

    /// Axis values below this many degrees are sent as zero
    pub deadband_deg: f64,

    /// RMS reprojection error in pixels above which a pose is discarded
    pub max_reprojection_error: f64,

    /// Duration of each mirror target
    pub dispatch_secs: f64,

    /// Sleep after each processed frame
    pub frame_sleep_secs: f64,

    /// Sleep after each skipped frame
    pub skip_sleep_secs: f64,

    /// Wait before retrying a failed capture
    pub capture_retry_secs: f64,

    /// Bound on waiting for the loop to release the camera
    pub stop_timeout_secs: f64,

    /// Haar cascade used by the OpenCV face detector
    pub face_cascade: PathBuf,

    /// LBF facemark model used by the OpenCV landmark detector
    pub facemark_model: PathBuf,
}

/// Speech animation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// Period between targets
    pub tick_secs: f64,
    /// Phase advance per tick
    pub phase_step: f64,
    /// Duration of the final neutral target
    pub settle_secs: f64,
    pub yaw_amplitude: f64,
    pub pitch_amplitude: f64,
    pub pitch_frequency: f64,
    pub roll_amplitude: f64,
    pub roll_frequency: f64,
    /// Antenna center angle
    pub antenna_base: f64,
    pub antenna_amplitude: f64,
    pub antenna_frequency: f64,
}

/// Microphone listening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Capture rate in Hz
    pub sample_rate: u32,

    /// Samples per chunk
    pub chunk_size: usize,

    /// Chunks buffered between microphone and listener
    pub channel_capacity: usize,

    /// Give up after this long without an utterance
    pub timeout_secs: f64,

    /// Bounded wait for each chunk
    pub poll_secs: f64,

    /// RMS level (full scale = 1.0) that counts as voice
    pub voice_threshold: f64,

    /// Silence after voice that ends the utterance
    pub trailing_silence_secs: f64,

    /// Input device name; system default if unset
    pub input_device: Option<String>,
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Messages kept in history
    pub max_history: usize,

    /// Reply used when the chat service fails
    pub apology: String,

    /// Messages API endpoint
    pub api_url: String,

    /// Model name
    pub model: String,

    /// Reply length limit
    pub max_tokens: u32,

    /// Fixed system instruction
    pub system_prompt: String,

    /// HTTP timeout
    pub request_timeout_secs: f64,
}

/// Emotion classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Polarity above which text is excited
    pub excited_threshold: f64,
    /// Polarity above which text is happy
    pub happy_threshold: f64,
    /// Polarity below which text is sad
    pub sad_threshold: f64,
    /// Polarity below which text calls for empathy
    pub empathy_threshold: f64,
    /// Cached classifications per classifier instance
    pub cache_capacity: usize,
}

/// Speech service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Transcription endpoint
    pub transcription_url: String,

    /// Transcription model
    pub transcription_model: String,

    /// Spoken language hint
    pub language: Option<String>,

    /// Synthesis endpoint
    pub synthesis_url: String,

    /// Synthesis model
    pub synthesis_model: String,

    /// Synthesis voice
    pub voice: String,

    /// Sample rate of synthesized PCM
    pub output_sample_rate: u32,

    /// HTTP timeout
    pub request_timeout_secs: f64,

    /// Speaking rate assumed when speech is simulated
    pub words_per_minute: f64,

    /// Output device name; system default if unset
    pub output_device: Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frame_width: 640,
            frame_height: 480,
            fps: 30,
            flip_horizontal: true,
            face_model: None,
            filter: "exponential".to_string(),
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            deadband_deg: DEFAULT_DEADBAND_DEG,
            max_reprojection_error: DEFAULT_MAX_REPROJECTION_ERROR,
            dispatch_secs: DEFAULT_MIRROR_DISPATCH_SECS,
            frame_sleep_secs: DEFAULT_MIRROR_FRAME_SLEEP_SECS,
            skip_sleep_secs: DEFAULT_MIRROR_SKIP_SLEEP_SECS,
            capture_retry_secs: DEFAULT_CAPTURE_RETRY_SECS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            face_cascade: PathBuf::from("assets/haarcascade_frontalface_alt2.xml"),
            facemark_model: PathBuf::from("assets/lbfmodel.yaml"),
        }
    }
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_ANIMATOR_TICK_SECS,
            phase_step: DEFAULT_ANIMATOR_PHASE_STEP,
            settle_secs: DEFAULT_ANIMATOR_SETTLE_SECS,
            yaw_amplitude: 4.0,
            pitch_amplitude: 2.0,
            pitch_frequency: 1.4,
            roll_amplitude: 1.5,
            roll_frequency: 0.7,
            antenna_base: 18.0,
            antenna_amplitude: 12.0,
            antenna_frequency: 1.8,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: 64,
            timeout_secs: DEFAULT_LISTEN_TIMEOUT_SECS,
            poll_secs: DEFAULT_LISTEN_POLL_SECS,
            voice_threshold: DEFAULT_VOICE_THRESHOLD,
            trailing_silence_secs: DEFAULT_TRAILING_SILENCE_SECS,
            input_device: None,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            apology: DEFAULT_APOLOGY.to_string(),
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 150,
            system_prompt: "You are an empathetic desktop robot. SHORT answers (1-2 sentences). \
                            Warm, curious, helpful. NEVER describe actions. Speak naturally."
                .to_string(),
            request_timeout_secs: 30.0,
        }
    }
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            excited_threshold: 0.5,
            happy_threshold: 0.1,
            sad_threshold: -0.5,
            empathy_threshold: -0.1,
            cache_capacity: 256,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            transcription_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            transcription_model: "whisper-1".to_string(),
            language: Some("en".to_string()),
            synthesis_url: "https://api.openai.com/v1/audio/speech".to_string(),
            synthesis_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            output_sample_rate: 24_000,
            request_timeout_secs: 30.0,
            words_per_minute: 150.0,
            output_device: None,
        }
    }
}

fn check(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::ConfigError(message.into()))
    }
}

fn check_range(name: &str, range: &AxisRange) -> Result<()> {
    check(
        range.is_valid() && range.contains(0.0),
        format!("Safety range for {name} must be finite, ordered and include 0"),
    )
}

fn check_secs(name: &str, value: f64) -> Result<()> {
    check(
        value.is_finite() && value >= 0.0,
        format!("{name} must be a non-negative number of seconds"),
    )
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Build the gesture library with any configured overrides
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown label or malformed step
    pub fn gesture_library(&self) -> Result<GestureLibrary> {
        GestureLibrary::with_overrides(&self.gestures)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        // Safety envelope
        check_range("pitch", &self.safety.pitch)?;
        check_range("yaw", &self.safety.yaw)?;
        check_range("roll", &self.safety.roll)?;
        check_range("antenna", &self.safety.antenna)?;

        // Mirror loop
        let m = &self.mirror;
        check(
            (0.0..1.0).contains(&m.smoothing_factor),
            "Smoothing factor must be in [0, 1)",
        )?;
        check(
            m.deadband_deg.is_finite() && m.deadband_deg >= 0.0,
            "Deadband must be non-negative",
        )?;
        check(
            m.max_reprojection_error.is_finite() && m.max_reprojection_error > 0.0,
            "Max reprojection error must be positive",
        )?;
        check(m.frame_width > 0 && m.frame_height > 0, "Frame size must be non-zero")?;
        check(m.fps > 0, "Camera FPS must be greater than 0")?;
        check(
            matches!(m.filter.to_lowercase().as_str(), "exponential" | "none" | "nofilter"),
            format!("Unknown mirror filter: {}", m.filter),
        )?;
        check_secs("mirror.dispatch_secs", m.dispatch_secs)?;
        check_secs("mirror.frame_sleep_secs", m.frame_sleep_secs)?;
        check_secs("mirror.skip_sleep_secs", m.skip_sleep_secs)?;
        check_secs("mirror.capture_retry_secs", m.capture_retry_secs)?;
        check_secs("mirror.stop_timeout_secs", m.stop_timeout_secs)?;
        if let Some(path) = &m.face_model {
            check(path.exists(), format!("Face model not found: {}", path.display()))?;
        }

        // Speech animation
        let a = &self.animator;
        check(a.tick_secs.is_finite() && a.tick_secs > 0.0, "Animator tick must be positive")?;
        check_secs("animator.settle_secs", a.settle_secs)?;
        check(
            [
                a.phase_step,
                a.yaw_amplitude,
                a.pitch_amplitude,
                a.pitch_frequency,
                a.roll_amplitude,
                a.roll_frequency,
                a.antenna_base,
                a.antenna_amplitude,
                a.antenna_frequency,
            ]
            .iter()
            .all(|v| v.is_finite()),
            "Animator parameters must be finite",
        )?;

        // Listening
        let l = &self.listener;
        check(l.sample_rate > 0, "Sample rate must be greater than 0")?;
        check(l.chunk_size > 0, "Chunk size must be greater than 0")?;
        check(l.channel_capacity > 0, "Audio channel capacity must be greater than 0")?;
        check(l.timeout_secs.is_finite() && l.timeout_secs > 0.0, "Listen timeout must be positive")?;
        check(l.poll_secs.is_finite() && l.poll_secs > 0.0, "Listen poll interval must be positive")?;
        check(
            (0.0..=1.0).contains(&l.voice_threshold),
            "Voice threshold must be between 0.0 and 1.0",
        )?;
        check_secs("listener.trailing_silence_secs", l.trailing_silence_secs)?;

        // Conversation
        let c = &self.conversation;
        check(c.max_history > 0, "History size must be greater than 0")?;
        check(c.max_tokens > 0, "Max tokens must be greater than 0")?;
        check(!c.model.trim().is_empty(), "Chat model must be set")?;
        check_secs("conversation.request_timeout_secs", c.request_timeout_secs)?;

        // Emotion thresholds must be ordered
        let e = &self.emotion;
        check(
            e.excited_threshold >= e.happy_threshold
                && e.happy_threshold >= e.empathy_threshold
                && e.empathy_threshold >= e.sad_threshold,
            "Emotion thresholds must satisfy excited >= happy >= empathy >= sad",
        )?;

        // Speech
        let s = &self.speech;
        check(s.output_sample_rate > 0, "Output sample rate must be greater than 0")?;
        check(
            s.words_per_minute.is_finite() && s.words_per_minute > 0.0,
            "Words per minute must be positive",
        )?;
        check_secs("speech.request_timeout_secs", s.request_timeout_secs)?;

        self.gesture_library()?;

        Ok(())
    }
}

/// API keys read from the environment
#[derive(Clone, Default)]
pub struct Credentials {
    /// Chat service key
    pub anthropic_api_key: String,
    /// Speech services key
    pub openai_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("anthropic_api_key", &"<set>")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Older name for the simulation switch, read alongside `ROBOT_SIMULATION`
pub const LEGACY_SIMULATION_ENV: &str = "REACHY_SIMULATION";

/// Whether a simulation switch value turns simulation on.
///
/// Unset, empty, `0`, `false`, `no` and `off` (any case) are off; anything else is on.
#[must_use]
pub fn simulation_switch(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim().to_ascii_lowercase();
        !matches!(v.as_str(), "" | "0" | "false" | "no" | "off")
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Credentials {
    /// Read `ANTHROPIC_API_KEY` and `OPENAI_API_KEY`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `ANTHROPIC_API_KEY` is missing or empty
    pub fn from_env() -> Result<Self> {
        Self::from_values(
            std::env::var("ANTHROPIC_API_KEY").ok(),
            std::env::var("OPENAI_API_KEY").ok(),
        )
    }

    /// Build from raw values
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the chat key is missing or empty
    pub fn from_values(anthropic: Option<String>, openai: Option<String>) -> Result<Self> {
        let anthropic_api_key = non_empty(anthropic)
            .ok_or_else(|| Error::ConfigError("Missing required configuration: ANTHROPIC_API_KEY".to_string()))?;
        Ok(Self {
            anthropic_api_key,
            openai_api_key: non_empty(openai),
        })
    }

    /// The speech services key
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `OPENAI_API_KEY` is not set
    pub fn openai_key(&self) -> Result<&str> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            Error::ConfigError("Missing required configuration for voice services: OPENAI_API_KEY".to_string())
        })
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Expressive Head Configuration

# Joint envelope in degrees; every target is clamped into it
safety:
  pitch: { min: -20.0, max: 20.0 }
  yaw: { min: -40.0, max: 40.0 }
  roll: { min: -30.0, max: 30.0 }
  antenna: { min: -80.0, max: 80.0 }

# Head mirroring
mirror:
  camera_index: 0
  frame_width: 640
  frame_height: 480
  fps: 30
  flip_horizontal: true
  filter: "exponential"
  smoothing_factor: 0.25
  deadband_deg: 1.5
  max_reprojection_error: 30.0
  dispatch_secs: 0.1
  frame_sleep_secs: 0.01
  skip_sleep_secs: 0.005
  capture_retry_secs: 0.01
  stop_timeout_secs: 1.0
  face_cascade: "assets/haarcascade_frontalface_alt2.xml"
  facemark_model: "assets/lbfmodel.yaml"

# Speech animation
animator:
  tick_secs: 0.1
  phase_step: 0.18
  settle_secs: 0.3
  yaw_amplitude: 4.0
  pitch_amplitude: 2.0
  pitch_frequency: 1.4
  roll_amplitude: 1.5
  roll_frequency: 0.7
  antenna_base: 18.0
  antenna_amplitude: 12.0
  antenna_frequency: 1.8

# Listening
listener:
  sample_rate: 16000
  chunk_size: 2048
  channel_capacity: 64
  timeout_secs: 15.0
  poll_secs: 0.5
  voice_threshold: 0.001
  trailing_silence_secs: 2.5

# Chat
conversation:
  max_history: 20
  apology: "Having trouble thinking. Try again?"
  model: "claude-sonnet-4-20250514"
  max_tokens: 150

# Emotion classifier
emotion:
  excited_threshold: 0.5
  happy_threshold: 0.1
  sad_threshold: -0.5
  empathy_threshold: -0.1
  cache_capacity: 256

# Speech services
speech:
  transcription_model: "whisper-1"
  language: "en"
  synthesis_model: "tts-1"
  voice: "alloy"
  output_sample_rate: 24000
  words_per_minute: 150.0

# Gesture overrides (optional)
gestures:
  surprised:
    - { pitch: -10.0, antenna_left: 70.0, antenna_right: 70.0, duration: 0.3, pause: 0.1 }
    - { duration: 0.4 }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionLabel;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.safety, SafetyLimits::default());
        assert_eq!(config.listener.chunk_size, 2048);

        let library = config.gesture_library().unwrap();
        let surprised = library.script(EmotionLabel::Surprised);
        assert_eq!(surprised.steps().len(), 2);
        assert_eq!(surprised.steps()[1].target.antennas, Some([0.0, 0.0]));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("mirror:\n  smoothing_factor: 0.5\n").unwrap();
        assert_eq!(config.mirror.smoothing_factor, 0.5);
        assert_eq!(config.mirror.deadband_deg, DEFAULT_DEADBAND_DEG);
        assert_eq!(config.conversation.max_history, DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.mirror.smoothing_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.safety.yaw = AxisRange { min: 10.0, max: -10.0 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.emotion.happy_threshold = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listener.poll_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gestures.insert("giddy".to_string(), Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulation_switch() {
        assert!(!simulation_switch(None));
        for off in ["", "0", "false", "FALSE", " no ", "off"] {
            assert!(!simulation_switch(Some(off)), "{off:?}");
        }
        for on in ["true", "True", "1", "yes"] {
            assert!(simulation_switch(Some(on)), "{on:?}");
        }
    }

    #[test]
    fn test_credentials() {
        assert!(Credentials::from_values(None, None).is_err());
        assert!(Credentials::from_values(Some("  ".into()), None).is_err());

        let creds = Credentials::from_values(Some("key".into()), None).unwrap();
        assert!(creds.openai_key().is_err());
        assert!(!format!("{creds:?}").contains("key\""));

        let creds = Credentials::from_values(Some("key".into()), Some("other".into())).unwrap();
        assert_eq!(creds.openai_key().unwrap(), "other");
    }
}
