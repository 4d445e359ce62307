//! Expressive robot head: mirrors the operator's head pose and talks back with gestures.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use expressive_head::{
    actuator::{Actuator, JsonLinesActuator, LoggingActuator},
    app::{App, Backends},
    audio::{AudioPlayer, Microphone},
    config::{simulation_switch, Config, Credentials, LEGACY_SIMULATION_ENV},
    mirror::VisionBackend,
    services::{chat::AnthropicChat, SpeechSynthesizer, Transcriber},
    simulation::{EstimatedSpeech, SilentPlayer, SyntheticVision},
};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActuatorKind {
    /// Log every command
    Log,
    /// Write one JSON command per line for a robot bridge
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,
    /// Run without camera, microphone or speaker (also REACHY_SIMULATION)
    /// Run without camera, microphone or speaker
    #[arg(long, env = "ROBOT_SIMULATION")]
    sim: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Camera index, overriding the configuration
    #[arg(long)]
    camera: Option<i32>,

    /// Start mirroring immediately
    #[arg(long)]
    mirror: bool,

    /// Use the microphone and speech services
    #[arg(long)]
    voice: bool,

    /// Where motion commands go
    #[arg(long, value_enum, default_value = "log")]
    actuator: ActuatorKind,

    /// File for `--actuator jsonl` output (stdout when omitted)
    #[arg(long)]
    actuator_output: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

/// Vision backend for builds without the `camera` feature
#[cfg(not(feature = "camera"))]
struct NoCamera;

#[cfg(not(feature = "camera"))]
impl VisionBackend for NoCamera {
    fn open_camera(&self, index: i32) -> expressive_head::Result<Box<dyn expressive_head::mirror::FrameSource>> {
        Err(expressive_head::Error::SensorUnavailable(format!(
            "camera {index}: built without the camera feature"
        )))
    }

    fn landmark_detector(&self) -> expressive_head::Result<Box<dyn expressive_head::landmarks::LandmarkDetector>> {
        Err(expressive_head::Error::Detection("built without the camera feature".into()))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    info!("Loading configuration from: {}", path.display());
    Config::from_file(path).with_context(|| format!("failed to load {}", path.display()))
}

fn actuator(args: &Args) -> Result<Box<dyn Actuator>> {
    Ok(match (args.actuator, &args.actuator_output) {
        (ActuatorKind::Log, _) => Box::new(LoggingActuator::new()),
        (ActuatorKind::Jsonl, None) => Box::new(JsonLinesActuator::new(io::stdout())),
        (ActuatorKind::Jsonl, Some(path)) => {
            let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            Box::new(JsonLinesActuator::new(BufWriter::new(file)))
        }
    })
}

fn vision(args: &Args, config: &Config) -> Arc<dyn VisionBackend> {
    if args.sim {
        return Arc::new(SyntheticVision::new(config.mirror.frame_width, config.mirror.frame_height));
    }
    #[cfg(feature = "camera")]
    {
        Arc::new(expressive_head::camera::OpenCvVision::new(&config.mirror))
    }
    #[cfg(not(feature = "camera"))]
    {
        warn!("Built without the camera feature; /mirror is unavailable");
        Arc::new(NoCamera)
    }
}

type Voice = (
    Arc<dyn SpeechSynthesizer>,
    Arc<dyn AudioPlayer>,
    Option<(Arc<dyn Microphone>, Arc<dyn Transcriber>)>,
);

fn simulated_speech(config: &Config) -> Voice {
    let speech = EstimatedSpeech::new(config.speech.words_per_minute, config.speech.output_sample_rate);
    (Arc::new(speech), Arc::new(SilentPlayer), None)
}

#[cfg(feature = "audio-io")]
fn voice(config: &Config, credentials: &Credentials) -> Result<Voice> {
    use expressive_head::audio::{capture::CpalMicrophone, playback::CpalPlayer};
    use expressive_head::services::speech::{OpenAiSpeech, WhisperTranscriber};

    let key = credentials.openai_key()?;
    let synthesizer = OpenAiSpeech::new(key.to_string(), &config.speech)?;
    let transcriber = WhisperTranscriber::new(key.to_string(), &config.speech)?;
    let microphone = CpalMicrophone::new(config.listener.input_device.clone());
    let player = CpalPlayer::new(config.speech.output_device.clone());
    Ok((
        Arc::new(synthesizer),
        Arc::new(player),
        Some((Arc::new(microphone), Arc::new(transcriber))),
    ))
}

#[cfg(not(feature = "audio-io"))]
fn voice(_config: &Config, _credentials: &Credentials) -> Result<Voice> {
    bail!("--voice needs a build with the audio-io feature")
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    args.sim |= simulation_switch(std::env::var(LEGACY_SIMULATION_ENV).ok().as_deref());

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let mut config = load_config(args.config.as_ref())?;
    if let Some(index) = args.camera {
        config.mirror.camera_index = index;
    }
    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }
    config.validate()?;

    let credentials = Credentials::from_env()?;
    info!("Expressive head starting{}", if args.sim { " in simulation" } else { "" });

    let (synthesizer, player, microphone) = match (args.voice, args.sim) {
        (true, true) => {
            warn!("--voice ignored in simulation");
            simulated_speech(&config)
        }
        (true, false) => voice(&config, &credentials)?,
        (false, _) => simulated_speech(&config),
    };

    let backends = Backends {
        actuator: actuator(&args)?,
        vision: vision(&args, &config),
        chat: Arc::new(AnthropicChat::new(credentials.anthropic_api_key.clone(), &config.conversation)?),
        synthesizer,
        player,
        voice: microphone,
    };
    let mut app = App::new(&config, backends)?;

    if args.mirror {
        if let Err(e) = app.start_mirror() {
            bail!("cannot start mirroring: {e}");
        }
    }

    let stdin = io::stdin();
    app.run(stdin.lock(), &mut io::stdout())?;
    Ok(())
}
