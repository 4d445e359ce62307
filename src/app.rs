//! Interactive console wiring every component together.

use crate::{
    actuator::{Actuator, MotionBus},
    animator::SpeechAnimator,
    audio::{AudioPlayer, Microphone, SpeechListener},
    config::Config,
    conversation::{Conversation, TurnPipeline, TurnReport, VoiceInput},
    emotion::{EmotionLabel, KeywordSentimentClassifier},
    gesture::{GestureOutcome, GesturePlayer},
    mirror::{MirrorLoop, VisionBackend},
    services::{ChatClient, SpeechSynthesizer, Transcriber},
    Result,
};
use log::{info, warn};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One console line, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/mirror on` or `/mirror off`
    Mirror(bool),
    /// `/gesture <label>`
    Gesture(EmotionLabel),
    /// `/listen`
    Listen,
    /// `/clear`
    Clear,
    /// `/stats`
    Stats,
    /// `/help`
    Help,
    /// `/quit` or `/exit`
    Quit,
    /// Anything that is not a command
    Say(String),
    /// A malformed command, with the message to show
    Invalid(String),
    /// Blank line
    Empty,
}

impl Command {
    /// Parse a console line
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();
        match (name.as_str(), arg) {
            ("mirror", Some("on")) => Self::Mirror(true),
            ("mirror", Some("off")) => Self::Mirror(false),
            ("mirror", _) => Self::Invalid("usage: /mirror on|off".into()),
            ("gesture", Some(label)) => match label.parse() {
                Ok(label) => Self::Gesture(label),
                Err(e) => Self::Invalid(format!("{e}; known labels: {}", label_list())),
            },
            ("gesture", None) => Self::Invalid(format!("usage: /gesture <{}>", label_list())),
            ("listen", _) => Self::Listen,
            ("clear", _) => Self::Clear,
            ("stats", _) => Self::Stats,
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Invalid(format!("unknown command /{name}, try /help")),
        }
    }
}

fn label_list() -> String {
    EmotionLabel::ALL.iter().map(|l| l.as_str()).collect::<Vec<_>>().join("|")
}

const HELP: &str = "\
Commands:
  /mirror on|off     start or stop copying your head pose
  /gesture <label>   play a gesture
  /listen            speak one utterance into the microphone
  /clear             forget the conversation
  /stats             mirror loop and classifier counters
  /quit              exit
Anything else is said to the robot.";

/// Whether the console keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Device and service implementations the app runs on
pub struct Backends {
    pub actuator: Box<dyn Actuator>,
    pub vision: Arc<dyn VisionBackend>,
    pub chat: Arc<dyn ChatClient>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    /// Microphone and transcriber; `None` disables `/listen`
    pub voice: Option<(Arc<dyn Microphone>, Arc<dyn Transcriber>)>,
}

/// The robot: mirror loop, conversational turns and on-demand gestures
pub struct App {
    bus: Arc<MotionBus>,
    mirror: MirrorLoop,
    camera_index: i32,
    gestures: Arc<GesturePlayer>,
    pipeline: TurnPipeline,
    voice: Option<VoiceInput>,
    pending: Vec<JoinHandle<GestureOutcome>>,
}

impl App {
    /// Validate `config` and build every component on top of `backends`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConfigError`] for an invalid configuration
    pub fn new(config: &Config, backends: Backends) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(MotionBus::new(backends.actuator, config.safety));
        let mirror = MirrorLoop::new(backends.vision, Arc::clone(&bus), config.mirror.clone());
        let gestures = Arc::new(GesturePlayer::new(Arc::clone(&bus), Arc::new(config.gesture_library()?)));
        let animator = Arc::new(SpeechAnimator::new(Arc::clone(&bus), config.animator.clone()));
        let classifier = KeywordSentimentClassifier::new(config.emotion.clone())?;

        let pipeline = TurnPipeline::new(
            Conversation::new(backends.chat, &config.conversation),
            Box::new(classifier),
            Arc::clone(&gestures),
            animator,
            backends.synthesizer,
            backends.player,
        );
        let voice = backends.voice.map(|(microphone, transcriber)| {
            VoiceInput::new(SpeechListener::new(microphone, config.listener.clone()), transcriber)
        });

        Ok(Self {
            bus,
            mirror,
            camera_index: config.mirror.camera_index,
            gestures,
            pipeline,
            voice,
            pending: Vec::new(),
        })
    }

    /// Use a different camera on the next `/mirror on`
    #[must_use]
    pub fn with_camera(mut self, index: i32) -> Self {
        self.camera_index = index;
        self
    }

    #[must_use]
    pub fn mirror(&self) -> &MirrorLoop {
        &self.mirror
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<MotionBus> {
        &self.bus
    }

    /// Start the mirror loop
    ///
    /// # Errors
    ///
    /// Returns an error if the camera or detector cannot be opened
    pub fn start_mirror(&self) -> Result<()> {
        self.mirror.start(self.camera_index)
    }

    /// Run one chat turn
    pub fn say(&mut self, text: &str) -> Option<TurnReport> {
        self.pipeline.run_turn(text)
    }

    /// Play a gesture in the background; the console stays responsive
    pub fn play_gesture(&mut self, label: EmotionLabel) {
        self.pending.retain(|handle| !handle.is_finished());
        let gestures = Arc::clone(&self.gestures);
        self.pending.push(thread::spawn(move || gestures.play(label)));
    }

    /// Wait for background gestures to finish
    pub fn wait_for_gestures(&mut self) -> Vec<GestureOutcome> {
        self.pending
            .drain(..)
            .map(|handle| handle.join().unwrap_or(GestureOutcome::Dropped))
            .collect()
    }

    /// Apply one command, writing any feedback to `out`
    ///
    /// # Errors
    ///
    /// Returns an error only when writing to `out` fails
    pub fn handle<W: Write>(&mut self, command: Command, out: &mut W) -> std::io::Result<Flow> {
        match command {
            Command::Empty => {}
            Command::Say(text) => self.respond(&text, out)?,
            Command::Mirror(true) => match self.start_mirror() {
                Ok(()) => writeln!(out, "Mirroring on (camera {})", self.camera_index)?,
                Err(e) => writeln!(out, "Could not start mirroring: {e}")?,
            },
            Command::Mirror(false) => {
                self.mirror.stop();
                writeln!(out, "Mirroring off")?;
            }
            Command::Gesture(label) => {
                if self.gestures.is_busy() {
                    writeln!(out, "A gesture is already playing")?;
                } else {
                    self.play_gesture(label);
                    writeln!(out, "Playing {label}")?;
                }
            }
            Command::Listen => self.listen(out)?,
            Command::Clear => {
                self.pipeline.clear_history();
                writeln!(out, "Conversation cleared")?;
            }
            Command::Stats => self.write_stats(out)?,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Invalid(message) => writeln!(out, "{message}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn respond<W: Write>(&mut self, text: &str, out: &mut W) -> std::io::Result<()> {
        if let Some(report) = self.pipeline.run_turn(text) {
            writeln!(out, "Robot [{}]: {}", report.emotion, report.reply)?;
        }
        Ok(())
    }

    fn listen<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        let Some(voice) = &self.voice else {
            return writeln!(out, "Voice input is not enabled");
        };
        writeln!(out, "Listening...")?;
        out.flush()?;
        match voice.capture() {
            Ok(Some(text)) => {
                writeln!(out, "You said: {text}")?;
                self.respond(&text, out)
            }
            Ok(None) => writeln!(out, "Didn't catch that"),
            Err(e) => {
                warn!("Voice input failed: {e}");
                writeln!(out, "Microphone unavailable: {e}")
            }
        }
    }

    fn write_stats<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let s = self.mirror.stats();
        writeln!(
            out,
            "Mirror {}: {} frames captured, {} processed, {} faces, {} poses, {} dispatched, {} rejected, {} capture failures",
            if self.mirror.is_running() { "running" } else { "stopped" },
            s.frames_captured,
            s.frames_processed,
            s.faces_detected,
            s.poses_estimated,
            s.dispatches,
            s.dispatch_failures,
            s.capture_failures
        )?;
        if let Some(m) = self.pipeline.classifier_metrics() {
            writeln!(
                out,
                "Classifier: {} texts, {} cached, {} keyword, {} lexicon",
                m.total, m.cache_hits, m.keyword, m.fallback
            )?;
        }
        writeln!(out, "History: {} messages", self.pipeline.conversation().history().len())
    }

    /// Read commands from `input` until `/quit` or end of input
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing the console fails
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        info!("Console ready");
        writeln!(out, "Type /help for commands")?;
        for line in input.lines() {
            if self.handle(Command::parse(&line?), out)? == Flow::Quit {
                break;
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Stop the mirror loop and wait for gestures
    pub fn shutdown(&mut self) {
        self.mirror.stop();
        self.wait_for_gestures();
        info!("Shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("hello robot"), Command::Say("hello robot".into()));
        assert_eq!(Command::parse("/mirror on"), Command::Mirror(true));
        assert_eq!(Command::parse("/MIRROR off"), Command::Mirror(false));
        assert_eq!(Command::parse("/gesture happy"), Command::Gesture(EmotionLabel::Happy));
        assert_eq!(Command::parse("/listen"), Command::Listen);
        assert_eq!(Command::parse("/clear"), Command::Clear);
        assert_eq!(Command::parse("/stats"), Command::Stats);
        assert_eq!(Command::parse("/exit"), Command::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(matches!(Command::parse("/mirror maybe"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/gesture"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/gesture ecstatic"), Command::Invalid(m) if m.contains("thinking")));
        assert!(matches!(Command::parse("/dance"), Command::Invalid(_)));
    }
}
