//! Hand-authored gesture scripts and the non-reentrant player.

use crate::{
    actuator::MotionBus,
    emotion::EmotionLabel,
    motion::JointTarget,
    Error, Result,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One step as written in a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureStepConfig {
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub antenna_left: f64,
    #[serde(default)]
    pub antenna_right: f64,
    /// Seconds to reach the target
    pub duration: f64,
    /// Seconds to hold before the next step
    #[serde(default)]
    pub pause: f64,
}

/// A target followed by a hold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureStep {
    /// Pose to reach, over the target's duration
    pub target: JointTarget,
    /// Wait after the move before the next step
    pub pause: Duration,
}

impl GestureStep {
    const fn new(target: JointTarget, pause: Duration) -> Self {
        Self { target, pause }
    }
}

impl TryFrom<GestureStepConfig> for GestureStep {
    type Error = Error;

    fn try_from(step: GestureStepConfig) -> Result<Self> {
        let seconds = |name: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|_| Error::ConfigError(format!("Gesture step {name} must be a non-negative number, got {value}")))
        };
        let angles = [step.yaw, step.pitch, step.roll, step.antenna_left, step.antenna_right];
        if angles.iter().any(|a| !a.is_finite()) {
            return Err(Error::ConfigError("Gesture step angles must be finite".to_string()));
        }
        Ok(Self {
            target: JointTarget::new(
                step.yaw,
                step.pitch,
                step.roll,
                step.antenna_left,
                step.antenna_right,
                seconds("duration", step.duration)?,
            ),
            pause: seconds("pause", step.pause)?,
        })
    }
}

/// Ordered steps for one emotion
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GestureScript {
    steps: Vec<GestureStep>,
}

impl GestureScript {
    /// Build a script from steps
    #[must_use]
    pub fn new(steps: Vec<GestureStep>) -> Self {
        Self { steps }
    }

    /// Steps in execution order
    #[must_use]
    pub fn steps(&self) -> &[GestureStep] {
        &self.steps
    }

    /// Total time the script occupies
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.target.duration + s.pause).sum()
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn step(yaw: f64, pitch: f64, roll: f64, left: f64, right: f64, duration: u64, pause: u64) -> GestureStep {
    GestureStep::new(JointTarget::new(yaw, pitch, roll, left, right, ms(duration)), ms(pause))
}

fn builtin_script(label: EmotionLabel) -> Option<GestureScript> {
    let steps = match label {
        EmotionLabel::Neutral => vec![step(0.0, 0.0, 0.0, 0.0, 0.0, 600, 0)],
        EmotionLabel::Greeting => vec![
            step(0.0, -8.0, 0.0, 25.0, 25.0, 300, 200),
            step(0.0, 0.0, 0.0, 0.0, 0.0, 300, 0),
        ],
        EmotionLabel::Thinking => vec![
            step(12.0, -12.0, 8.0, 40.0, -15.0, 800, 500),
            step(0.0, 0.0, 0.0, 0.0, 0.0, 600, 0),
        ],
        EmotionLabel::Agreement => vec![
            step(0.0, 12.0, 0.0, 8.0, 8.0, 250, 120),
            step(0.0, -8.0, 0.0, 8.0, 8.0, 250, 120),
            step(0.0, 0.0, 0.0, 8.0, 8.0, 250, 0),
        ],
        EmotionLabel::Disagreement => vec![
            step(18.0, 0.0, 0.0, -8.0, -8.0, 250, 120),
            step(-18.0, 0.0, 0.0, -8.0, -8.0, 250, 120),
            step(0.0, 0.0, 0.0, -8.0, -8.0, 250, 0),
        ],
        EmotionLabel::Happy => vec![
            step(0.0, -4.0, 0.0, 40.0, 40.0, 400, 250),
            step(0.0, 2.0, 0.0, 30.0, 30.0, 300, 0),
        ],
        EmotionLabel::Excited => vec![
            step(8.0, -8.0, 0.0, 50.0, 50.0, 300, 150),
            step(-8.0, -8.0, 0.0, 50.0, 50.0, 300, 0),
        ],
        EmotionLabel::Sad => vec![step(0.0, 15.0, 0.0, -25.0, -25.0, 1000, 0)],
        EmotionLabel::Surprised => vec![step(0.0, -8.0, 0.0, 70.0, 70.0, 300, 0)],
        EmotionLabel::Confused => vec![step(0.0, 0.0, 15.0, -5.0, 35.0, 700, 0)],
        EmotionLabel::Empathy => vec![step(0.0, 8.0, 8.0, 0.0, 0.0, 900, 0)],
        EmotionLabel::Listening => vec![step(0.0, 4.0, 0.0, 15.0, 15.0, 600, 0)],
        EmotionLabel::Angry => return None,
    };
    Some(GestureScript::new(steps))
}

/// Immutable label → script table
#[derive(Debug, Clone)]
pub struct GestureLibrary {
    scripts: HashMap<EmotionLabel, GestureScript>,
}

impl Default for GestureLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl GestureLibrary {
    /// The authored scripts
    #[must_use]
    pub fn builtin() -> Self {
        let scripts = EmotionLabel::ALL
            .into_iter()
            .filter_map(|label| builtin_script(label).map(|script| (label, script)))
            .collect();
        Self { scripts }
    }

    /// Built-in scripts with some replaced from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an unknown label or a malformed step
    pub fn with_overrides(overrides: &HashMap<String, Vec<GestureStepConfig>>) -> Result<Self> {
        let mut library = Self::builtin();
        for (name, steps) in overrides {
            let label: EmotionLabel = name
                .parse()
                .map_err(|e| Error::ConfigError(format!("Gesture override: {e}")))?;
            let steps = steps
                .iter()
                .map(|s| GestureStep::try_from(*s))
                .collect::<Result<Vec<_>>>()?;
            info!("Gesture '{label}' overridden with {} steps", steps.len());
            library.scripts.insert(label, GestureScript::new(steps));
        }
        Ok(library)
    }

    /// Script for `label`; labels without one get the neutral script
    #[must_use]
    pub fn script(&self, label: EmotionLabel) -> &GestureScript {
        static EMPTY: GestureScript = GestureScript { steps: Vec::new() };
        self.scripts
            .get(&label)
            .or_else(|| self.scripts.get(&EmotionLabel::Neutral))
            .unwrap_or(&EMPTY)
    }

    /// Script for a free-form label name
    #[must_use]
    pub fn script_for_name(&self, name: &str) -> &GestureScript {
        self.script(EmotionLabel::parse_or_neutral(name))
    }

    /// True when `label` has its own script
    #[must_use]
    pub fn contains(&self, label: EmotionLabel) -> bool {
        self.scripts.contains_key(&label)
    }
}

/// What happened to a gesture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// The script ran; `failed_steps` of `steps` were rejected by the actuator
    Played { steps: usize, failed_steps: usize },
    /// Another gesture was in progress
    Dropped,
}

/// Releases the in-progress flag on every exit path
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Plays gesture scripts, one at a time
pub struct GesturePlayer {
    bus: Arc<MotionBus>,
    library: Arc<GestureLibrary>,
    in_progress: AtomicBool,
}

impl GesturePlayer {
    /// Create an idle player over `library`
    #[must_use]
    pub fn new(bus: Arc<MotionBus>, library: Arc<GestureLibrary>) -> Self {
        Self {
            bus,
            library,
            in_progress: AtomicBool::new(false),
        }
    }

    /// True while a script is executing
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Play the script for `label`, blocking until it finishes. Returns
    /// [`GestureOutcome::Dropped`] without moving if a gesture is already running.
    pub fn play(&self, label: EmotionLabel) -> GestureOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Gesture '{label}' dropped, another gesture is in progress");
            return GestureOutcome::Dropped;
        }
        let _guard = InProgress(&self.in_progress);

        let script = self.library.script(label);
        info!("Playing gesture '{label}' ({} steps)", script.steps().len());
        let mut failed_steps = 0;
        for (i, step) in script.steps().iter().enumerate() {
            if let Err(e) = self.bus.dispatch(&step.target) {
                warn!("Gesture '{label}' step {i} failed: {e}");
                failed_steps += 1;
            }
            thread::sleep(step.target.duration);
            if !step.pause.is_zero() {
                thread::sleep(step.pause);
            }
        }

        GestureOutcome::Played {
            steps: script.steps().len(),
            failed_steps,
        }
    }
}
