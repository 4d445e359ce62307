//! Actuator boundary and the single-writer motion bus.
//!
//! Every motion producer (mirror loop, gesture player, speech animator)
//! sends [`JointTarget`]s through one [`MotionBus`]. The bus clamps each
//! target into the configured [`SafetyLimits`] and serializes access to the
//! underlying [`Actuator`], so commands from different producers never
//! overlap on the wire. It does not reorder or prioritize producers.

use crate::error::ActuatorError;
use crate::motion::{JointTarget, SafetyLimits};
use log::{debug, info};
use nalgebra::{Matrix4, Translation3, UnitQuaternion};
use serde::Serialize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Head pose command in the robot frame: translation in millimetres,
/// orientation in degrees applied roll, then pitch, then yaw about fixed axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadCommand {
    /// Forward offset in millimetres
    pub x_mm: f64,
    /// Left offset in millimetres
    pub y_mm: f64,
    /// Up offset in millimetres
    pub z_mm: f64,
    /// Roll in degrees
    pub roll_deg: f64,
    /// Pitch in degrees
    pub pitch_deg: f64,
    /// Yaw in degrees
    pub yaw_deg: f64,
}

impl HeadCommand {
    /// Orientation-only command at the rest position
    #[must_use]
    pub const fn orientation(roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> Self {
        Self {
            x_mm: 0.0,
            y_mm: 0.0,
            z_mm: 0.0,
            roll_deg,
            pitch_deg,
            yaw_deg,
        }
    }

    /// Homogeneous 4x4 transform with translation in metres
    #[must_use]
    pub fn matrix(&self) -> Matrix4<f64> {
        let rotation = UnitQuaternion::from_euler_angles(
            self.roll_deg.to_radians(),
            self.pitch_deg.to_radians(),
            self.yaw_deg.to_radians(),
        );
        let translation = Translation3::new(self.x_mm / 1000.0, self.y_mm / 1000.0, self.z_mm / 1000.0);
        nalgebra::Isometry3::from_parts(translation, rotation).to_homogeneous()
    }
}

/// Robot actuation API: move head and antennas to a target over `duration`
pub trait Actuator: Send {
    /// Command a target; antennas are in radians, `None` leaves them in place
    ///
    /// # Errors
    ///
    /// Returns an [`ActuatorError`] when the device rejects or cannot execute the command
    fn set_target(
        &mut self,
        head: &HeadCommand,
        antennas: Option<[f64; 2]>,
        duration: Duration,
    ) -> std::result::Result<(), ActuatorError>;
}

/// Record of a target that reached the actuator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched {
    /// The target as sent, after clamping
    pub target: JointTarget,
    /// Whether clamping changed any angle
    pub clamped: bool,
}

/// Shared, clamped, single-writer access to an actuator
pub struct MotionBus {
    actuator: Mutex<Box<dyn Actuator>>,
    limits: SafetyLimits,
}

impl MotionBus {
    /// Wrap an actuator with the given safety envelope
    #[must_use]
    pub fn new(actuator: Box<dyn Actuator>, limits: SafetyLimits) -> Self {
        Self {
            actuator: Mutex::new(actuator),
            limits,
        }
    }

    /// The envelope applied to every dispatch
    #[must_use]
    pub const fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Clamp `target` and send it to the actuator
    ///
    /// # Errors
    ///
    /// Returns the actuator's error unchanged; callers decide whether to log and continue
    pub fn dispatch(&self, target: &JointTarget) -> std::result::Result<Dispatched, ActuatorError> {
        let safe = self.limits.clamp_target(target);
        let clamped = safe != *target;
        if clamped {
            debug!("Clamped target {:?} to {:?}", target, safe);
        }

        let head = HeadCommand::orientation(safe.roll, safe.pitch, safe.yaw);
        let antennas = safe.antennas.map(|[l, r]| [l.to_radians(), r.to_radians()]);

        let mut actuator = self.actuator.lock().unwrap_or_else(PoisonError::into_inner);
        actuator.set_target(&head, antennas, safe.duration)?;

        Ok(Dispatched { target: safe, clamped })
    }
}

/// Actuator that only logs commands, used in simulation
#[derive(Debug, Default)]
pub struct LoggingActuator {
    sent: usize,
}

impl LoggingActuator {
    /// Create a logging actuator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actuator for LoggingActuator {
    fn set_target(
        &mut self,
        head: &HeadCommand,
        antennas: Option<[f64; 2]>,
        duration: Duration,
    ) -> std::result::Result<(), ActuatorError> {
        self.sent += 1;
        debug!(
            "[sim #{}] head roll={:.1} pitch={:.1} yaw={:.1} antennas={:?} over {:.2}s",
            self.sent,
            head.roll_deg,
            head.pitch_deg,
            head.yaw_deg,
            antennas.map(|[l, r]| [l.to_degrees().round(), r.to_degrees().round()]),
            duration.as_secs_f64()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonCommand {
    head: [[f64; 4]; 4],
    antennas: Option<[f64; 2]>,
    duration: f64,
}

/// Actuator that writes one JSON object per command, for an external robot bridge
pub struct JsonLinesActuator<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesActuator<W> {
    /// Write commands to `writer`
    pub fn new(writer: W) -> Self {
        info!("JSON-lines actuator ready");
        Self { writer }
    }

    fn encode(head: &HeadCommand, antennas: Option<[f64; 2]>, duration: Duration) -> JsonCommand {
        let m = head.matrix();
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = m[(i, j)];
            }
        }
        JsonCommand {
            head: rows,
            antennas,
            duration: duration.as_secs_f64(),
        }
    }
}

impl<W: Write + Send> Actuator for JsonLinesActuator<W> {
    fn set_target(
        &mut self,
        head: &HeadCommand,
        antennas: Option<[f64; 2]>,
        duration: Duration,
    ) -> std::result::Result<(), ActuatorError> {
        let command = Self::encode(head, antennas, duration);
        let line = serde_json::to_string(&command).map_err(|e| ActuatorError::Device(e.to_string()))?;
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|e| ActuatorError::Device(e.to_string()))
    }
}

/// One command seen by a [`RecordingActuator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedCommand {
    /// Head command as received
    pub head: HeadCommand,
    /// Antennas in radians
    pub antennas: Option<[f64; 2]>,
    /// Commanded duration
    pub duration: Duration,
    /// Arrival time
    pub at: Instant,
}

#[derive(Default)]
struct CommandLogInner {
    commands: Mutex<Vec<RecordedCommand>>,
    failing: AtomicBool,
    rejected: AtomicUsize,
}

/// Shared view of the commands received by a [`RecordingActuator`]
#[derive(Clone, Default)]
pub struct CommandLog {
    inner: Arc<CommandLogInner>,
}

impl CommandLog {
    /// Snapshot of every accepted command
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of accepted commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.commands.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when nothing has been accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of commands refused while failing
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.inner.rejected.load(Ordering::SeqCst)
    }

    /// Make the actuator refuse every command until switched back
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Forget recorded commands
    pub fn clear(&self) {
        self.inner.commands.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Actuator that records commands for inspection
#[derive(Default)]
pub struct RecordingActuator {
    log: CommandLog,
}

impl RecordingActuator {
    /// Create a recorder and the handle used to read it back
    #[must_use]
    pub fn new() -> (Self, CommandLog) {
        let log = CommandLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl Actuator for RecordingActuator {
    fn set_target(
        &mut self,
        head: &HeadCommand,
        antennas: Option<[f64; 2]>,
        duration: Duration,
    ) -> std::result::Result<(), ActuatorError> {
        if self.log.inner.failing.load(Ordering::SeqCst) {
            self.log.inner.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(ActuatorError::NotReady("recording actuator set to fail".to_string()));
        }
        self.log
            .inner
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCommand {
                head: *head,
                antennas,
                duration,
                at: Instant::now(),
            });
        Ok(())
    }
}
