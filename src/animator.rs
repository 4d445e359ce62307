//! Procedural head and antenna motion while the robot speaks.
//!
//! The animator ticks at a fixed period for the length of the synthesized
//! audio, dispatching a smooth multi-joint oscillation. However the run ends
//! (duration elapsed, [`SpeechAnimator::stop`], actuator errors or a panic),
//! exactly one neutral target is sent afterwards.

use crate::{actuator::MotionBus, config::AnimatorConfig, motion::JointTarget};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why an animation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEnd {
    /// The requested duration elapsed
    Completed,
    /// [`SpeechAnimator::stop`] was called
    Stopped,
}

/// Summary of one animation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationReport {
    /// Oscillation targets sent
    pub ticks: usize,
    /// Oscillation targets the actuator rejected
    pub failed_ticks: usize,
    /// How the run ended
    pub ended: AnimationEnd,
    /// Wall time from start to the neutral reset
    pub elapsed: Duration,
    /// Whether the actuator accepted the final neutral target
    pub reset_accepted: bool,
}

/// Sends the neutral target once, on `fire` or on drop
struct NeutralReset<'a> {
    bus: &'a MotionBus,
    settle: Duration,
    fired: bool,
}

impl NeutralReset<'_> {
    fn fire(&mut self) -> bool {
        if self.fired {
            return true;
        }
        self.fired = true;
        match self.bus.dispatch(&JointTarget::neutral(self.settle)) {
            Ok(_) => true,
            Err(e) => {
                warn!("Neutral reset after speech failed: {e}");
                false
            }
        }
    }
}

impl Drop for NeutralReset<'_> {
    fn drop(&mut self) {
        if !self.fired {
            self.fire();
        }
    }
}

/// Oscillates the head and antennas for the length of an utterance
pub struct SpeechAnimator {
    bus: Arc<MotionBus>,
    config: AnimatorConfig,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl SpeechAnimator {
    /// Create an idle animator dispatching through `bus`
    #[must_use]
    pub fn new(bus: Arc<MotionBus>, config: AnimatorConfig) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        Self {
            bus,
            config,
            stop_tx,
            stop_rx,
        }
    }

    /// Joint target at phase `t`
    #[must_use]
    pub fn target_at(&self, t: f64) -> JointTarget {
        let c = &self.config;
        let antenna_swing = c.antenna_amplitude * (c.antenna_frequency * t).sin();
        JointTarget::new(
            c.yaw_amplitude * t.sin(),
            c.pitch_amplitude * (c.pitch_frequency * t).sin(),
            c.roll_amplitude * (c.roll_frequency * t).sin(),
            c.antenna_base + antenna_swing,
            c.antenna_base - antenna_swing,
            Duration::from_secs_f64(c.tick_secs),
        )
    }

    /// Ask the running animation, or the next one if none is running, to end
    /// at its next tick
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Discard a pending stop so the next animation runs its full length
    pub fn clear_stop(&self) {
        while self.stop_rx.try_recv().is_ok() {}
    }

    /// Animate for `duration`, blocking until it elapses or [`Self::stop`] is called
    pub fn animate(&self, duration: Duration) -> AnimationReport {
        let tick = Duration::from_secs_f64(self.config.tick_secs);
        let mut reset = NeutralReset {
            bus: &self.bus,
            settle: Duration::from_secs_f64(self.config.settle_secs),
            fired: false,
        };
        info!("Animating speech for {:.2}s", duration.as_secs_f64());

        let start = Instant::now();
        let mut phase = 0.0;
        let mut ticks = 0;
        let mut failed_ticks = 0;
        let ended = loop {
            if start.elapsed() >= duration {
                break AnimationEnd::Completed;
            }

            if let Err(e) = self.bus.dispatch(&self.target_at(phase)) {
                debug!("Speech tick {ticks} failed: {e}");
                failed_ticks += 1;
            }
            ticks += 1;
            phase += self.config.phase_step;

            let remaining = duration.saturating_sub(start.elapsed());
            match self.stop_rx.recv_timeout(tick.min(remaining)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break AnimationEnd::Stopped,
                Err(RecvTimeoutError::Timeout) => {}
            }
        };

        let reset_accepted = reset.fire();
        let report = AnimationReport {
            ticks,
            failed_ticks,
            ended,
            elapsed: start.elapsed(),
            reset_accepted,
        };
        debug!("Speech animation finished: {report:?}");
        report
    }
}
