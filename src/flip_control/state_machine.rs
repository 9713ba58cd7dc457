use super::config::FlipConfig;
use super::flip_state::FlipState;
use super::mode_arbiter::ModeArbiter;
use super::rate_publisher::RateSetpointPublisher;
use crate::telemetry::{AttitudeSample, CommandKind, MavericCommand, VehicleStatus};
use crate::{event, info, warn};
use chrono::{DateTime, Utc};
use std::f32::consts::PI;
use strum_macros::Display;
use tokio::sync::watch;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    AttitudeControlInactive,
    TelemetryStale,
    OverrideOutstanding,
}

/// The flip maneuver state machine. Consumes commands and attitude
/// telemetry, drives the mode arbiter and the rate setpoint publisher, and
/// mirrors the externally visible state into the status topic.
///
/// All mutation happens inside [`Self::tick`]; the machine is consistent at
/// every tick boundary, never observed mid-transition.
pub struct FlipStateMachine {
    state: FlipState,
    config: FlipConfig,
    arbiter: ModeArbiter,
    rates: RateSetpointPublisher,
    status_tx: watch::Sender<VehicleStatus>,
    entered_at: DateTime<Utc>,
    rotation_accum: f32,
    last_roll: Option<f32>,
}

impl FlipStateMachine {
    pub fn new(
        config: FlipConfig,
        arbiter: ModeArbiter,
        rates: RateSetpointPublisher,
        status_tx: watch::Sender<VehicleStatus>,
    ) -> Self {
        let machine = Self {
            state: FlipState::Disabled,
            config,
            arbiter,
            rates,
            status_tx,
            entered_at: Utc::now(),
            rotation_accum: 0.0,
            last_roll: None,
        };
        machine.publish_status(machine.entered_at);
        machine
    }

    pub fn state(&self) -> FlipState { self.state }

    /// One supervisor tick: consume the pending command (if any), fold the
    /// newest attitude sample into the rotation tracking, advance the
    /// lifecycle, and publish the segment's rate command.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        command: Option<MavericCommand>,
        sample: &AttitudeSample,
    ) {
        if let Some(command) = command {
            self.handle_command(command, sample, now);
        }
        self.track_rotation(sample);

        let next = match self.state {
            FlipState::Disabled => None,
            FlipState::Start => {
                if self.rotation_accum.abs() >= self.config.start_angle {
                    Some(FlipState::Roll)
                } else if now - self.entered_at >= self.config.start_timeout {
                    event!("Start segment timed out; rotating on the timed fallback.");
                    Some(FlipState::Roll)
                } else {
                    None
                }
            }
            FlipState::Roll => {
                if self.rotation_accum.abs() >= self.config.roll_done_angle {
                    Some(FlipState::Recover)
                } else if now - self.entered_at >= self.config.roll_watchdog {
                    warn!("Roll watchdog expired; forcing recovery.");
                    Some(FlipState::Recover)
                } else {
                    None
                }
            }
            FlipState::Recover => {
                if sample.roll.abs() <= self.config.recover_angle {
                    Some(FlipState::Finished)
                } else if now - self.entered_at >= self.config.recover_watchdog {
                    warn!("Recovery watchdog expired; handing back authority anyway.");
                    Some(FlipState::Finished)
                } else {
                    None
                }
            }
            FlipState::Finished => Some(FlipState::Disabled),
        };
        if let Some(next) = next {
            self.enter(next, now);
        }

        self.rates.publish_for(self.state, sample.roll, &self.config);
    }

    /// Immediate abort: silence the rate command, hand authority back and
    /// return to `Disabled` on this very tick.
    pub fn abort(&mut self, now: DateTime<Utc>) {
        self.rates.silence();
        if self.arbiter.override_outstanding() {
            self.arbiter.restore_authority();
        }
        self.set_state(FlipState::Disabled, now);
    }

    /// Diagnostic force-set from the console. Keeps the authority pairing
    /// intact no matter which state gets forced.
    pub fn force_state(&mut self, target: FlipState, now: DateTime<Utc>) {
        warn!("Diagnostic override: forcing flip state {} -> {target}.", self.state);
        match target {
            FlipState::Disabled | FlipState::Finished => {
                self.rates.silence();
                if self.arbiter.override_outstanding() {
                    self.arbiter.restore_authority();
                }
            }
            FlipState::Start | FlipState::Roll | FlipState::Recover => {
                if !self.arbiter.override_outstanding() {
                    self.arbiter.override_authority();
                }
                if target == FlipState::Start {
                    self.reset_rotation();
                }
            }
        }
        self.set_state(target, now);
    }

    fn handle_command(&mut self, command: MavericCommand, sample: &AttitudeSample, now: DateTime<Utc>) {
        match command.kind() {
            CommandKind::FlipStart => match self.state {
                FlipState::Disabled => match self.start_preconditions(sample, now) {
                    Ok(()) => self.enter(FlipState::Start, now),
                    Err(rejection) => warn!("Rejecting flip start ({rejection})."),
                },
                FlipState::Start
                | FlipState::Roll
                | FlipState::Recover
                | FlipState::Finished => {
                    warn!("Flip already in progress ({}); start command ignored.", self.state);
                }
            },
            CommandKind::FlipAbort => match self.state {
                FlipState::Disabled => event!("Abort command while disabled; nothing to do."),
                FlipState::Start
                | FlipState::Roll
                | FlipState::Recover
                | FlipState::Finished => {
                    warn!("Aborting flip maneuver in state {}.", self.state);
                    self.abort(now);
                }
            },
            CommandKind::Other => {
                event!("Command code {} not handled here.", command.raw_code());
            }
        }
    }

    fn start_preconditions(
        &self,
        sample: &AttitudeSample,
        now: DateTime<Utc>,
    ) -> Result<(), StartRejection> {
        if !self.arbiter.current_flags().attitude_enabled {
            return Err(StartRejection::AttitudeControlInactive);
        }
        if sample.age(now) > self.config.max_sample_age {
            return Err(StartRejection::TelemetryStale);
        }
        if self.arbiter.override_outstanding() {
            return Err(StartRejection::OverrideOutstanding);
        }
        Ok(())
    }

    /// Accumulates rotation progress from successive wrapped roll samples.
    /// Re-reading an unchanged sample adds nothing, so stale telemetry
    /// leaves the accumulator where it was.
    fn track_rotation(&mut self, sample: &AttitudeSample) {
        match self.state {
            FlipState::Start | FlipState::Roll => {
                if let Some(previous) = self.last_roll {
                    self.rotation_accum += wrap_pi(sample.roll - previous);
                }
                self.last_roll = Some(sample.roll);
            }
            FlipState::Disabled | FlipState::Recover | FlipState::Finished => {
                self.last_roll = None;
            }
        }
    }

    fn enter(&mut self, next: FlipState, now: DateTime<Utc>) {
        match next {
            FlipState::Start => {
                self.arbiter.override_authority();
                self.reset_rotation();
            }
            FlipState::Roll => {
                info!(
                    "Beginning full-rate rotation at {:.0} deg/s.",
                    self.config.rotation_rate.to_degrees()
                );
            }
            FlipState::Recover => {
                info!(
                    "Rotation complete after {:.0} deg; leveling.",
                    self.rotation_accum.abs().to_degrees()
                );
            }
            FlipState::Finished => {
                self.rates.silence();
                self.arbiter.restore_authority();
            }
            FlipState::Disabled => {}
        }
        self.set_state(next, now);
    }

    fn set_state(&mut self, next: FlipState, now: DateTime<Utc>) {
        info!("Flip state {} -> {next}.", self.state);
        self.state = next;
        self.entered_at = now;
        self.publish_status(now);
    }

    fn reset_rotation(&mut self) {
        self.rotation_accum = 0.0;
        self.last_roll = None;
    }

    fn publish_status(&self, now: DateTime<Utc>) {
        self.status_tx.send_replace(VehicleStatus { flip_state: self.state.as_raw(), timestamp: now });
    }
}

/// Wraps an angle difference into (-pi, pi].
fn wrap_pi(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}
