use super::attitude_monitor::AttitudeMonitor;
use super::command_listener::CommandListener;
use super::config::FlipConfig;
use super::flip_state::FlipState;
use super::mode_arbiter::ModeArbiter;
use super::rate_publisher::RateSetpointPublisher;
use super::state_machine::FlipStateMachine;
use crate::telemetry::{BusError, CommandPublisher, TelemetryBus, VehicleStatus};
use crate::{info, warn};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Console-side diagnostic requests consumed by the supervisor between
/// ticks.
pub enum DiagRequest {
    ForceState(FlipState),
}

/// Narrow, clonable view of the running supervisor handed to the console
/// endpoint: state queries, command injection and shutdown. There is no
/// ambient global instance; whoever owns a handle owns the access.
#[derive(Clone)]
pub struct SupervisorHandle {
    diag_tx: mpsc::Sender<DiagRequest>,
    status_rx: watch::Receiver<VehicleStatus>,
    commands: CommandPublisher,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    pub fn current_state(&self) -> FlipState {
        FlipState::from_repr(self.status_rx.borrow().flip_state).unwrap_or(FlipState::Disabled)
    }

    pub async fn force_state(&self, target: FlipState) -> bool {
        self.diag_tx.send(DiagRequest::ForceState(target)).await.is_ok()
    }

    pub fn inject_raw_command(&self, raw_code: u16) -> Result<(), BusError> {
        self.commands.publish_raw(raw_code)
    }

    pub fn stop(&self) { self.cancel.cancel(); }
}

/// The periodic task driving the whole maneuver: one cooperative loop owns
/// every piece of mutable state and ticks the state machine on a bounded
/// wait, so an abort or shutdown is never delayed by more than one tick.
pub struct FlipSupervisor {
    machine: FlipStateMachine,
    commands: CommandListener,
    attitude: AttitudeMonitor,
    diag_rx: mpsc::Receiver<DiagRequest>,
    diag_open: bool,
    cancel: CancellationToken,
}

impl FlipSupervisor {
    /// Coarse cadence while nothing time-critical is happening.
    const IDLE_TICK: Duration = Duration::from_millis(100);
    /// Cadence while the maneuver holds authority.
    const ACTIVE_TICK: Duration = Duration::from_millis(10);

    pub fn new(
        bus: &mut TelemetryBus,
        config: FlipConfig,
        cancel: CancellationToken,
    ) -> (FlipSupervisor, SupervisorHandle) {
        let arbiter = ModeArbiter::new(bus.take_control_mode_sender());
        let rates = RateSetpointPublisher::new(bus.take_rates_sender());
        let machine = FlipStateMachine::new(config, arbiter, rates, bus.take_status_sender());
        let (diag_tx, diag_rx) = mpsc::channel(8);
        let handle = SupervisorHandle {
            diag_tx,
            status_rx: bus.subscribe_status(),
            commands: bus.command_publisher(),
            cancel: cancel.clone(),
        };
        let supervisor = Self {
            machine,
            commands: CommandListener::new(bus.subscribe_commands()),
            attitude: AttitudeMonitor::new(bus.subscribe_attitude()),
            diag_rx,
            diag_open: true,
            cancel,
        };
        (supervisor, handle)
    }

    /// Runs until cancelled. Every iteration is one bounded wait over all
    /// input sources followed by exactly one tick; while the maneuver is
    /// active the faster attitude channel is multiplexed in rather than
    /// serialized behind the command timeout, so abort delivery stays
    /// within one tick.
    pub async fn run(mut self) {
        info!("Flip supervisor running.");
        loop {
            let active = self.machine.state().is_active();
            let tick = if active { Self::ACTIVE_TICK } else { Self::IDLE_TICK };
            let mut forced = None;
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.commands.wait_new() => {}
                () = self.attitude.wait_new(), if active => {}
                request = self.diag_rx.recv(), if self.diag_open => {
                    match request {
                        Some(DiagRequest::ForceState(target)) => forced = Some(target),
                        None => self.diag_open = false,
                    }
                }
                () = sleep(tick) => {}
            }

            self.attitude.refresh();
            let sample = *self.attitude.sample();
            let command = self.commands.poll();
            let now = Utc::now();
            if let Some(target) = forced {
                self.machine.force_state(target, now);
            }
            self.machine.tick(now, command, &sample);
        }

        if self.machine.state().is_active() {
            warn!("Supervisor stopping mid-maneuver; aborting flip.");
            self.machine.abort(Utc::now());
        }
        info!("Flip supervisor stopped.");
    }
}
