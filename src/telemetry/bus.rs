use super::topics::{
    AttitudeSample, CommandFrame, ControlModeFlags, MavericCommand, RateSetpoint, VehicleStatus,
};
use crate::fatal;
use chrono::Utc;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use strum_macros::Display;
use tokio::sync::watch;

#[derive(Debug, Display)]
pub enum BusError {
    TopicClosed(&'static str),
}

impl std::error::Error for BusError {}

/// Shared write handle for the command topic. Clonable so the console and any
/// external command source publish through the same sequence counter.
#[derive(Clone)]
pub struct CommandPublisher {
    tx: Arc<watch::Sender<Option<CommandFrame>>>,
    seq: Arc<AtomicU64>,
}

impl CommandPublisher {
    pub fn publish_raw(&self, raw_code: u16) -> Result<(), BusError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = CommandFrame { seq, command: MavericCommand::decode(raw_code) };
        self.tx.send(Some(frame)).map_err(|_| BusError::TopicClosed("maveric_command"))
    }
}

/// Write handle for the attitude topic, held by the external estimator glue.
#[derive(Clone)]
pub struct AttitudePublisher {
    tx: Arc<watch::Sender<AttitudeSample>>,
}

impl AttitudePublisher {
    pub fn publish(&self, sample: AttitudeSample) -> Result<(), BusError> {
        self.tx.send(sample).map_err(|_| BusError::TopicClosed("vehicle_attitude"))
    }
}

/// The telemetry bus: one latest-value topic per record type. Only the most
/// recent message is retained between reads; intermediate messages are
/// dropped, which is acceptable for this control traffic.
///
/// Output topic senders (control mode, vehicle status, rate setpoint) are
/// single-owner and handed out exactly once to the component that owns the
/// corresponding record.
pub struct TelemetryBus {
    attitude_tx: Arc<watch::Sender<AttitudeSample>>,
    attitude_rx: watch::Receiver<AttitudeSample>,
    command_tx: Arc<watch::Sender<Option<CommandFrame>>>,
    command_rx: watch::Receiver<Option<CommandFrame>>,
    command_seq: Arc<AtomicU64>,
    control_mode_tx: Option<watch::Sender<ControlModeFlags>>,
    control_mode_rx: watch::Receiver<ControlModeFlags>,
    status_tx: Option<watch::Sender<VehicleStatus>>,
    status_rx: watch::Receiver<VehicleStatus>,
    rates_tx: Option<watch::Sender<Option<RateSetpoint>>>,
    rates_rx: watch::Receiver<Option<RateSetpoint>>,
}

impl TelemetryBus {
    pub fn new() -> Self {
        let (attitude_tx, attitude_rx) = watch::channel(AttitudeSample::level(Utc::now()));
        let (command_tx, command_rx) = watch::channel(None);
        let (control_mode_tx, control_mode_rx) = watch::channel(ControlModeFlags::NOMINAL);
        let (status_tx, status_rx) = watch::channel(VehicleStatus::new(0));
        let (rates_tx, rates_rx) = watch::channel(None);
        Self {
            attitude_tx: Arc::new(attitude_tx),
            attitude_rx,
            command_tx: Arc::new(command_tx),
            command_rx,
            command_seq: Arc::new(AtomicU64::new(0)),
            control_mode_tx: Some(control_mode_tx),
            control_mode_rx,
            status_tx: Some(status_tx),
            status_rx,
            rates_tx: Some(rates_tx),
            rates_rx,
        }
    }

    pub fn attitude_publisher(&self) -> AttitudePublisher {
        AttitudePublisher { tx: Arc::clone(&self.attitude_tx) }
    }

    pub fn command_publisher(&self) -> CommandPublisher {
        CommandPublisher { tx: Arc::clone(&self.command_tx), seq: Arc::clone(&self.command_seq) }
    }

    pub fn subscribe_attitude(&self) -> watch::Receiver<AttitudeSample> {
        self.attitude_rx.clone()
    }

    pub fn subscribe_commands(&self) -> watch::Receiver<Option<CommandFrame>> {
        self.command_rx.clone()
    }

    pub fn subscribe_control_mode(&self) -> watch::Receiver<ControlModeFlags> {
        self.control_mode_rx.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<VehicleStatus> { self.status_rx.clone() }

    pub fn subscribe_rates(&self) -> watch::Receiver<Option<RateSetpoint>> {
        self.rates_rx.clone()
    }

    /// Hands out the single control-mode write handle. The mode arbiter is
    /// the only legal owner.
    pub fn take_control_mode_sender(&mut self) -> watch::Sender<ControlModeFlags> {
        self.control_mode_tx
            .take()
            .unwrap_or_else(|| fatal!("Control mode topic sender already taken!"))
    }

    pub fn take_status_sender(&mut self) -> watch::Sender<VehicleStatus> {
        self.status_tx.take().unwrap_or_else(|| fatal!("Status topic sender already taken!"))
    }

    pub fn take_rates_sender(&mut self) -> watch::Sender<Option<RateSetpoint>> {
        self.rates_tx.take().unwrap_or_else(|| fatal!("Rate setpoint sender already taken!"))
    }
}

impl Default for TelemetryBus {
    fn default() -> Self { Self::new() }
}
