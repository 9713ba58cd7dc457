use chrono::{DateTime, TimeDelta, Utc};
use strum_macros::Display;

/// Raw code carried by a maveric command message requesting a flip.
pub const CMD_FLIP_START: u16 = 1;
/// Raw code carried by a maveric command message aborting a flip.
pub const CMD_FLIP_ABORT: u16 = 2;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    FlipStart,
    FlipAbort,
    Other,
}

/// One externally issued maneuver command. Transient: consumed at most once,
/// intermediate commands between two ticks are dropped by the bus.
#[derive(Debug, Clone, Copy)]
pub struct MavericCommand {
    kind: CommandKind,
    raw_code: u16,
}

impl MavericCommand {
    pub fn decode(raw_code: u16) -> Self {
        let kind = match raw_code {
            CMD_FLIP_START => CommandKind::FlipStart,
            CMD_FLIP_ABORT => CommandKind::FlipAbort,
            _ => CommandKind::Other,
        };
        Self { kind, raw_code }
    }

    pub fn kind(&self) -> CommandKind { self.kind }
    pub fn raw_code(&self) -> u16 { self.raw_code }
}

/// Command topic value. The sequence number lets a latest-value subscriber
/// tell a fresh command apart from one it already consumed.
#[derive(Debug, Clone, Copy)]
pub struct CommandFrame {
    pub seq: u64,
    pub command: MavericCommand,
}

/// Latest orientation/angular-rate estimate. Angles in radians, wrapped to
/// (-pi, pi]; rates in rad/s. Written by the external estimator only.
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSample {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    pub timestamp: DateTime<Utc>,
}

impl AttitudeSample {
    pub fn level(timestamp: DateTime<Utc>) -> Self {
        Self {
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            roll_rate: 0.0,
            pitch_rate: 0.0,
            yaw_rate: 0.0,
            timestamp,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta { now - self.timestamp }
}

/// Authority switches honored by the downstream controller. Mutated only by
/// the mode arbiter, published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlModeFlags {
    pub manual_enabled: bool,
    pub attitude_enabled: bool,
}

impl ControlModeFlags {
    /// Normal operation: stick input and closed-loop attitude control active.
    pub const NOMINAL: ControlModeFlags =
        ControlModeFlags { manual_enabled: true, attitude_enabled: true };
    /// Both authorities revoked for the duration of the maneuver.
    pub const REVOKED: ControlModeFlags =
        ControlModeFlags { manual_enabled: false, attitude_enabled: false };
}

impl Default for ControlModeFlags {
    fn default() -> Self { Self::NOMINAL }
}

/// Open-loop command for the downstream rate controller. Rates in rad/s,
/// thrust normalized to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSetpoint {
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    pub thrust: f32,
}

/// Externally visible vehicle status record. The maneuver state is mirrored
/// as an integer field.
#[derive(Debug, Clone, Copy)]
pub struct VehicleStatus {
    pub flip_state: u8,
    pub timestamp: DateTime<Utc>,
}

impl VehicleStatus {
    pub fn new(flip_state: u8) -> Self {
        Self { flip_state, timestamp: Utc::now() }
    }
}
