//! Latest-value telemetry bus shared by the supervisor and its external
//! collaborators: typed topic records plus the publish/subscribe handles
//! built on watch channels.

mod bus;
mod topics;

pub use bus::{AttitudePublisher, BusError, CommandPublisher, TelemetryBus};
pub use topics::{
    AttitudeSample, CommandFrame, CommandKind, ControlModeFlags, MavericCommand, RateSetpoint,
    VehicleStatus, CMD_FLIP_ABORT, CMD_FLIP_START,
};
