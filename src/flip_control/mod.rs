//! The flip maneuver supervisor: lifecycle state machine, authority
//! arbitration, telemetry/command adapters and the periodic polling loop
//! that ties them together.

mod attitude_monitor;
mod command_listener;
mod config;
mod flip_state;
mod mode_arbiter;
mod rate_publisher;
mod state_machine;
mod supervisor;
#[cfg(test)]
mod tests;

pub use config::FlipConfig;
pub use flip_state::FlipState;
pub use supervisor::{FlipSupervisor, SupervisorHandle};
