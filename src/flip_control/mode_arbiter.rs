use crate::telemetry::ControlModeFlags;
use crate::{error, info, warn};
use tokio::sync::watch;

/// Sole owner of the vehicle's control-mode flags. Grants and revokes
/// manual/attitude authority and restores the pre-flip configuration
/// exactly once per maneuver cycle.
///
/// At most one override is outstanding at any time: a second
/// `override_authority` keeps the first capture, and `restore_authority`
/// without a capture falls back to the nominal flags so the pilot is never
/// left without control.
pub struct ModeArbiter {
    control_mode_tx: watch::Sender<ControlModeFlags>,
    captured: Option<ControlModeFlags>,
}

impl ModeArbiter {
    pub fn new(control_mode_tx: watch::Sender<ControlModeFlags>) -> Self {
        Self { control_mode_tx, captured: None }
    }

    /// Captures the current flags, forces both authorities off and publishes
    /// the change.
    pub fn override_authority(&mut self) {
        if self.captured.is_some() {
            warn!("Authority already overridden; keeping the first capture.");
            return;
        }
        let current = *self.control_mode_tx.borrow();
        self.captured = Some(current);
        self.control_mode_tx.send_replace(ControlModeFlags::REVOKED);
        info!(
            "Control authority revoked (captured manual: {}, attitude: {}).",
            current.manual_enabled, current.attitude_enabled
        );
    }

    /// Writes back the captured flags and publishes. Calling this without a
    /// preceding override is a defect: it is logged and the nominal flags are
    /// published instead of leaving authority revoked.
    pub fn restore_authority(&mut self) {
        let flags = match self.captured.take() {
            Some(captured) => captured,
            None => {
                error!("Authority restore without a prior override; publishing nominal flags.");
                ControlModeFlags::NOMINAL
            }
        };
        self.control_mode_tx.send_replace(flags);
        info!(
            "Control authority restored (manual: {}, attitude: {}).",
            flags.manual_enabled, flags.attitude_enabled
        );
    }

    pub fn override_outstanding(&self) -> bool { self.captured.is_some() }

    pub fn current_flags(&self) -> ControlModeFlags { *self.control_mode_tx.borrow() }
}
