use super::config::FlipConfig;
use super::flip_state::FlipState;
use crate::telemetry::RateSetpoint;
use tokio::sync::watch;

/// Emits open-loop angular-rate/thrust setpoints while the maneuver is
/// active and actively clears the topic when it ends, so the downstream
/// rate controller never keeps acting on a latched command after authority
/// has been handed back.
pub struct RateSetpointPublisher {
    rates_tx: watch::Sender<Option<RateSetpoint>>,
}

impl RateSetpointPublisher {
    pub fn new(rates_tx: watch::Sender<Option<RateSetpoint>>) -> Self { Self { rates_tx } }

    /// Publishes the command shape of the given segment:
    /// a thrust-boosted climb in `Start`, the full-rate rotation with
    /// reduced thrust in `Roll`, and a proportional leveling rate command
    /// in `Recover`. `Disabled`/`Finished` publish nothing.
    pub fn publish_for(&self, state: FlipState, wrapped_roll: f32, config: &FlipConfig) {
        let setpoint = match state {
            FlipState::Disabled | FlipState::Finished => return,
            FlipState::Start => RateSetpoint {
                roll_rate: 0.0,
                pitch_rate: 0.0,
                yaw_rate: 0.0,
                thrust: (config.hover_thrust + config.thrust_boost).clamp(0.0, 1.0),
            },
            FlipState::Roll => RateSetpoint {
                roll_rate: config.rotation_rate,
                pitch_rate: 0.0,
                yaw_rate: 0.0,
                thrust: (config.hover_thrust - config.thrust_cut).clamp(0.0, 1.0),
            },
            FlipState::Recover => {
                let limit = config.rotation_rate.abs();
                RateSetpoint {
                    roll_rate: (-config.level_gain * wrapped_roll).clamp(-limit, limit),
                    pitch_rate: 0.0,
                    yaw_rate: 0.0,
                    thrust: config.hover_thrust.clamp(0.0, 1.0),
                }
            }
        };
        self.rates_tx.send_replace(Some(setpoint));
    }

    /// Clears the topic. Idempotent; called on every path into `Finished`
    /// or `Disabled`.
    pub fn silence(&self) {
        if self.rates_tx.borrow().is_some() {
            self.rates_tx.send_replace(None);
        }
    }
}
