use crate::warn;
use chrono::TimeDelta;
use std::env;

/// Tuning surface of the flip supervisor. Angles are stored in radians,
/// rates in rad/s; the env overrides are read in degrees and milliseconds
/// because that is what gets typed on a bench.
#[derive(Debug, Clone)]
pub struct FlipConfig {
    /// Accumulated roll angle that ends the `Start` segment early.
    pub start_angle: f32,
    /// Accumulated roll angle at which the rotation counts as done.
    pub roll_done_angle: f32,
    /// Wrapped roll magnitude below which recovery is complete.
    pub recover_angle: f32,
    /// Timed fallback out of `Start`, in case attitude telemetry lags.
    pub start_timeout: TimeDelta,
    /// Deadline that forces `Roll` -> `Recover` regardless of telemetry.
    pub roll_watchdog: TimeDelta,
    /// Deadline that forces `Recover` -> `Finished` regardless of telemetry.
    pub recover_watchdog: TimeDelta,
    /// Commanded roll rate during the rotation; the sign picks the flip
    /// direction.
    pub rotation_rate: f32,
    /// Collective thrust held outside the boost/cut segments.
    pub hover_thrust: f32,
    /// Added to hover thrust while climbing in `Start`.
    pub thrust_boost: f32,
    /// Subtracted from hover thrust while rotating in `Roll`.
    pub thrust_cut: f32,
    /// Proportional gain of the leveling rate command in `Recover` (1/s).
    pub level_gain: f32,
    /// Maximum attitude sample age accepted by the start preconditions.
    pub max_sample_age: TimeDelta,
}

impl FlipConfig {
    const DEF_START_ANGLE_DEG: f32 = 45.0;
    const DEF_ROLL_DONE_ANGLE_DEG: f32 = 270.0;
    const DEF_RECOVER_ANGLE_DEG: f32 = 5.0;
    const DEF_ROTATION_RATE_DEG: f32 = 400.0;
    const DEF_START_TIMEOUT_MS: i64 = 500;
    const DEF_ROLL_WATCHDOG_MS: i64 = 2500;
    const DEF_RECOVER_WATCHDOG_MS: i64 = 2000;
    const DEF_HOVER_THRUST: f32 = 0.50;
    const DEF_THRUST_BOOST: f32 = 0.20;
    const DEF_THRUST_CUT: f32 = 0.24;
    const DEF_LEVEL_GAIN: f32 = 2.0;
    const DEF_MAX_SAMPLE_AGE_MS: i64 = 200;

    /// Reads the `MAVERIC_*` overrides on top of the defaults. A value that
    /// fails to parse is logged and ignored, never fatal.
    pub fn from_env() -> Self {
        Self {
            start_angle: env_f32("MAVERIC_START_ANGLE", Self::DEF_START_ANGLE_DEG).to_radians(),
            roll_done_angle: env_f32("MAVERIC_ROLL_DONE_ANGLE", Self::DEF_ROLL_DONE_ANGLE_DEG)
                .to_radians(),
            recover_angle: env_f32("MAVERIC_RECOVER_ANGLE", Self::DEF_RECOVER_ANGLE_DEG)
                .to_radians(),
            start_timeout: TimeDelta::milliseconds(env_ms(
                "MAVERIC_START_TIMEOUT_MS",
                Self::DEF_START_TIMEOUT_MS,
            )),
            roll_watchdog: TimeDelta::milliseconds(env_ms(
                "MAVERIC_ROLL_WATCHDOG_MS",
                Self::DEF_ROLL_WATCHDOG_MS,
            )),
            recover_watchdog: TimeDelta::milliseconds(env_ms(
                "MAVERIC_RECOVER_WATCHDOG_MS",
                Self::DEF_RECOVER_WATCHDOG_MS,
            )),
            rotation_rate: env_f32("MAVERIC_ROTATION_RATE", Self::DEF_ROTATION_RATE_DEG)
                .to_radians(),
            hover_thrust: env_f32("MAVERIC_HOVER_THRUST", Self::DEF_HOVER_THRUST),
            thrust_boost: env_f32("MAVERIC_THRUST_BOOST", Self::DEF_THRUST_BOOST),
            thrust_cut: env_f32("MAVERIC_THRUST_CUT", Self::DEF_THRUST_CUT),
            level_gain: env_f32("MAVERIC_LEVEL_GAIN", Self::DEF_LEVEL_GAIN),
            max_sample_age: TimeDelta::milliseconds(env_ms(
                "MAVERIC_MAX_SAMPLE_AGE_MS",
                Self::DEF_MAX_SAMPLE_AGE_MS,
            )),
        }
    }
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            start_angle: Self::DEF_START_ANGLE_DEG.to_radians(),
            roll_done_angle: Self::DEF_ROLL_DONE_ANGLE_DEG.to_radians(),
            recover_angle: Self::DEF_RECOVER_ANGLE_DEG.to_radians(),
            start_timeout: TimeDelta::milliseconds(Self::DEF_START_TIMEOUT_MS),
            roll_watchdog: TimeDelta::milliseconds(Self::DEF_ROLL_WATCHDOG_MS),
            recover_watchdog: TimeDelta::milliseconds(Self::DEF_RECOVER_WATCHDOG_MS),
            rotation_rate: Self::DEF_ROTATION_RATE_DEG.to_radians(),
            hover_thrust: Self::DEF_HOVER_THRUST,
            thrust_boost: Self::DEF_THRUST_BOOST,
            thrust_cut: Self::DEF_THRUST_CUT,
            level_gain: Self::DEF_LEVEL_GAIN,
            max_sample_age: TimeDelta::milliseconds(Self::DEF_MAX_SAMPLE_AGE_MS),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {raw:?} for {key}.");
            default
        }),
        Err(_) => default,
    }
}

fn env_ms(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value {raw:?} for {key}.");
            default
        }),
        Err(_) => default,
    }
}
