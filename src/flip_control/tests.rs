use super::command_listener::CommandListener;
use super::config::FlipConfig;
use super::flip_state::FlipState;
use super::mode_arbiter::ModeArbiter;
use super::rate_publisher::RateSetpointPublisher;
use super::state_machine::FlipStateMachine;
use super::supervisor::FlipSupervisor;
use crate::telemetry::{
    AttitudeSample, CommandKind, ControlModeFlags, MavericCommand, RateSetpoint, TelemetryBus,
    VehicleStatus, CMD_FLIP_ABORT, CMD_FLIP_START,
};
use crate::{info, log};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::f32::consts::PI;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

struct Rig {
    machine: FlipStateMachine,
    control_rx: watch::Receiver<ControlModeFlags>,
    rates_rx: watch::Receiver<Option<RateSetpoint>>,
    status_rx: watch::Receiver<VehicleStatus>,
}

fn rig_with(config: FlipConfig, initial_flags: ControlModeFlags) -> Rig {
    let (control_tx, control_rx) = watch::channel(initial_flags);
    let (rates_tx, rates_rx) = watch::channel(None);
    let (status_tx, status_rx) = watch::channel(VehicleStatus::new(0));
    let arbiter = ModeArbiter::new(control_tx);
    let rates = RateSetpointPublisher::new(rates_tx);
    let machine = FlipStateMachine::new(config, arbiter, rates, status_tx);
    Rig { machine, control_rx, rates_rx, status_rx }
}

fn rig() -> Rig { rig_with(FlipConfig::default(), ControlModeFlags::NOMINAL) }

fn wrap_deg(deg: f32) -> f32 {
    let mut rad = deg.to_radians();
    while rad > PI {
        rad -= 2.0 * PI;
    }
    while rad <= -PI {
        rad += 2.0 * PI;
    }
    rad
}

fn sample_deg(roll_deg: f32, t: DateTime<Utc>) -> AttitudeSample {
    AttitudeSample { roll: wrap_deg(roll_deg), ..AttitudeSample::level(t) }
}

fn start_cmd() -> Option<MavericCommand> { Some(MavericCommand::decode(CMD_FLIP_START)) }

fn abort_cmd() -> Option<MavericCommand> { Some(MavericCommand::decode(CMD_FLIP_ABORT)) }

#[test]
fn full_cycle_follows_the_roll_sweep_and_restores_flags() {
    let mut r = rig();
    let captured_before = *r.control_rx.borrow();
    let t0 = Utc::now();

    r.machine.tick(t0, start_cmd(), &sample_deg(0.0, t0));
    assert_eq!(r.machine.state(), FlipState::Start);
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::REVOKED);

    let mut t = t0;
    for deg in [10.0, 20.0, 30.0, 40.0, 50.0] {
        t += TimeDelta::milliseconds(10);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert_eq!(r.machine.state(), FlipState::Roll);
    let roll_sp = r.rates_rx.borrow().unwrap();
    assert!((roll_sp.roll_rate - 400.0_f32.to_radians()).abs() < 1e-4);
    assert!((roll_sp.thrust - 0.26).abs() < 1e-5);

    for deg in [80.0, 110.0, 140.0, 170.0, 200.0, 230.0, 260.0, 280.0] {
        t += TimeDelta::milliseconds(10);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert_eq!(r.machine.state(), FlipState::Recover);

    for deg in [300.0, 330.0, 357.0] {
        t += TimeDelta::milliseconds(10);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert_eq!(r.machine.state(), FlipState::Finished);
    assert_eq!(*r.control_rx.borrow(), captured_before);

    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, None, &sample_deg(357.0, t));
    assert_eq!(r.machine.state(), FlipState::Disabled);
    assert_eq!(r.status_rx.borrow().flip_state, 0);
    assert_eq!(*r.rates_rx.borrow(), None);
    info!("Full cycle completed in {}ms of simulated time.", (t - t0).num_milliseconds());
}

#[test]
fn start_segment_has_boosted_thrust_and_zero_rates() {
    let mut r = rig();
    let t0 = Utc::now();
    r.machine.tick(t0, start_cmd(), &sample_deg(0.0, t0));
    let sp = r.rates_rx.borrow().unwrap();
    assert_eq!(sp.roll_rate, 0.0);
    assert!((sp.thrust - 0.70).abs() < 1e-5);
}

#[test]
fn start_times_out_into_roll_without_telemetry_progress() {
    let mut r = rig();
    let t0 = Utc::now();
    r.machine.tick(t0, start_cmd(), &sample_deg(0.0, t0));
    assert_eq!(r.machine.state(), FlipState::Start);

    // same (stale) roll angle the whole time, only the clock advances
    let t = t0 + TimeDelta::milliseconds(510);
    r.machine.tick(t, None, &sample_deg(0.0, t));
    assert_eq!(r.machine.state(), FlipState::Roll);
}

#[test]
fn watchdogs_bound_the_authority_hold() {
    let mut r = rig();
    let t0 = Utc::now();
    r.machine.tick(t0, start_cmd(), &sample_deg(30.0, t0));
    assert_eq!(r.machine.state(), FlipState::Start);

    // roll angle frozen at 30 deg: no rotation progress, no recovery level
    let mut t = t0;
    let deadline = t0 + TimeDelta::milliseconds(500 + 2500 + 2000 + 300);
    while r.machine.state() != FlipState::Disabled {
        t += TimeDelta::milliseconds(100);
        assert!(t <= deadline, "machine still in {} past the watchdog bound", r.machine.state());
        r.machine.tick(t, None, &sample_deg(30.0, t));
    }
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::NOMINAL);
    log!("Watchdog escape took {}ms.", (t - t0).num_milliseconds());
}

#[test]
fn abort_is_immediate_in_roll() {
    let mut r = rig();
    let mut t = Utc::now();
    r.machine.tick(t, start_cmd(), &sample_deg(0.0, t));
    for deg in [20.0, 40.0, 60.0] {
        t += TimeDelta::milliseconds(10);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert_eq!(r.machine.state(), FlipState::Roll);

    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, abort_cmd(), &sample_deg(80.0, t));
    assert_eq!(r.machine.state(), FlipState::Disabled);
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::NOMINAL);
    assert_eq!(*r.rates_rx.borrow(), None);
}

#[test]
fn reentrant_start_neither_reenters_nor_recaptures() {
    let mut r = rig();
    let mut t = Utc::now();
    r.machine.tick(t, start_cmd(), &sample_deg(0.0, t));
    for deg in [20.0, 40.0, 60.0] {
        t += TimeDelta::milliseconds(10);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert_eq!(r.machine.state(), FlipState::Roll);

    // a second start while rolling must not re-enter Start or touch the capture
    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, start_cmd(), &sample_deg(70.0, t));
    assert_eq!(r.machine.state(), FlipState::Roll);

    // if the flags had been re-captured mid-flip, this restore would hand
    // back the revoked set instead of the nominal one
    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, abort_cmd(), &sample_deg(80.0, t));
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::NOMINAL);
}

#[test]
fn start_is_rejected_on_stale_telemetry() {
    let mut r = rig();
    let t0 = Utc::now();
    let old_sample = sample_deg(0.0, t0 - TimeDelta::milliseconds(500));
    r.machine.tick(t0, start_cmd(), &old_sample);
    assert_eq!(r.machine.state(), FlipState::Disabled);
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::NOMINAL);
}

#[test]
fn start_is_rejected_without_attitude_authority() {
    let manual_only =
        ControlModeFlags { manual_enabled: true, attitude_enabled: false };
    let mut r = rig_with(FlipConfig::default(), manual_only);
    let t0 = Utc::now();
    r.machine.tick(t0, start_cmd(), &sample_deg(0.0, t0));
    assert_eq!(r.machine.state(), FlipState::Disabled);
    assert_eq!(*r.control_rx.borrow(), manual_only);
}

#[test]
fn no_setpoints_are_published_after_the_cycle_ends() {
    let mut r = rig();
    let mut t = Utc::now();
    r.machine.tick(t, start_cmd(), &sample_deg(0.0, t));
    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, abort_cmd(), &sample_deg(5.0, t));
    assert_eq!(r.machine.state(), FlipState::Disabled);

    // drain the None published by the abort, then expect silence
    assert_eq!(*r.rates_rx.borrow_and_update(), None);
    for deg in [10.0, 20.0, 30.0] {
        t += TimeDelta::milliseconds(100);
        r.machine.tick(t, None, &sample_deg(deg, t));
    }
    assert!(!r.rates_rx.has_changed().unwrap());
}

#[test]
fn restored_flags_equal_the_capture_not_the_default() {
    // a non-nominal pre-flip configuration must come back verbatim
    let attitude_only =
        ControlModeFlags { manual_enabled: false, attitude_enabled: true };
    let mut r = rig_with(FlipConfig::default(), attitude_only);
    let mut t = Utc::now();
    r.machine.tick(t, start_cmd(), &sample_deg(0.0, t));
    assert_eq!(*r.control_rx.borrow(), ControlModeFlags::REVOKED);
    t += TimeDelta::milliseconds(10);
    r.machine.tick(t, abort_cmd(), &sample_deg(5.0, t));
    assert_eq!(*r.control_rx.borrow(), attitude_only);
}

#[test]
fn arbiter_pairs_override_and_restore_exactly_once() {
    let (control_tx, control_rx) = watch::channel(ControlModeFlags::NOMINAL);
    let mut arbiter = ModeArbiter::new(control_tx);

    arbiter.override_authority();
    assert_eq!(*control_rx.borrow(), ControlModeFlags::REVOKED);
    assert!(arbiter.override_outstanding());

    // a second override keeps the first capture
    arbiter.override_authority();
    assert_eq!(*control_rx.borrow(), ControlModeFlags::REVOKED);

    arbiter.restore_authority();
    assert_eq!(*control_rx.borrow(), ControlModeFlags::NOMINAL);
    assert!(!arbiter.override_outstanding());

    // restore without a capture is a logged defect that still publishes a
    // safe configuration
    arbiter.restore_authority();
    assert_eq!(*control_rx.borrow(), ControlModeFlags::NOMINAL);
}

#[test]
fn command_listener_delivers_only_the_latest_pending_command() {
    let bus = TelemetryBus::new();
    let publisher = bus.command_publisher();
    let mut listener = CommandListener::new(bus.subscribe_commands());

    assert!(listener.poll().is_none());

    publisher.publish_raw(CMD_FLIP_START).unwrap();
    let first = listener.poll().unwrap();
    assert_eq!(first.kind(), CommandKind::FlipStart);
    assert!(listener.poll().is_none(), "a command must be consumed once");

    // two commands inside one tick: only the latest survives
    publisher.publish_raw(CMD_FLIP_START).unwrap();
    publisher.publish_raw(CMD_FLIP_ABORT).unwrap();
    let second = listener.poll().unwrap();
    assert_eq!(second.kind(), CommandKind::FlipAbort);

    publisher.publish_raw(999).unwrap();
    let third = listener.poll().unwrap();
    assert_eq!(third.kind(), CommandKind::Other);
    assert_eq!(third.raw_code(), 999);
}

#[test]
fn fuzzed_ticks_only_take_edges_from_the_transition_table() {
    let mut r = rig();
    let mut rng = rand::rng();
    let mut t = Utc::now();
    let mut roll_deg: f32 = 0.0;

    let allowed = |from: FlipState, to: FlipState| -> bool {
        use FlipState::{Disabled, Finished, Recover, Roll, Start};
        from == to
            || matches!(
                (from, to),
                (Disabled, Start)
                    | (Start, Roll)
                    | (Roll, Recover)
                    | (Recover, Finished)
                    | (Finished, Disabled)
                    | (Start, Disabled)
                    | (Roll, Disabled)
                    | (Recover, Disabled)
            )
    };

    for _ in 0..5000 {
        t += TimeDelta::milliseconds(10);
        roll_deg += rng.random_range(-5.0..25.0);
        let command = match rng.random_range(0..20) {
            0 => start_cmd(),
            1 => abort_cmd(),
            2 => Some(MavericCommand::decode(rng.random_range(3..100))),
            _ => None,
        };
        let before = r.machine.state();
        r.machine.tick(t, command, &sample_deg(roll_deg, t));
        let after = r.machine.state();
        assert!(allowed(before, after), "illegal edge {before} -> {after}");
    }
}

#[test]
fn config_env_overrides_fall_back_on_garbage() {
    // one test owns all MAVERIC_* variables to keep parallel tests honest
    unsafe {
        std::env::set_var("MAVERIC_START_ANGLE", "not-a-number");
        std::env::set_var("MAVERIC_ROLL_WATCHDOG_MS", "1234");
    }
    let config = FlipConfig::from_env();
    assert!((config.start_angle - 45.0_f32.to_radians()).abs() < 1e-6);
    assert_eq!(config.roll_watchdog, TimeDelta::milliseconds(1234));
    unsafe {
        std::env::remove_var("MAVERIC_START_ANGLE");
        std::env::remove_var("MAVERIC_ROLL_WATCHDOG_MS");
    }
}

async fn wait_for_flags(
    control_rx: &mut watch::Receiver<ControlModeFlags>,
    target: ControlModeFlags,
    within: Duration,
) -> bool {
    tokio::time::timeout(within, async {
        while *control_rx.borrow_and_update() != target {
            if control_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    })
    .await
    .is_ok()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_runs_a_full_cycle_over_the_bus() {
    let mut bus = TelemetryBus::new();
    let cancel = CancellationToken::new();
    let (supervisor, handle) = FlipSupervisor::new(&mut bus, FlipConfig::default(), cancel);
    let attitude = bus.attitude_publisher();
    let commands = bus.command_publisher();
    let mut control_rx = bus.subscribe_control_mode();
    let mut status_rx = bus.subscribe_status();
    let rates_rx = bus.subscribe_rates();
    let task = tokio::spawn(supervisor.run());

    attitude.publish(AttitudeSample::level(Utc::now())).unwrap();
    commands.publish_raw(CMD_FLIP_START).unwrap();
    assert!(
        wait_for_flags(&mut control_rx, ControlModeFlags::REVOKED, Duration::from_secs(2)).await,
        "authority was never revoked"
    );

    let mut deg = 0.0_f32;
    while deg < 280.0 {
        deg += 20.0;
        attitude.publish(sample_deg(deg, Utc::now())).unwrap();
        tokio::time::sleep(Duration::from_millis(12)).await;
    }
    for _ in 0..10 {
        attitude.publish(sample_deg(357.0, Utc::now())).unwrap();
        tokio::time::sleep(Duration::from_millis(12)).await;
    }

    // watchdogs bound this even if the sweep raced the state machine
    assert!(
        wait_for_flags(&mut control_rx, ControlModeFlags::NOMINAL, Duration::from_secs(6)).await,
        "authority was never handed back"
    );
    assert!(
        tokio::time::timeout(Duration::from_secs(2), async {
            while status_rx.borrow_and_update().flip_state != FlipState::Disabled.as_raw() {
                status_rx.changed().await.unwrap();
            }
        })
        .await
        .is_ok(),
        "status never returned to disabled"
    );
    assert_eq!(*rates_rx.borrow(), None);

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_applies_diagnostic_force_sets() {
    let mut bus = TelemetryBus::new();
    let cancel = CancellationToken::new();
    let (supervisor, handle) = FlipSupervisor::new(&mut bus, FlipConfig::default(), cancel);
    let mut control_rx = bus.subscribe_control_mode();
    let task = tokio::spawn(supervisor.run());

    assert!(handle.force_state(FlipState::Roll).await);
    assert!(
        wait_for_flags(&mut control_rx, ControlModeFlags::REVOKED, Duration::from_secs(2)).await
    );

    assert!(handle.force_state(FlipState::Disabled).await);
    assert!(
        wait_for_flags(&mut control_rx, ControlModeFlags::NOMINAL, Duration::from_secs(2)).await
    );

    handle.stop();
    task.await.unwrap();
}
