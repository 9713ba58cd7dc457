#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod console;
mod flip_control;
mod logger;
mod telemetry;

use crate::console::{ConsoleEndpoint, DownstreamMessage, UpstreamMessage};
use crate::flip_control::{FlipConfig, FlipState, FlipSupervisor};
use crate::telemetry::TelemetryBus;
use std::process::{Command, Stdio, exit};
use std::str::FromStr;
use std::time::Duration;
use std::{env, thread};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONSOLE_BIND: &str = "127.0.0.1:4207";
const START_POLL_INTERVAL: Duration = Duration::from_millis(100);
const START_POLL_TRIES: u32 = 20;

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(verb) = args.get(1) else {
        warn!("usage: maveric-ob {{start|stop|status|state|change|cmd}}");
        exit(1);
    };
    let code = match verb.as_str() {
        "start" => cli_start(),
        "daemon" => {
            daemon_main();
            0
        }
        "stop" => cli_stop(),
        "status" => cli_status(),
        "state" => cli_state(),
        "change" => cli_change(args.get(2).map(String::as_str)),
        "cmd" => cli_cmd(args.get(2).map(String::as_str)),
        _ => {
            warn!("unrecognized command");
            1
        }
    };
    exit(code);
}

fn console_addr() -> String {
    env::var("MAVERIC_CONSOLE_BIND").unwrap_or_else(|_| DEFAULT_CONSOLE_BIND.to_string())
}

/// Spawns the daemon process and waits for its console endpoint to answer.
fn cli_start() -> i32 {
    let addr = console_addr();
    if console::reachable(&addr) {
        warn!("already running");
        return 1;
    }
    let exe = match env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!("start failed: {e}");
            return 1;
        }
    };
    if let Err(e) = Command::new(exe).arg("daemon").stdin(Stdio::null()).spawn() {
        error!("start failed: {e}");
        return 1;
    }
    for _ in 0..START_POLL_TRIES {
        if console::reachable(&addr) {
            info!("maveric-ob daemon running.");
            return 0;
        }
        thread::sleep(START_POLL_INTERVAL);
    }
    error!("start failed: console endpoint did not come up");
    1
}

fn cli_stop() -> i32 {
    match console::request(&console_addr(), &UpstreamMessage::Stop) {
        Ok(DownstreamMessage::Ack) => {
            info!("maveric-ob stopped.");
            0
        }
        Ok(reply) => {
            error!("unexpected reply: {reply:?}");
            1
        }
        Err(_) => {
            warn!("not running");
            1
        }
    }
}

fn cli_status() -> i32 {
    if console::reachable(&console_addr()) {
        info!("running");
        0
    } else {
        warn!("not running");
        1
    }
}

fn cli_state() -> i32 {
    match console::request(&console_addr(), &UpstreamMessage::State) {
        Ok(DownstreamMessage::State(raw)) => {
            let state = FlipState::from_repr(raw).unwrap_or(FlipState::Disabled);
            info!("Current flip state is {state}");
            0
        }
        Ok(reply) => {
            error!("unexpected reply: {reply:?}");
            1
        }
        Err(_) => {
            warn!("not running");
            1
        }
    }
}

fn cli_change(arg: Option<&str>) -> i32 {
    let Some(name) = arg else {
        warn!("missing argument");
        return 1;
    };
    let Ok(target) = FlipState::from_str(name) else {
        warn!("unknown flip state {name:?}; expected one of disabled|start|roll|recover|finished");
        return 1;
    };
    match console::request(&console_addr(), &UpstreamMessage::SetState(target.as_raw())) {
        Ok(DownstreamMessage::Ack) => {
            info!("Flip state forced to {target}.");
            0
        }
        Ok(DownstreamMessage::Rejected(reason)) => {
            error!("change rejected: {reason}");
            1
        }
        Ok(reply) => {
            error!("unexpected reply: {reply:?}");
            1
        }
        Err(_) => {
            warn!("not running");
            1
        }
    }
}

fn cli_cmd(arg: Option<&str>) -> i32 {
    let Some(raw) = arg else {
        warn!("missing argument");
        return 1;
    };
    let Ok(code) = raw.parse::<u16>() else {
        warn!("invalid command code {raw:?}");
        return 1;
    };
    match console::request(&console_addr(), &UpstreamMessage::Command(code)) {
        Ok(DownstreamMessage::Ack) => 0,
        Ok(DownstreamMessage::Rejected(reason)) => {
            error!("command rejected: {reason}");
            1
        }
        Ok(reply) => {
            error!("unexpected reply: {reply:?}");
            1
        }
        Err(_) => {
            warn!("not running");
            1
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn daemon_main() {
    let config = FlipConfig::from_env();
    let mut bus = TelemetryBus::new();
    let cancel = CancellationToken::new();
    let (supervisor, handle) = FlipSupervisor::new(&mut bus, config, cancel.clone());
    let _endpoint = match ConsoleEndpoint::start(&console_addr(), handle).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Console endpoint bind failed: {e}.");
            exit(1);
        }
    };
    info!("maveric-ob daemon started.");
    supervisor.run().await;
    info!("maveric-ob daemon exiting.");
}
