use crate::log;
use crate::telemetry::{CommandFrame, CommandKind, MavericCommand};
use crate::warn;
use tokio::sync::watch;

/// Read-only adapter over the command topic. Delivers at most one command
/// per tick; under latest-value delivery a command that is overwritten
/// before the next tick is dropped by design, never queued.
pub struct CommandListener {
    rx: watch::Receiver<Option<CommandFrame>>,
    last_seq: u64,
    source_gone: bool,
}

impl CommandListener {
    pub fn new(rx: watch::Receiver<Option<CommandFrame>>) -> Self {
        Self { rx, last_seq: 0, source_gone: false }
    }

    /// Returns the pending command, if one arrived since the last poll.
    /// Unrecognized codes are still delivered (as `Other`) so the state
    /// machine's match stays exhaustive, but they are logged here.
    pub fn poll(&mut self) -> Option<MavericCommand> {
        let frame = *self.rx.borrow_and_update();
        match frame {
            Some(frame) if frame.seq > self.last_seq => {
                self.last_seq = frame.seq;
                if frame.command.kind() == CommandKind::Other {
                    log!("Unrecognized maveric command code {}.", frame.command.raw_code());
                }
                Some(frame.command)
            }
            _ => None,
        }
    }

    /// Resolves when a new command frame is published; never resolves once
    /// every command source is gone.
    pub async fn wait_new(&mut self) {
        if self.rx.changed().await.is_err() {
            if !self.source_gone {
                warn!("Command channel closed; no further maveric commands will arrive.");
                self.source_gone = true;
            }
            std::future::pending::<()>().await;
        }
    }
}
