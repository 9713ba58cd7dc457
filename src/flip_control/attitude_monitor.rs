use crate::telemetry::AttitudeSample;
use crate::warn;
use tokio::sync::watch;

/// Read-only adapter over the attitude topic. Each tick the newest sample,
/// if any, is copied into the working view; otherwise the machine keeps
/// ticking on the previous one. A missing update is not an error.
pub struct AttitudeMonitor {
    rx: watch::Receiver<AttitudeSample>,
    latest: AttitudeSample,
    estimator_gone: bool,
}

impl AttitudeMonitor {
    pub fn new(rx: watch::Receiver<AttitudeSample>) -> Self {
        let latest = *rx.borrow();
        Self { rx, latest, estimator_gone: false }
    }

    /// Copies a newer sample into the working view if one arrived since the
    /// last tick. Returns whether the view changed. Newness is judged by the
    /// estimator timestamp, not by channel bookkeeping, since the waiting
    /// side of the loop already consumes the change notification.
    pub fn refresh(&mut self) -> bool {
        if self.rx.has_changed().is_err() {
            self.note_estimator_gone();
        }
        let current = *self.rx.borrow_and_update();
        if current.timestamp != self.latest.timestamp {
            self.latest = current;
            true
        } else {
            false
        }
    }

    /// Resolves when a new sample is published. Never resolves once the
    /// estimator side is gone, so a closed channel degrades to pure
    /// timeout-driven ticking instead of a busy loop.
    pub async fn wait_new(&mut self) {
        if self.rx.changed().await.is_err() {
            self.note_estimator_gone();
            std::future::pending::<()>().await;
        }
    }

    pub fn sample(&self) -> &AttitudeSample { &self.latest }

    fn note_estimator_gone(&mut self) {
        if !self.estimator_gone {
            warn!("Attitude estimator channel closed; continuing on stale data.");
            self.estimator_gone = true;
        }
    }
}
