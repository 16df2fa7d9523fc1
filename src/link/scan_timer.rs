//! # Scan Timer
//!
//! Counts whole seconds spent in the current scanning phase.
//!
//! The counter is a spawned repeating task owned by a [`ScanTimer`] guard.
//! Dropping the guard aborts the task, so the counter cannot outlive the
//! scanning state that created it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Tick period of the counter
pub const SCAN_TICK: Duration = Duration::from_secs(1);

/// Running scan-duration counter; stops when dropped
#[derive(Debug)]
pub struct ScanTimer {
    task: JoinHandle<()>,
}

impl ScanTimer {
    /// Reset `elapsed` to 0 and start counting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(elapsed: Arc<watch::Sender<u64>>) -> Self {
        elapsed.send_replace(0);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + SCAN_TICK, SCAN_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                elapsed.send_modify(|seconds| *seconds += 1);
            }
        });

        Self { task }
    }
}

impl Drop for ScanTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
