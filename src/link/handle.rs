//! Cloneable front end to a running [`ConnectionManager`](super::ConnectionManager).
//!
//! Commands are queued to the manager's run loop and processed between
//! notifications, so session start/stop never races with a frame in flight.
//! Observable values are read from `watch` channels and may lag the manager
//! by one update.

use tokio::sync::{mpsc, oneshot, watch};

use super::state::ConnectionState;
use crate::error::{ReceiverError, Result};
use crate::session::SessionOutcome;
use crate::telemetry::{DecodeStats, Readings, WindowPoint, WindowSummary};

/// Requests processed by the manager's run loop
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Shutdown,
    StartSession(oneshot::Sender<Result<()>>),
    StopSession(oneshot::Sender<Result<SessionOutcome>>),
    ExportLastSession(oneshot::Sender<Result<SessionOutcome>>),
    WindowSnapshot(oneshot::Sender<Vec<WindowPoint>>),
    WindowSummary(oneshot::Sender<WindowSummary>),
    DecodeStats(oneshot::Sender<DecodeStats>),
}

/// Handle used by the UI layer to drive and observe the receiver
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    readings: watch::Receiver<Readings>,
    logging: watch::Receiver<bool>,
    scan_seconds: watch::Receiver<u64>,
    fault: watch::Receiver<Option<String>>,
}

impl ReceiverHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<ConnectionState>,
        readings: watch::Receiver<Readings>,
        logging: watch::Receiver<bool>,
        scan_seconds: watch::Receiver<u64>,
        fault: watch::Receiver<Option<String>>,
    ) -> Self {
        Self {
            commands,
            state,
            readings,
            logging,
            scan_seconds,
            fault,
        }
    }

    /// Start scanning for the transmitter. No effect unless idle.
    pub async fn connect(&self) -> Result<()> {
        self.send(Command::Connect).await
    }

    /// Cancel any attempt, release the link and stay idle.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Release the link and stop the manager's run loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Start a logging session
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyActive`: a session is already running
    /// - `Closed`: the manager has stopped
    pub async fn start_session(&self) -> Result<()> {
        self.request(Command::StartSession).await?
    }

    /// Stop the logging session and export it
    ///
    /// # Errors
    ///
    /// - `SessionNotActive`: no session is running
    /// - `Export`: writing failed; the rows are kept for `export_last_session`
    /// - `Closed`: the manager has stopped
    pub async fn stop_session(&self) -> Result<SessionOutcome> {
        self.request(Command::StopSession).await?
    }

    /// Retry a failed export, or return the last exported file.
    pub async fn export_last_session(&self) -> Result<SessionOutcome> {
        self.request(Command::ExportLastSession).await?
    }

    /// Copy of the live display window, oldest first.
    pub async fn window_snapshot(&self) -> Result<Vec<WindowPoint>> {
        self.request(Command::WindowSnapshot).await
    }

    /// Point count, newest point and value range of the display window.
    pub async fn window_summary(&self) -> Result<WindowSummary> {
        self.request(Command::WindowSummary).await
    }

    /// Accepted/rejected frame counters.
    pub async fn decode_stats(&self) -> Result<DecodeStats> {
        self.request(Command::DecodeStats).await
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Latest baseline, reference, reading and derived value.
    pub fn readings(&self) -> Readings {
        *self.readings.borrow()
    }

    /// Whether a logging session is running.
    pub fn is_logging(&self) -> bool {
        *self.logging.borrow()
    }

    /// Whole seconds spent in the current scanning phase.
    pub fn scan_seconds(&self) -> u64 {
        *self.scan_seconds.borrow()
    }

    /// Last error that stopped the manager from retrying, e.g. a denied
    /// radio permission. Cleared on the next `connect`.
    pub fn fault(&self) -> Option<String> {
        self.fault.borrow().clone()
    }

    /// Receiver notified on every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receiver notified on every processed frame.
    pub fn watch_readings(&self) -> watch::Receiver<Readings> {
        self.readings.clone()
    }

    /// Receiver notified on every scan-counter tick.
    pub fn watch_scan_seconds(&self) -> watch::Receiver<u64> {
        self.scan_seconds.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ReceiverError::Closed)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx.await.map_err(|_| ReceiverError::Closed)
    }
}
