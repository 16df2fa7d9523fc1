//! # Session Logger
//!
//! Accumulates derived readings between `start_session` and `stop_session`.
//!
//! Rows are kept in memory until the session is stopped, then handed to the
//! [`CsvExporter`]. If the export fails the rows stay around and can be
//! exported again with [`SessionLogger::export_last_session`]; starting a new
//! session discards them.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::{info, warn};

use super::export::CsvExporter;
use crate::error::{ReceiverError, Result};
use crate::telemetry::CalibrationState;

/// One recorded sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    /// Seconds since the session started
    pub offset_seconds: f64,
    /// Baseline at the time of the sample
    pub baseline: Option<f64>,
    /// Reference voltage at the time of the sample
    pub reference: Option<f64>,
    /// Raw reading
    pub reading: f64,
    /// Derived value
    pub value: f64,
}

/// Metadata written above the rows
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHeader {
    /// Wall-clock session start
    pub started_at: DateTime<Local>,
    /// Baseline known when the session started
    pub baseline: Option<f64>,
}

/// A complete session: header plus rows
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLog {
    /// Session metadata
    pub header: SessionHeader,
    /// Recorded rows, in recording order
    pub entries: Vec<LogEntry>,
}

/// Result of stopping or exporting a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Rows were written to this file
    Exported(PathBuf),
    /// The session had no rows; nothing was written
    NothingLogged,
}

#[derive(Debug)]
enum SessionState {
    Inactive,
    Active { started: Instant, log: SessionLog },
}

/// Records derived values while a session is active
#[derive(Debug)]
pub struct SessionLogger {
    exporter: CsvExporter,
    state: SessionState,
    unexported: Option<SessionLog>,
    last_export: Option<PathBuf>,
}

impl SessionLogger {
    /// Creates an inactive logger writing through `exporter`.
    pub fn new(exporter: CsvExporter) -> Self {
        Self {
            exporter,
            state: SessionState::Inactive,
            unexported: None,
            last_export: None,
        }
    }

    /// Whether a session is running.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Number of rows recorded in the running session.
    pub fn row_count(&self) -> usize {
        match &self.state {
            SessionState::Active { log, .. } => log.entries.len(),
            SessionState::Inactive => 0,
        }
    }

    /// Whether a stopped session is still waiting for a successful export.
    pub fn has_unexported(&self) -> bool {
        self.unexported.is_some()
    }

    /// Start a new session
    ///
    /// # Arguments
    ///
    /// * `baseline` - Baseline known at start, written to the header
    ///
    /// # Errors
    ///
    /// Returns `SessionAlreadyActive` if a session is running.
    pub fn start_session(&mut self, baseline: Option<f64>) -> Result<()> {
        if self.is_active() {
            return Err(ReceiverError::SessionAlreadyActive);
        }

        if let Some(stale) = self.unexported.take() {
            warn!(
                "Discarding {} unexported rows from the previous session",
                stale.entries.len()
            );
        }

        let started_at = Local::now();
        info!("Logging session started at {}", started_at.format("%H:%M:%S"));

        self.state = SessionState::Active {
            started: Instant::now(),
            log: SessionLog {
                header: SessionHeader {
                    started_at,
                    baseline,
                },
                entries: Vec::new(),
            },
        };
        Ok(())
    }

    /// Append a row for `value` if a session is running.
    pub fn record(&mut self, value: f64, calibration: &CalibrationState) {
        let SessionState::Active { started, log } = &mut self.state else {
            return;
        };
        let Some(reading) = calibration.last_reading else {
            return;
        };

        log.entries.push(LogEntry {
            offset_seconds: Instant::now().duration_since(*started).as_secs_f64(),
            baseline: calibration.baseline,
            reference: calibration.reference,
            reading,
            value,
        });
    }

    /// Stop the running session and export it
    ///
    /// # Returns
    ///
    /// * `Result<SessionOutcome>` - Path of the export, or `NothingLogged`
    ///
    /// # Errors
    ///
    /// - `SessionNotActive`: no session is running
    /// - `Export`: the file could not be written; rows are kept for a retry
    pub fn stop_session(&mut self) -> Result<SessionOutcome> {
        let log = match std::mem::replace(&mut self.state, SessionState::Inactive) {
            SessionState::Active { log, .. } => log,
            SessionState::Inactive => return Err(ReceiverError::SessionNotActive),
        };

        if log.entries.is_empty() {
            info!("Logging session stopped, nothing logged");
            return Ok(SessionOutcome::NothingLogged);
        }

        info!("Logging session stopped with {} rows", log.entries.len());
        self.unexported = Some(log);
        self.export_last_session()
    }

    /// Export the last stopped session
    ///
    /// Writes the retained rows of a session whose export failed. When there
    /// is nothing pending, returns the path of the last successful export.
    ///
    /// # Errors
    ///
    /// Returns `Export` if writing fails; the rows remain retained.
    pub fn export_last_session(&mut self) -> Result<SessionOutcome> {
        let Some(log) = self.unexported.take() else {
            return Ok(self
                .last_export
                .clone()
                .map_or(SessionOutcome::NothingLogged, SessionOutcome::Exported));
        };

        match self.exporter.write(&log) {
            Ok(path) => {
                self.last_export = Some(path.clone());
                Ok(SessionOutcome::Exported(path))
            }
            Err(e) => {
                warn!("Session export failed, keeping {} rows: {}", log.entries.len(), e);
                self.unexported = Some(log);
                Err(e)
            }
        }
    }
}
