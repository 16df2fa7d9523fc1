//! # Telemetry Pipeline
//!
//! Runs one notification through decode, derive, window and session log, and
//! publishes the resulting readings.
//!
//! The pipeline is owned by the connection manager's run loop, which is the
//! only caller. Frames and session commands therefore never interleave.
//! The published [`Readings`] are a projection for observers; arithmetic
//! always uses the deriver's own state.

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::deriver::{CalibrationState, ValueDeriver};
use super::window::{TelemetryWindow, WindowPoint};
use crate::error::Result;
use crate::protocol::decode_frame;
use crate::session::{SessionLogger, SessionOutcome};

/// Observable snapshot of the latest values
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    /// Current baseline
    pub baseline: Option<f64>,
    /// Current reference voltage
    pub reference: Option<f64>,
    /// Latest raw reading
    pub reading: Option<f64>,
    /// `reading - baseline`
    pub value: Option<f64>,
}

impl From<&CalibrationState> for Readings {
    fn from(state: &CalibrationState) -> Self {
        Self {
            baseline: state.baseline,
            reference: state.reference,
            reading: state.last_reading,
            value: state.derived_value(),
        }
    }
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames decoded successfully
    pub accepted: u64,
    /// Frames dropped as malformed
    pub rejected: u64,
}

/// Display window overview for status output
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    /// Retained points
    pub points: usize,
    /// Newest point
    pub latest: Option<WindowPoint>,
    /// Smallest and largest retained value
    pub range: Option<(f64, f64)>,
}

/// Decoder, deriver, window and logger wired together
#[derive(Debug)]
pub struct TelemetryPipeline {
    deriver: ValueDeriver,
    window: TelemetryWindow,
    logger: SessionLogger,
    stats: DecodeStats,
    readings_tx: watch::Sender<Readings>,
    logging_tx: watch::Sender<bool>,
}

impl TelemetryPipeline {
    /// Creates a pipeline with empty calibration.
    pub fn new(window: TelemetryWindow, logger: SessionLogger) -> Self {
        let (readings_tx, _) = watch::channel(Readings::default());
        let (logging_tx, _) = watch::channel(false);

        Self {
            deriver: ValueDeriver::new(),
            window,
            logger,
            stats: DecodeStats::default(),
            readings_tx,
            logging_tx,
        }
    }

    /// Process one raw frame
    ///
    /// Malformed frames are counted and dropped.
    ///
    /// # Returns
    ///
    /// * `Option<f64>` - Derived value, if the frame decoded and a baseline is known
    pub fn on_frame(&mut self, frame: &[u8]) -> Option<f64> {
        let sample = match decode_frame(frame, Instant::now()) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.rejected += 1;
                debug!("Dropping frame: {}", e);
                return None;
            }
        };
        self.stats.accepted += 1;

        let value = self.deriver.apply(&sample);
        let calibration = *self.deriver.state();

        if let Some(value) = value {
            self.window.insert(value, sample.received_at);
            self.logger.record(value, &calibration);
        }

        self.readings_tx.send_replace(Readings::from(&calibration));
        value
    }

    /// Start a logging session with the current baseline in its header.
    pub fn start_session(&mut self) -> Result<()> {
        let result = self.logger.start_session(self.deriver.state().baseline);
        self.publish_logging();
        result
    }

    /// Stop the logging session and export it.
    pub fn stop_session(&mut self) -> Result<SessionOutcome> {
        let result = self.logger.stop_session();
        self.publish_logging();
        result
    }

    /// Retry or repeat the export of the last stopped session.
    pub fn export_last_session(&mut self) -> Result<SessionOutcome> {
        self.logger.export_last_session()
    }

    /// Clear calibration and the display window.
    pub fn reset_calibration(&mut self) {
        self.deriver.reset();
        self.window.clear();
        self.readings_tx.send_replace(Readings::default());
    }

    /// Current calibration state.
    pub fn calibration(&self) -> &CalibrationState {
        self.deriver.state()
    }

    /// Copy of the display window.
    pub fn window_snapshot(&self) -> Vec<WindowPoint> {
        self.window.snapshot()
    }

    /// Size, newest point and value range of the display window.
    pub fn window_summary(&self) -> WindowSummary {
        WindowSummary {
            points: self.window.len(),
            latest: self.window.latest(),
            range: self.window.value_range(),
        }
    }

    /// Frame counters.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Whether a logging session is running.
    pub fn is_logging(&self) -> bool {
        self.logger.is_active()
    }

    /// Subscribe to readings updates.
    pub fn subscribe_readings(&self) -> watch::Receiver<Readings> {
        self.readings_tx.subscribe()
    }

    /// Subscribe to the logging flag.
    pub fn subscribe_logging(&self) -> watch::Receiver<bool> {
        self.logging_tx.subscribe()
    }

    fn publish_logging(&self) {
        self.logging_tx.send_replace(self.logger.is_active());
    }
}
