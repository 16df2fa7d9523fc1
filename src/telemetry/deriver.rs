//! # Value Deriver
//!
//! Maintains calibration state and computes the baseline-relative value.
//!
//! Every sample overwrites the last reading with its secondary value. A `B`
//! sample also replaces the baseline, a `V` sample the reference voltage. The
//! derived value is `reading - baseline` and stays absent until a baseline has
//! been seen.
//!
//! State is updated in place before the derived value is computed, so a
//! baseline frame and its own derived value always agree.
//!
//! ## Usage
//!
//! ```
//! use telemetry_receiver::protocol::{decode_frame};
//! use telemetry_receiver::telemetry::ValueDeriver;
//! use tokio::time::Instant;
//!
//! let mut deriver = ValueDeriver::new();
//!
//! // Reading without a baseline yet
//! let sample = decode_frame(b"V0.5,1.2", Instant::now()).unwrap();
//! assert_eq!(deriver.apply(&sample), None);
//!
//! let sample = decode_frame(b"B1.0,1.25", Instant::now()).unwrap();
//! assert_eq!(deriver.apply(&sample), Some(0.25));
//! ```

use crate::protocol::{Sample, SampleKind};

/// Calibration values known so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationState {
    /// Most recent baseline from a `B` frame
    pub baseline: Option<f64>,
    /// Most recent reference voltage from a `V` frame
    pub reference: Option<f64>,
    /// Secondary value of the most recent frame of either kind
    pub last_reading: Option<f64>,
}

impl CalibrationState {
    /// `last_reading - baseline`, when both are known.
    #[must_use]
    pub fn derived_value(&self) -> Option<f64> {
        match (self.baseline, self.last_reading) {
            (Some(baseline), Some(reading)) => Some(reading - baseline),
            _ => None,
        }
    }
}

/// Applies samples to the calibration state.
#[derive(Debug, Default)]
pub struct ValueDeriver {
    state: CalibrationState,
}

impl ValueDeriver {
    /// Creates a deriver with no calibration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates calibration from `sample` and returns the derived value.
    pub fn apply(&mut self, sample: &Sample) -> Option<f64> {
        self.state.last_reading = Some(sample.secondary);

        match sample.kind {
            SampleKind::Baseline => self.state.baseline = Some(sample.primary),
            SampleKind::Reference => self.state.reference = Some(sample.primary),
        }

        self.state.derived_value()
    }

    /// Current calibration state.
    #[must_use]
    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Forgets all calibration.
    pub fn reset(&mut self) {
        self.state = CalibrationState::default();
    }
}
