//! # Telemetry Module
//!
//! Turns decoded samples into live readings.
//!
//! This module handles:
//! - Tracking calibration state (baseline, reference, last reading)
//! - Deriving the baseline-relative value
//! - Keeping a trailing time window of values for display
//! - Running each frame through decode, derive, window and session log

pub mod deriver;
pub mod window;
pub mod pipeline;

pub use deriver::{CalibrationState, ValueDeriver};
pub use pipeline::{DecodeStats, Readings, TelemetryPipeline, WindowSummary};
pub use window::{TelemetryWindow, WindowPoint};
