//! # Telemetry Receiver Library
//!
//! Receive calibration telemetry from a wireless transmitter over BLE.
//!
//! This library provides the core functionality for discovering the
//! transmitter, keeping the link alive, decoding its notification frames
//! into baseline-relative values, and logging sessions to CSV.

pub mod config;
pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod session;
pub mod link;
