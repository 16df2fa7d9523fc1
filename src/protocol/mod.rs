//! # Telemetry Wire Protocol
//!
//! Text frames sent by the transmitter over the telemetry characteristic.
//!
//! This module handles:
//! - Frame grammar and sample types
//! - Validating and decoding inbound notifications
//! - Encoding frames (used by the simulated transmitter)
//!
//! A frame is one tag character followed directly by two comma-separated
//! decimals, e.g. `B1.000000,1.005000` or `V0.500000,1.005000`.

pub mod frame;
pub mod decoder;
pub mod encoder;

pub use decoder::decode_frame;
pub use encoder::encode_frame;
pub use frame::{Sample, SampleKind};
