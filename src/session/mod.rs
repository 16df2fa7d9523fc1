//! # Session Module
//!
//! Bounded logging sessions and their CSV export.
//!
//! This module handles:
//! - Starting and stopping logging sessions
//! - Recording one row per derived value while active
//! - Exporting rows to `<prefix>_<date>_<n>.csv`
//! - Retaining rows when an export fails

pub mod export;
pub mod logger;

pub use export::CsvExporter;
pub use logger::{LogEntry, SessionHeader, SessionLog, SessionLogger, SessionOutcome};
