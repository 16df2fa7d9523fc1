//! # Session Export
//!
//! Writes a finished session to a CSV file.
//!
//! ## File Layout
//!
//! ```text
//! Date,2024-05-01
//! Start Time,14:03:22
//! Baseline (V),1.000000
//!
//! Time (s),Baseline (V),Vref (V),Reading (V),Value (V)
//! 0.000,1.000000,0.500000,1.005000,0.005000
//! ```
//!
//! Files are named `<prefix>_<YYYY-MM-DD>_<n>.csv`, where `n` is the smallest
//! positive number not already used in the log directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::logger::{LogEntry, SessionLog};
use crate::error::{ReceiverError, Result};

/// Decimal places for voltages in exported rows
const VOLTAGE_DECIMALS: usize = 6;

/// Decimal places for the time offset column
const OFFSET_DECIMALS: usize = 3;

/// Baseline header value when no baseline was known at session start
const UNKNOWN_BASELINE: &str = "Unknown";

/// Upper bound on the file-number search
const MAX_FILE_INDEX: u32 = 10_000;

/// One exported data row
#[derive(Debug, Serialize)]
struct CsvRow {
    #[serde(rename = "Time (s)")]
    time: String,
    #[serde(rename = "Baseline (V)")]
    baseline: String,
    #[serde(rename = "Vref (V)")]
    reference: String,
    #[serde(rename = "Reading (V)")]
    reading: String,
    #[serde(rename = "Value (V)")]
    value: String,
}

impl From<&LogEntry> for CsvRow {
    fn from(entry: &LogEntry) -> Self {
        Self {
            time: format!("{:.prec$}", entry.offset_seconds, prec = OFFSET_DECIMALS),
            baseline: format_optional(entry.baseline),
            reference: format_optional(entry.reference),
            reading: format_volts(entry.reading),
            value: format_volts(entry.value),
        }
    }
}

fn format_volts(value: f64) -> String {
    format!("{:.prec$}", value, prec = VOLTAGE_DECIMALS)
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_volts).unwrap_or_default()
}

/// Writes session logs into a directory
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
    prefix: String,
}

impl CsvExporter {
    /// Creates an exporter.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory that receives the files (created on first export)
    /// * `prefix` - File name prefix
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `log` to a new file
    ///
    /// # Returns
    ///
    /// * `Result<PathBuf>` - Path of the written file
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Export` if the directory cannot be created or
    /// the file cannot be written.
    pub fn write(&self, log: &SessionLog) -> Result<PathBuf> {
        self.write_with(log, write_contents)
    }

    /// Create the next free file and fill it with `fill`. A partial file is
    /// removed when `fill` fails.
    fn write_with<F>(&self, log: &SessionLog, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(File, &SessionLog) -> std::result::Result<(), String>,
    {
        fs::create_dir_all(&self.dir).map_err(|e| self.export_error(&self.dir, e))?;

        let date = log.header.started_at.format("%Y-%m-%d").to_string();
        let (path, file) = self.create_unique(&date)?;

        if let Err(reason) = fill(file, log) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove partial export {}: {}", path.display(), e);
            }
            return Err(self.export_error(&path, reason));
        }

        info!(
            "Exported {} rows to {}",
            log.entries.len(),
            path.display()
        );
        Ok(path)
    }

    fn create_unique(&self, date: &str) -> Result<(PathBuf, File)> {
        for n in 1..=MAX_FILE_INDEX {
            let path = self.dir.join(format!("{}_{}_{}.csv", self.prefix, date, n));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", path.display());
                    continue;
                }
                Err(e) => return Err(self.export_error(&path, e)),
            }
        }

        Err(ReceiverError::Export {
            path: self.dir.clone(),
            reason: format!("no free file name for {} after {} attempts", date, MAX_FILE_INDEX),
        })
    }

    fn export_error(&self, path: &Path, reason: impl ToString) -> ReceiverError {
        ReceiverError::Export {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

fn write_contents(file: File, log: &SessionLog) -> std::result::Result<(), String> {
    let mut out = BufWriter::new(file);
    let header = &log.header;

    let baseline = header
        .baseline
        .map(format_volts)
        .unwrap_or_else(|| UNKNOWN_BASELINE.to_string());

    writeln!(out, "Date,{}", header.started_at.format("%Y-%m-%d")).map_err(|e| e.to_string())?;
    writeln!(out, "Start Time,{}", header.started_at.format("%H:%M:%S")).map_err(|e| e.to_string())?;
    writeln!(out, "Baseline (V),{}", baseline).map_err(|e| e.to_string())?;
    writeln!(out).map_err(|e| e.to_string())?;

    let mut rows = csv::Writer::from_writer(out);
    for entry in &log.entries {
        rows.serialize(CsvRow::from(entry)).map_err(|e| e.to_string())?;
    }
    rows.flush().map_err(|e| e.to_string())?;

    Ok(())
}
