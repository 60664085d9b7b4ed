//! [`UsageLog`] – append-only usage CSV.
//!
//! The header is written once when the log is opened.  Rows are buffered and
//! only reach the file on [`UsageLog::flush`], which the recorder calls on
//! its own, slower period.
//!
//! # Example
//!
//! ```
//! use puckbot_memory::{UsageLog, UsageRow};
//!
//! let mut log = UsageLog::new(Vec::new()).unwrap();
//! log.append(&UsageRow { battery_level: 3.3, state: 5, ..Default::default() }).unwrap();
//! let text = String::from_utf8(log.into_inner()).unwrap();
//! assert!(text.ends_with("3.3,5,0,0,0,0,0,0,0,0\n"));
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use puckbot_types::StateCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const USAGE_HEADER: &str =
    "BatteryLevel,State,DistanceL,DistanceR,SpeedLExp,SpeedRExp,SpeedLBuff,SpeedRBuff,OutputL,OutputR";

#[derive(Debug, Error)]
pub enum UsageLogError {
    #[error("usage log I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageRow {
    pub battery_level: f64,
    pub state: StateCode,
    pub distance_left: f64,
    pub distance_right: f64,
    pub speed_exp_left: f64,
    pub speed_exp_right: f64,
    pub speed_buffered_left: f64,
    pub speed_buffered_right: f64,
    pub output_left: f32,
    pub output_right: f32,
}

impl UsageRow {
    /// The CSV line for this row, without the trailing newline.
    pub fn to_csv(&self) -> String {
        [
            format_decimal(self.battery_level),
            self.state.to_string(),
            format_decimal(self.distance_left),
            format_decimal(self.distance_right),
            format_decimal(self.speed_exp_left),
            format_decimal(self.speed_exp_right),
            format_decimal(self.speed_buffered_left),
            format_decimal(self.speed_buffered_right),
            format_decimal(f64::from(self.output_left)),
            format_decimal(f64::from(self.output_right)),
        ]
        .join(",")
    }
}

/// At most two decimals, trailing zeros and a dangling point removed
/// (`3.30` → `3.3`, `2.00` → `2`).
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        s => s.to_string(),
    }
}

pub struct UsageLog<W: Write> {
    out: W,
    rows: u64,
}

impl UsageLog<BufWriter<File>> {
    /// Open (or create) the CSV at `path` for appending, creating parent
    /// directories.  The header is written only into an empty file.
    pub fn create(path: &Path) -> Result<Self, UsageLogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata()?.len() == 0;
        debug!(path = %path.display(), fresh, "usage log opened");

        let mut out = BufWriter::new(file);
        if fresh {
            writeln!(out, "{USAGE_HEADER}")?;
        }
        Ok(Self { out, rows: 0 })
    }
}

impl<W: Write> UsageLog<W> {
    /// Wrap `out` and write the header.
    pub fn new(mut out: W) -> Result<Self, UsageLogError> {
        writeln!(out, "{USAGE_HEADER}")?;
        Ok(Self { out, rows: 0 })
    }

    pub fn append(&mut self, row: &UsageRow) -> Result<(), UsageLogError> {
        writeln!(self.out, "{}", row.to_csv())?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), UsageLogError> {
        self.out.flush()?;
        Ok(())
    }

    /// Rows appended since the log was opened.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_formatting_trims() {
        assert_eq!(format_decimal(3.3), "3.3");
        assert_eq!(format_decimal(2.0), "2");
        assert_eq!(format_decimal(0.126), "0.13");
        assert_eq!(format_decimal(-0.5), "-0.5");
        assert_eq!(format_decimal(-0.001), "0");
        assert_eq!(format_decimal(123.456), "123.46");
        assert_eq!(format_decimal(0.0), "0");
    }

    #[test]
    fn header_then_rows() {
        let mut log = UsageLog::new(Vec::new()).unwrap();
        log.append(&UsageRow {
            battery_level: 3.25,
            state: 7,
            distance_left: 10.5,
            distance_right: 10.0,
            speed_exp_left: 1.234,
            speed_exp_right: 0.0,
            speed_buffered_left: 2.0,
            speed_buffered_right: 2.5,
            output_left: 0.5,
            output_right: -0.25,
        })
        .unwrap();
        assert_eq!(log.rows(), 1);

        let text = String::from_utf8(log.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], USAGE_HEADER);
        assert_eq!(lines[1], "3.25,7,10.5,10,1.23,0,2,2.5,0.5,-0.25");
    }

    #[test]
    fn file_log_appends_without_repeating_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("usage.csv");

        {
            let mut log = UsageLog::create(&path).unwrap();
            log.append(&UsageRow::default()).unwrap();
            log.flush().unwrap();
        }
        {
            let mut log = UsageLog::create(&path).unwrap();
            log.append(&UsageRow::default()).unwrap();
            log.flush().unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(USAGE_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn rows_not_on_disk_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.csv");
        let mut log = UsageLog::create(&path).unwrap();
        log.append(&UsageRow::default()).unwrap();
        assert!(fs::read_to_string(&path).unwrap().is_empty());

        log.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
