/// Utility functions for timestamps, file naming and value formatting
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// Placeholder written for values whose source was unavailable
pub const MISSING_VALUE: &str = "N/A";

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// ISO-8601 timestamp used in the CSV `Timestamp` column
pub fn iso_timestamp(dt: &OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_device_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "sensor".to_string()
    } else {
        sanitized
    }
}

/// Build the per-session log path: `<dir>/<sanitized-name>_<YYYYMMDD_HHMMSS>.csv`
pub fn log_file_path(dir: &Path, device_name: &str, started: &OffsetDateTime) -> PathBuf {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = started
        .format(&format)
        .unwrap_or_else(|_| started.unix_timestamp().to_string());
    dir.join(format!("{}_{}.csv", sanitize_device_name(device_name), stamp))
}

/// Two decimal places, or `N/A`
pub fn format_fixed2(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => MISSING_VALUE.to_string(),
    }
}

/// Full precision coordinate, or `N/A`
pub fn format_coordinate(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => MISSING_VALUE.to_string(),
    }
}
