use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::utils::{format_coordinate, format_fixed2};

/// Header row of every session log file
pub const CSV_HEADER: [&str; 6] = [
    "Timestamp",
    "Temperature",
    "Humidity",
    "Latitude",
    "Longitude",
    "Accuracy",
];

/// One combined sensor + position reading
///
/// Any field whose source was unavailable during the tick is `None` and is
/// written as `N/A`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: String,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

impl Sample {
    pub fn new(
        timestamp: String,
        reading: Option<SensorReading>,
        fix: Option<Fix>,
    ) -> Self {
        Sample {
            timestamp,
            temperature: reading.map(|r| r.temperature),
            humidity: reading.map(|r| r.humidity),
            latitude: fix.map(|f| f.latitude),
            longitude: fix.map(|f| f.longitude),
            accuracy: fix.and_then(|f| f.accuracy),
        }
    }

    /// Render the sample as the six CSV columns
    pub fn to_record(&self) -> [String; 6] {
        [
            self.timestamp.clone(),
            format_fixed2(self.temperature.map(f64::from)),
            format_fixed2(self.humidity.map(f64::from)),
            format_coordinate(self.latitude),
            format_coordinate(self.longitude),
            format_fixed2(self.accuracy),
        ]
    }
}

/// Decoded characteristic payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature: f32,
    pub humidity: f32,
}

/// A position fix from the location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationPermission {
    Denied,
    WhileInUse,
    Always,
}

impl LocationPermission {
    pub fn is_granted(self) -> bool {
        matches!(self, LocationPermission::WhileInUse | LocationPermission::Always)
    }
}

/// How the advertised name is compared against the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Exact,
    Contains,
}

impl NameMatch {
    /// Case-insensitive comparison of an advertised name against the filter
    pub fn matches(self, filter: &str, advertised: &str) -> bool {
        let filter = filter.to_lowercase();
        let advertised = advertised.to_lowercase();
        match self {
            NameMatch::Exact => advertised == filter,
            NameMatch::Contains => advertised.contains(&filter),
        }
    }
}

/// Payload of a start command
#[derive(Debug, Clone, PartialEq)]
pub struct StartCommand {
    pub device_name: String,
    pub file_path: PathBuf,
}

/// The only message sent to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: String,
    pub bt_data: String,
    pub location_data: String,
    pub is_scanning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_toast: Option<String>,
}

impl StatusEvent {
    pub fn status(status: impl Into<String>) -> Self {
        StatusEvent {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn scanning(status: impl Into<String>) -> Self {
        StatusEvent {
            status: status.into(),
            is_scanning: true,
            ..Default::default()
        }
    }

    pub fn with_toast(mut self, toast: impl Into<String>) -> Self {
        self.show_toast = Some(toast.into());
        self
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if !self.bt_data.is_empty() {
            write!(f, " | BT: {}", self.bt_data)?;
        }
        if !self.location_data.is_empty() {
            write!(f, " | GPS: {}", self.location_data)?;
        }
        if let Some(toast) = &self.show_toast {
            write!(f, " [{}]", toast)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sources_render_as_na() {
        let sample = Sample::new("2024-05-01T10:00:00Z".to_string(), None, None);
        assert_eq!(
            sample.to_record(),
            ["2024-05-01T10:00:00Z", "N/A", "N/A", "N/A", "N/A", "N/A"].map(String::from)
        );
    }

    #[test]
    fn record_uses_two_decimals_except_coordinates() {
        let sample = Sample::new(
            "t".to_string(),
            Some(SensorReading {
                temperature: 21.456,
                humidity: 40.0,
            }),
            Some(Fix {
                latitude: 60.169857,
                longitude: 24.938379,
                accuracy: Some(4.5),
            }),
        );
        let record = sample.to_record();
        assert_eq!(record[1], "21.46");
        assert_eq!(record[2], "40.00");
        assert_eq!(record[3], "60.169857");
        assert_eq!(record[4], "24.938379");
        assert_eq!(record[5], "4.50");
    }

    #[test]
    fn exact_match_ignores_case_but_not_suffix() {
        assert!(NameMatch::Exact.matches("VC_SENS_1", "vc_sens_1"));
        assert!(!NameMatch::Exact.matches("VC_SENS_1", "VC_SENS_12"));
        assert!(NameMatch::Contains.matches("VC_SENS_1", "VC_SENS_12"));
        assert!(NameMatch::Contains.matches("sens", "VC_SENS_1"));
    }

    #[test]
    fn status_event_serializes_camel_case() {
        let event = StatusEvent::scanning("Scanning").with_toast("hi");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"btData\":\"\""));
        assert!(json.contains("\"isScanning\":true"));
        assert!(json.contains("\"showToast\":\"hi\""));
    }

    #[test]
    fn permission_grants() {
        assert!(!LocationPermission::Denied.is_granted());
        assert!(LocationPermission::WhileInUse.is_granted());
        assert!(LocationPermission::Always.is_granted());
    }
}
