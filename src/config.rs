use std::env;
use std::path::PathBuf;
use tokio::time::Duration;
use uuid::Uuid;

use crate::models::{Fix, LocationPermission, NameMatch};
use crate::session::SessionSettings;

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationProviderKind {
    Termux,
    Static,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutput {
    Log,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub sensor_name: Option<String>,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub log_dir: PathBuf,
    pub poll_interval: Duration,
    pub name_match: NameMatch,
    pub location_provider: LocationProviderKind,
    pub location_permission: LocationPermission,
    pub static_fix: Option<Fix>,
    pub event_output: EventOutput,
}

impl LoggerConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let service_uuid = parse_uuid(
            "SERVICE_UUID",
            &get("SERVICE_UUID").ok_or("SERVICE_UUID environment variable not set")?,
        )?;
        let characteristic_uuid = parse_uuid(
            "CHARACTERISTIC_UUID",
            &get("CHARACTERISTIC_UUID").ok_or("CHARACTERISTIC_UUID environment variable not set")?,
        )?;

        let poll_interval_ms = match get("POLL_INTERVAL_MS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| format!("POLL_INTERVAL_MS is not a number: '{}'", value))?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(format!(
                "POLL_INTERVAL_MS must be between {} and {}, got {}",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, poll_interval_ms
            )
            .into());
        }

        let name_match = match get("NAME_MATCH").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("exact") => NameMatch::Exact,
            Some("contains") | Some("substring") => NameMatch::Contains,
            Some(other) => return Err(format!("Unknown NAME_MATCH '{}'", other).into()),
        };

        let location_provider =
            match get("LOCATION_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
                None | Some("none") => LocationProviderKind::None,
                Some("termux") => LocationProviderKind::Termux,
                Some("static") => LocationProviderKind::Static,
                Some(other) => return Err(format!("Unknown LOCATION_PROVIDER '{}'", other).into()),
            };

        let location_permission =
            match get("LOCATION_PERMISSION").as_deref().map(str::to_lowercase).as_deref() {
                None | Some("while-in-use") => LocationPermission::WhileInUse,
                Some("always") => LocationPermission::Always,
                Some("denied") => LocationPermission::Denied,
                Some(other) => {
                    return Err(format!("Unknown LOCATION_PERMISSION '{}'", other).into())
                }
            };

        let static_fix = match get("LOCATION_STATIC") {
            Some(value) => Some(parse_static_fix(&value)?),
            None => None,
        };
        if location_provider == LocationProviderKind::Static && static_fix.is_none() {
            return Err(
                "LOCATION_PROVIDER=static requires LOCATION_STATIC=lat,lon[,accuracy]".into(),
            );
        }

        let event_output = match get("EVENT_OUTPUT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("log") => EventOutput::Log,
            Some("json") => EventOutput::Json,
            Some(other) => return Err(format!("Unknown EVENT_OUTPUT '{}'", other).into()),
        };

        Ok(LoggerConfig {
            sensor_name: get("SENSOR_NAME"),
            service_uuid,
            characteristic_uuid,
            log_dir: get("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            poll_interval: Duration::from_millis(poll_interval_ms),
            name_match,
            location_provider,
            location_permission,
            static_fix,
            event_output,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        let mut settings = SessionSettings::new(self.service_uuid, self.characteristic_uuid);
        settings.name_match = self.name_match;
        settings.poll_interval = self.poll_interval;
        settings
    }
}

fn parse_uuid(key: &str, value: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value).map_err(|e| format!("{} is not a valid UUID '{}': {}", key, value, e))
}

/// Parse `lat,lon[,accuracy]`
fn parse_static_fix(value: &str) -> Result<Fix, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("LOCATION_STATIC is not lat,lon[,accuracy]: '{}'", value))?;

    match parts.as_slice() {
        [latitude, longitude] => Ok(Fix {
            latitude: *latitude,
            longitude: *longitude,
            accuracy: None,
        }),
        [latitude, longitude, accuracy] => Ok(Fix {
            latitude: *latitude,
            longitude: *longitude,
            accuracy: Some(*accuracy),
        }),
        _ => Err(format!("LOCATION_STATIC is not lat,lon[,accuracy]: '{}'", value)),
    }
}
