/// Position fixes through Termux:API's `termux-location` command
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use super::LocationProvider;
use crate::error::LocationError;
use crate::models::{Fix, LocationPermission};

const TERMUX_LOCATION_BIN: &str = "termux-location";

#[derive(Debug, Deserialize)]
struct TermuxFix {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    #[serde(rename = "API_ERROR")]
    api_error: Option<String>,
}

/// Parse the JSON printed by `termux-location`
///
/// An empty output means the request produced no fix (typically a missing
/// grant or no satellite lock).
pub fn parse_termux_fix(output: &str) -> Result<Fix, LocationError> {
    let output = output.trim();
    if output.is_empty() {
        return Err(LocationError::Unavailable("no fix returned".to_string()));
    }

    let raw: TermuxFix =
        serde_json::from_str(output).map_err(|e| LocationError::Parse(e.to_string()))?;

    if let Some(err) = raw.api_error {
        return Err(LocationError::Unavailable(err));
    }

    match (raw.latitude, raw.longitude) {
        (Some(latitude), Some(longitude)) => Ok(Fix {
            latitude,
            longitude,
            accuracy: raw.accuracy,
        }),
        _ => Err(LocationError::Parse("missing latitude/longitude".to_string())),
    }
}

/// Android location through Termux:API
///
/// The grant itself is held by the Termux:API app, so the permission level is
/// supplied by configuration.
#[derive(Debug, Clone)]
pub struct TermuxLocationProvider {
    permission: LocationPermission,
    provider: String,
}

impl TermuxLocationProvider {
    pub fn new(permission: LocationPermission) -> Self {
        TermuxLocationProvider {
            permission,
            provider: "gps".to_string(),
        }
    }
}

#[async_trait]
impl LocationProvider for TermuxLocationProvider {
    async fn is_enabled(&self) -> bool {
        true
    }

    async fn permission(&self) -> LocationPermission {
        self.permission
    }

    async fn current_fix(&self) -> Result<Fix, LocationError> {
        // kill_on_drop so a caller-side timeout does not leave the request running
        let output = Command::new(TERMUX_LOCATION_BIN)
            .arg("-p")
            .arg(&self.provider)
            .arg("-r")
            .arg("once")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LocationError::Unavailable(format!("{}: {}", TERMUX_LOCATION_BIN, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("termux-location output: {}", stdout.trim());
        parse_termux_fix(&stdout)
    }
}
