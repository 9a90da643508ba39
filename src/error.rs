use thiserror::Error;

/// Failures reported by a BLE adapter, device or characteristic
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BleError {
    #[error("Bluetooth adapter not available: {0}")]
    AdapterUnavailable(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("GATT error: {0}")]
    Gatt(String),

    #[error("Timed out while {0}")]
    Timeout(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Bluetooth platform error: {0}")]
    Platform(String),
}

impl From<bluer::Error> for BleError {
    fn from(e: bluer::Error) -> Self {
        BleError::Platform(e.to_string())
    }
}

/// Failures of a single location fix
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location services disabled")]
    Disabled,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Timed out waiting for location fix")]
    Timeout,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Could not parse location fix: {0}")]
    Parse(String),
}

/// Failures writing the session log
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
