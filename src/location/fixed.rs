use async_trait::async_trait;

use super::LocationProvider;
use crate::error::LocationError;
use crate::models::{Fix, LocationPermission};

/// A stationary logger with a known position, or no position at all
#[derive(Debug, Clone)]
pub struct StaticLocationProvider {
    fix: Option<Fix>,
    permission: LocationPermission,
}

impl StaticLocationProvider {
    pub fn new(fix: Fix, permission: LocationPermission) -> Self {
        StaticLocationProvider {
            fix: Some(fix),
            permission,
        }
    }

    /// Location services switched off
    pub fn disabled() -> Self {
        StaticLocationProvider {
            fix: None,
            permission: LocationPermission::Denied,
        }
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn is_enabled(&self) -> bool {
        self.fix.is_some()
    }

    async fn permission(&self) -> LocationPermission {
        self.permission
    }

    async fn current_fix(&self) -> Result<Fix, LocationError> {
        self.fix.ok_or(LocationError::Disabled)
    }
}
