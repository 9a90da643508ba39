pub mod fixed;
pub mod termux;

use async_trait::async_trait;

use crate::error::LocationError;
use crate::models::{Fix, LocationPermission};

pub use fixed::StaticLocationProvider;
pub use termux::TermuxLocationProvider;

/// Permission and position capability consumed by the sample collector
#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    /// Whether location services are switched on
    async fn is_enabled(&self) -> bool;

    async fn permission(&self) -> LocationPermission;

    /// Best-accuracy fix; callers bound the wait
    async fn current_fix(&self) -> Result<Fix, LocationError>;
}

/// Provider selected by configuration
pub enum LocationSource {
    Termux(TermuxLocationProvider),
    Static(StaticLocationProvider),
}

#[async_trait]
impl LocationProvider for LocationSource {
    async fn is_enabled(&self) -> bool {
        match self {
            LocationSource::Termux(p) => p.is_enabled().await,
            LocationSource::Static(p) => p.is_enabled().await,
        }
    }

    async fn permission(&self) -> LocationPermission {
        match self {
            LocationSource::Termux(p) => p.permission().await,
            LocationSource::Static(p) => p.permission().await,
        }
    }

    async fn current_fix(&self) -> Result<Fix, LocationError> {
        match self {
            LocationSource::Termux(p) => p.current_fix().await,
            LocationSource::Static(p) => p.current_fix().await,
        }
    }
}
