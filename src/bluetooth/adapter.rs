/// Capability traits the session drives instead of a Bluetooth stack
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::error::BleError;

/// One advertisement observed during a scan
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Platform identifier (a MAC address on BlueZ)
    pub id: String,
    pub name: String,
}

/// Connection changes reported by a device subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

#[async_trait]
pub trait BleAdapter: Send + Sync + 'static {
    type Device: BleDevice;

    /// Current power state of the adapter
    async fn is_powered(&self) -> Result<bool, BleError>;

    /// Stream of power state changes; `false` means the adapter turned off
    async fn power_events(&self) -> Result<BoxStream<'static, bool>, BleError>;

    /// Start discovery and stream named advertisements in arrival order
    ///
    /// Only devices heard during this scan are yielded, never entries the
    /// stack cached earlier. Discovery stops when the returned stream is
    /// dropped.
    async fn scan(&self) -> Result<BoxStream<'static, Advertisement>, BleError>;

    /// Resolve a device handle for an advertisement
    fn device(&self, advertisement: &Advertisement) -> Result<Self::Device, BleError>;
}

#[async_trait]
pub trait BleDevice: Send + Sync + 'static {
    type Characteristic: BleCharacteristic;

    async fn connect(&self) -> Result<(), BleError>;

    async fn disconnect(&self) -> Result<(), BleError>;

    async fn is_connected(&self) -> Result<bool, BleError>;

    /// Subscribe to connection state changes
    async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>, BleError>;

    /// Find a characteristic within a service, `None` if either is absent
    async fn find_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<Self::Characteristic>, BleError>;
}

#[async_trait]
pub trait BleCharacteristic: Send + Sync + 'static {
    async fn read(&self) -> Result<Vec<u8>, BleError>;
}
