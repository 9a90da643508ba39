/// BlueZ backend for the BLE capability traits
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{AdapterEvent, AdapterProperty, DeviceEvent, DeviceProperty};
use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use super::adapter::{Advertisement, BleAdapter, BleCharacteristic, BleDevice, ConnectionEvent};
use super::{fresh_advertisements, Sighting};
use crate::error::BleError;

const SERVICES_RESOLVE_POLL_MS: u64 = 200;

/// Default adapter of the local BlueZ daemon
#[derive(Clone)]
pub struct BluezAdapter {
    // Keeps the D-Bus connection alive for the adapter's lifetime
    _session: bluer::Session,
    adapter: bluer::Adapter,
}

impl BluezAdapter {
    pub async fn new() -> Result<Self, BleError> {
        // Initialize Bluetooth session
        let session = match bluer::Session::new().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create Bluetooth session: {}", e);
                return Err(BleError::AdapterUnavailable(e.to_string()));
            }
        };

        // Get the default Bluetooth adapter
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to get default Bluetooth adapter: {}", e);
                return Err(BleError::AdapterUnavailable(e.to_string()));
            }
        };

        info!("Using Bluetooth adapter {}", adapter.name());

        Ok(BluezAdapter {
            _session: session,
            adapter,
        })
    }
}

#[async_trait]
impl BleAdapter for BluezAdapter {
    type Device = BluezDevice;

    async fn is_powered(&self) -> Result<bool, BleError> {
        Ok(self.adapter.is_powered().await?)
    }

    async fn power_events(&self) -> Result<BoxStream<'static, bool>, BleError> {
        let events = self.adapter.events().await?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) => {
                        Some(powered)
                    }
                    _ => None,
                }
            })
            .boxed())
    }

    async fn scan(&self) -> Result<BoxStream<'static, Advertisement>, BleError> {
        // Configure discovery filter for Low Energy devices only
        let filter = bluer::DiscoveryFilter {
            transport: bluer::DiscoveryTransport::Le,
            duplicate_data: false,
            ..Default::default()
        };

        // Apply the discovery filter (warn if it fails, but continue)
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        // Anything BlueZ knows before discovery starts is replayed first
        let cached: HashSet<String> = self
            .adapter
            .device_addresses()
            .await?
            .into_iter()
            .map(|addr| addr.to_string())
            .collect();
        debug!("{} cached devices before scan", cached.len());

        // Property changes re-report a device, which picks up late names
        let discovery = self.adapter.discover_devices_with_changes().await?;
        let adapter = self.adapter.clone();

        let sightings = discovery
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    let AdapterEvent::DeviceAdded(addr) = event else {
                        return None;
                    };
                    let name = match adapter.device(addr) {
                        Ok(device) => match device.name().await {
                            Ok(name) => name,
                            Err(e) => {
                                debug!("Failed to get name for {}: {}", addr, e);
                                None
                            }
                        },
                        Err(e) => {
                            debug!("Failed to get device {}: {}", addr, e);
                            None
                        }
                    };
                    if let Some(name) = &name {
                        debug!("Discovered {} ({})", name, addr);
                    }
                    Some(Sighting {
                        id: addr.to_string(),
                        name,
                    })
                }
            })
            .boxed();

        Ok(fresh_advertisements(cached, sightings))
    }

    fn device(&self, advertisement: &Advertisement) -> Result<BluezDevice, BleError> {
        let addr = advertisement
            .id
            .parse::<bluer::Address>()
            .map_err(|e| BleError::Platform(format!("Invalid device address: {}", e)))?;
        let device = self.adapter.device(addr)?;
        Ok(BluezDevice { device })
    }
}

pub struct BluezDevice {
    device: bluer::Device,
}

#[async_trait]
impl BleDevice for BluezDevice {
    type Characteristic = BluezCharacteristic;

    async fn connect(&self) -> Result<(), BleError> {
        self.device
            .connect()
            .await
            .map_err(|e| BleError::ConnectionFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        Ok(self.device.disconnect().await?)
    }

    async fn is_connected(&self) -> Result<bool, BleError> {
        Ok(self.device.is_connected().await?)
    }

    async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>, BleError> {
        let events = self.device.events().await?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    DeviceEvent::PropertyChanged(DeviceProperty::Connected(true)) => {
                        Some(ConnectionEvent::Connected)
                    }
                    DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) => {
                        Some(ConnectionEvent::Disconnected)
                    }
                    _ => None,
                }
            })
            .boxed())
    }

    async fn find_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<BluezCharacteristic>, BleError> {
        // GATT services appear asynchronously after connecting
        while !self.device.is_services_resolved().await? {
            sleep(Duration::from_millis(SERVICES_RESOLVE_POLL_MS)).await;
        }

        for remote_service in self.device.services().await? {
            if remote_service.uuid().await? != service {
                continue;
            }
            for remote_char in remote_service.characteristics().await? {
                if remote_char.uuid().await? == characteristic {
                    return Ok(Some(BluezCharacteristic {
                        characteristic: remote_char,
                    }));
                }
            }
        }

        Ok(None)
    }
}

pub struct BluezCharacteristic {
    characteristic: Characteristic,
}

#[async_trait]
impl BleCharacteristic for BluezCharacteristic {
    async fn read(&self) -> Result<Vec<u8>, BleError> {
        self.characteristic
            .read()
            .await
            .map_err(|e| BleError::Gatt(e.to_string()))
    }
}
