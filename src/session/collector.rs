/// Per-tick sensor and location sampling
use log::{debug, warn};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{timeout, Duration};

use super::{emit, EventSender};
use crate::bluetooth::{decode_sensor_payload, BleCharacteristic, BleDevice};
use crate::error::LocationError;
use crate::location::LocationProvider;
use crate::models::{Fix, Sample, SensorReading, StatusEvent};
use crate::storage::CsvSink;
use crate::utils::{format_coordinate, format_fixed2, iso_timestamp};

/// Readings gathered during one tick, not yet persisted
#[derive(Debug, Clone)]
pub struct Collected {
    pub sample: Sample,
    pub bt_data: String,
    pub location_data: String,
}

/// Produces one `Sample` per tick from a connected device and the location provider
///
/// Every failure is turned into a status string; nothing here ends the session.
pub struct SampleCollector<D: BleDevice, L: LocationProvider> {
    device: Arc<D>,
    characteristic: D::Characteristic,
    location: Arc<L>,
    sink: CsvSink,
    events: EventSender,
    location_timeout: Duration,
}

impl<D: BleDevice, L: LocationProvider> SampleCollector<D, L> {
    pub fn new(
        device: Arc<D>,
        characteristic: D::Characteristic,
        location: Arc<L>,
        sink: CsvSink,
        events: EventSender,
        location_timeout: Duration,
    ) -> Self {
        SampleCollector {
            device,
            characteristic,
            location,
            sink,
            events,
            location_timeout,
        }
    }

    /// Swap in the characteristic handle re-resolved after a reconnect
    pub fn set_characteristic(&mut self, characteristic: D::Characteristic) {
        self.characteristic = characteristic;
    }

    #[cfg(test)]
    pub fn sink(&self) -> &CsvSink {
        &self.sink
    }

    /// Read both sources and build the sample
    pub async fn sample(&self) -> Collected {
        let (reading, bt_data) = self.read_sensor().await;
        let (fix, location_data) = self.read_location().await;
        let timestamp = iso_timestamp(&OffsetDateTime::now_utc());

        debug!("Tick: BT [{}] GPS [{}]", bt_data, location_data);

        Collected {
            sample: Sample::new(timestamp, reading, fix),
            bt_data,
            location_data,
        }
    }

    /// Append the sample to the log and publish it
    pub fn record(&self, collected: Collected) -> Sample {
        let status = match self.sink.append(&collected.sample) {
            Ok(()) => format!("Logging to {}", self.sink.path().display()),
            Err(e) => {
                warn!("Failed to append to {}: {}", self.sink.path().display(), e);
                format!("Log write failed: {}", e)
            }
        };

        emit(
            &self.events,
            StatusEvent {
                status,
                bt_data: collected.bt_data,
                location_data: collected.location_data,
                is_scanning: false,
                show_toast: None,
            },
        );

        collected.sample
    }

    /// One complete tick
    #[cfg(test)]
    pub async fn collect(&self) -> Sample {
        let collected = self.sample().await;
        self.record(collected)
    }

    async fn read_sensor(&self) -> (Option<SensorReading>, String) {
        // Skip the read when a disconnect has already landed
        match self.device.is_connected().await {
            Ok(true) => {}
            Ok(false) => return (None, "Device not connected".to_string()),
            Err(e) => {
                warn!("Connection check failed: {}", e);
                return (None, format!("Connection check failed: {}", e));
            }
        }

        let data = match self.characteristic.read().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Characteristic read failed: {}", e);
                return (None, format!("Read error: {}", e));
            }
        };

        match decode_sensor_payload(&data) {
            Ok(reading) => {
                let text = format!(
                    "Temperature: {} °C, Humidity: {} %",
                    format_fixed2(Some(reading.temperature.into())),
                    format_fixed2(Some(reading.humidity.into()))
                );
                (Some(reading), text)
            }
            Err(e) => (None, format!("Invalid data ({} bytes): {}", data.len(), e)),
        }
    }

    async fn read_location(&self) -> (Option<Fix>, String) {
        match self.locate().await {
            Ok(fix) => {
                let text = format!(
                    "Lat: {}, Lon: {}, Accuracy: {} m",
                    format_coordinate(Some(fix.latitude)),
                    format_coordinate(Some(fix.longitude)),
                    format_fixed2(fix.accuracy)
                );
                (Some(fix), text)
            }
            Err(e) => {
                debug!("No location this tick: {}", e);
                (None, e.to_string())
            }
        }
    }

    async fn locate(&self) -> Result<Fix, LocationError> {
        if !self.location.is_enabled().await {
            return Err(LocationError::Disabled);
        }
        if !self.location.permission().await.is_granted() {
            return Err(LocationError::PermissionDenied);
        }
        timeout(self.location_timeout, self.location.current_fix())
            .await
            .map_err(|_| LocationError::Timeout)?
    }
}
