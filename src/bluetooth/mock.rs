/// In-memory BLE backend for session tests
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use super::adapter::{Advertisement, BleAdapter, BleCharacteristic, BleDevice, ConnectionEvent};
use super::{fresh_advertisements, Sighting};
use crate::error::BleError;

fn channel_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) }).boxed()
}

#[derive(Clone)]
pub struct MockBleAdapter {
    powered: Arc<Mutex<bool>>,
    power_subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<bool>>>>,
    cached: Arc<Mutex<Vec<Sighting>>>,
    sightings: Arc<Mutex<Vec<(Duration, Sighting)>>>,
    resolved: Arc<Mutex<Vec<Advertisement>>>,
    scans: Arc<AtomicUsize>,
    pub device: MockDevice,
}

impl MockBleAdapter {
    pub fn new(advertised_names: &[&str]) -> Self {
        let sightings = advertised_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let sighting = Sighting {
                    id: format!("AA:BB:CC:DD:EE:{:02X}", i),
                    name: Some(name.to_string()),
                };
                (Duration::ZERO, sighting)
            })
            .collect();

        MockBleAdapter {
            powered: Arc::new(Mutex::new(true)),
            power_subscribers: Arc::new(Mutex::new(Vec::new())),
            cached: Arc::new(Mutex::new(Vec::new())),
            sightings: Arc::new(Mutex::new(sightings)),
            resolved: Arc::new(Mutex::new(Vec::new())),
            scans: Arc::new(AtomicUsize::new(0)),
            device: MockDevice::new(),
        }
    }

    pub fn set_powered(&self, powered: bool) {
        *self.powered.lock().unwrap() = powered;
        for tx in self.power_subscribers.lock().unwrap().iter() {
            let _ = tx.send(powered);
        }
    }

    /// A device the stack remembers from earlier, replayed at scan start
    pub fn cache(&self, id: &str, name: &str) {
        self.cached.lock().unwrap().push(Sighting {
            id: id.to_string(),
            name: Some(name.to_string()),
        });
    }

    /// Report `id` during every scan, `after` the previous report
    pub fn advertise(&self, id: &str, name: Option<&str>, after: Duration) {
        let sighting = Sighting {
            id: id.to_string(),
            name: name.map(String::from),
        };
        self.sightings.lock().unwrap().push((after, sighting));
    }

    /// Advertisements handed to `device()`, in call order
    pub fn resolved(&self) -> Vec<Advertisement> {
        self.resolved.lock().unwrap().clone()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleAdapter for MockBleAdapter {
    type Device = MockDevice;

    async fn is_powered(&self) -> Result<bool, BleError> {
        Ok(*self.powered.lock().unwrap())
    }

    async fn power_events(&self) -> Result<BoxStream<'static, bool>, BleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.power_subscribers.lock().unwrap().push(tx);
        Ok(channel_stream(rx))
    }

    async fn scan(&self) -> Result<BoxStream<'static, Advertisement>, BleError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let cached = self.cached.lock().unwrap().clone();
        let ids: HashSet<String> = cached.iter().map(|s| s.id.clone()).collect();
        let live = self.sightings.lock().unwrap().clone();

        let raw = stream::iter(cached)
            .chain(stream::iter(live).then(|(after, sighting)| async move {
                if !after.is_zero() {
                    sleep(after).await;
                }
                sighting
            }))
            .chain(stream::pending::<Sighting>())
            .boxed();
        Ok(fresh_advertisements(ids, raw))
    }

    fn device(&self, advertisement: &Advertisement) -> Result<MockDevice, BleError> {
        self.resolved.lock().unwrap().push(advertisement.clone());
        Ok(self.device.clone())
    }
}

#[derive(Clone)]
pub struct MockDevice {
    connected: Arc<Mutex<bool>>,
    connect_results: Arc<Mutex<VecDeque<Result<(), BleError>>>>,
    connection_subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>>,
    has_characteristic: Arc<Mutex<bool>>,
    connect_delay: Arc<Mutex<Duration>>,
    discovery_delay: Arc<Mutex<Duration>>,
    payload: Arc<Mutex<Vec<u8>>>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl MockDevice {
    fn new() -> Self {
        MockDevice {
            connected: Arc::new(Mutex::new(false)),
            connect_results: Arc::new(Mutex::new(VecDeque::new())),
            connection_subscribers: Arc::new(Mutex::new(Vec::new())),
            has_characteristic: Arc::new(Mutex::new(true)),
            connect_delay: Arc::new(Mutex::new(Duration::ZERO)),
            discovery_delay: Arc::new(Mutex::new(Duration::ZERO)),
            payload: Arc::new(Mutex::new(vec![0, 0, 128, 63, 0, 0, 0, 64])),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue results for upcoming `connect()` calls; an empty queue succeeds
    pub fn push_connect_results(&self, results: impl IntoIterator<Item = Result<(), BleError>>) {
        self.connect_results.lock().unwrap().extend(results);
    }

    pub fn set_has_characteristic(&self, present: bool) {
        *self.has_characteristic.lock().unwrap() = present;
    }

    /// Make every later `connect()` take `delay` before it resolves
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_discovery_delay(&self, delay: Duration) {
        *self.discovery_delay.lock().unwrap() = delay;
    }

    pub fn set_payload(&self, payload: Vec<u8>) {
        *self.payload.lock().unwrap() = payload;
    }

    /// Simulate the peripheral dropping the link
    pub fn drop_link(&self) {
        *self.connected.lock().unwrap() = false;
        for tx in self.connection_subscribers.lock().unwrap().iter() {
            let _ = tx.send(ConnectionEvent::Disconnected);
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleDevice for MockDevice {
    type Characteristic = MockCharacteristic;

    async fn connect(&self) -> Result<(), BleError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let result = self
            .connect_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        if result.is_ok() {
            *self.connected.lock().unwrap() = true;
        }
        result
    }

    async fn disconnect(&self) -> Result<(), BleError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.connected.lock().unwrap() = false;
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, BleError> {
        Ok(*self.connected.lock().unwrap())
    }

    async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>, BleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connection_subscribers.lock().unwrap().push(tx);
        Ok(channel_stream(rx))
    }

    async fn find_characteristic(
        &self,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<Option<MockCharacteristic>, BleError> {
        let delay = *self.discovery_delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if *self.has_characteristic.lock().unwrap() {
            Ok(Some(MockCharacteristic {
                payload: self.payload.clone(),
                reads: self.reads.clone(),
            }))
        } else {
            Ok(None)
        }
    }
}

pub struct MockCharacteristic {
    payload: Arc<Mutex<Vec<u8>>>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl BleCharacteristic for MockCharacteristic {
    async fn read(&self) -> Result<Vec<u8>, BleError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.lock().unwrap().clone())
    }
}
