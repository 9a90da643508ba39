/// Scan/connect/poll/reconnect state machine for one target device
use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};

use super::{
    emit, EventSender, SampleCollector, SessionSettings, SessionSnapshot, SessionState,
    StopReason,
};
use crate::bluetooth::{Advertisement, BleAdapter, BleDevice, ConnectionEvent};
use crate::error::BleError;
use crate::location::LocationProvider;
use crate::models::{StartCommand, StatusEvent};
use crate::storage::CsvSink;

type PowerStream = Option<BoxStream<'static, bool>>;
type ConnectionStream = Option<BoxStream<'static, ConnectionEvent>>;

/// Next power state change; pending forever once the stream is gone
async fn next_power(power: &mut PowerStream) -> bool {
    if let Some(stream) = power.as_mut() {
        if let Some(powered) = stream.next().await {
            return powered;
        }
        warn!("Adapter power stream ended");
        *power = None;
    }
    std::future::pending().await
}

/// Next connection event; a closed subscription counts as a disconnect
async fn next_connection(connection: &mut ConnectionStream) -> ConnectionEvent {
    if let Some(stream) = connection.as_mut() {
        return match stream.next().await {
            Some(event) => event,
            None => {
                *connection = None;
                ConnectionEvent::Disconnected
            }
        };
    }
    std::future::pending().await
}

/// Run `fut` unless a stop command or adapter power-off arrives first
///
/// Every wait outside the poll loop goes through here, so a stop or the
/// adapter going off is observed in any state.
async fn guarded<F: Future>(
    fut: F,
    stop_rx: &mut oneshot::Receiver<()>,
    power: &mut PowerStream,
) -> Result<F::Output, StopReason> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Ok(out),
            _ = &mut *stop_rx => return Err(StopReason::Requested),
            powered = next_power(power) => {
                if !powered {
                    return Err(StopReason::AdapterOff);
                }
            }
        }
    }
}

pub struct ConnectionSession<A: BleAdapter, L: LocationProvider> {
    adapter: Arc<A>,
    location: Arc<L>,
    settings: SessionSettings,
    command: StartCommand,
    events: EventSender,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    state: SessionState,
    retry_count: u32,
    device: Option<Arc<A::Device>>,
}

impl<A: BleAdapter, L: LocationProvider> ConnectionSession<A, L> {
    pub fn new(
        adapter: Arc<A>,
        location: Arc<L>,
        settings: SessionSettings,
        command: StartCommand,
        events: EventSender,
        snapshot: Arc<watch::Sender<SessionSnapshot>>,
    ) -> Self {
        ConnectionSession {
            adapter,
            location,
            settings,
            command,
            events,
            snapshot,
            state: SessionState::Idle,
            retry_count: 0,
            device: None,
        }
    }

    /// Drive the session until it stops; always ends in `Stopped`
    pub async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> StopReason {
        self.publish();

        let mut power = match self.adapter.power_events().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Could not subscribe to adapter power changes: {}", e);
                None
            }
        };

        // Poll timer and subscriptions live inside drive() and are dropped with it
        let reason = self.drive(&mut stop_rx, &mut power).await;
        drop(power);

        self.teardown(&reason).await;
        reason
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!("Unexpected session transition {} -> {}", self.state, next);
        }
        info!("Session {} -> {}", self.state, next);
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            state: self.state,
            retry_count: self.retry_count,
        });
    }

    async fn drive(
        &mut self,
        stop_rx: &mut oneshot::Receiver<()>,
        power: &mut PowerStream,
    ) -> StopReason {
        match self.adapter.is_powered().await {
            Ok(true) => {}
            Ok(false) => return StopReason::AdapterOff,
            Err(e) => return StopReason::Failed(e.to_string()),
        }

        // Scanning
        self.transition(SessionState::Scanning);
        emit(
            &self.events,
            StatusEvent::scanning(format!("Scanning for {}...", self.command.device_name)),
        );
        let advertisement = match guarded(self.find_device(), stop_rx, power).await {
            Ok(Ok(Some(advertisement))) => advertisement,
            Ok(Ok(None)) => return StopReason::DeviceNotFound(self.command.device_name.clone()),
            Ok(Err(e)) => return StopReason::Failed(e.to_string()),
            Err(reason) => return reason,
        };
        info!("Found {} ({})", advertisement.name, advertisement.id);

        // Connecting
        self.transition(SessionState::Connecting);
        emit(
            &self.events,
            StatusEvent::status(format!("Connecting to {}...", advertisement.name)),
        );
        let device = match self.adapter.device(&advertisement) {
            Ok(device) => Arc::new(device),
            Err(e) => return StopReason::ConnectFailed(e.to_string()),
        };
        self.device = Some(device.clone());
        let connect = timeout(self.settings.connect_timeout, device.connect());
        match guarded(connect, stop_rx, power).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return StopReason::ConnectFailed(e.to_string()),
            Ok(Err(_)) => return StopReason::ConnectFailed("timed out".to_string()),
            Err(reason) => return reason,
        }

        // Discovering
        self.transition(SessionState::Discovering);
        emit(
            &self.events,
            StatusEvent::status(format!(
                "Connected to {}, discovering services",
                advertisement.name
            )),
        );
        let (characteristic, mut connection) =
            match guarded(self.resolve(&device), stop_rx, power).await {
                Ok(Ok(Some(resolved))) => resolved,
                Ok(Ok(None)) => return StopReason::CharacteristicNotFound,
                Ok(Err(e)) => return StopReason::Failed(e.to_string()),
                Err(reason) => return reason,
            };

        let sink = CsvSink::new(&self.command.file_path);
        if let Err(e) = sink.ensure_header() {
            warn!("Could not prepare {}: {}", sink.path().display(), e);
        }
        let mut collector = SampleCollector::new(
            device.clone(),
            characteristic,
            self.location.clone(),
            sink,
            self.events.clone(),
            self.settings.location_timeout,
        );

        // Polling
        self.transition(SessionState::Polling);
        emit(
            &self.events,
            StatusEvent::status(format!(
                "Logging {} to {}",
                advertisement.name,
                self.command.file_path.display()
            )),
        );

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_at = Instant::now();

        loop {
            tokio::select! {
                _ = &mut *stop_rx => return StopReason::Requested,
                powered = next_power(power) => {
                    if !powered {
                        return StopReason::AdapterOff;
                    }
                }
                event = next_connection(&mut connection),
                    if self.state == SessionState::Polling =>
                {
                    if event == ConnectionEvent::Disconnected {
                        warn!("{} disconnected", advertisement.name);
                        self.retry_count = 0;
                        self.transition(SessionState::Reconnecting);
                        emit(
                            &self.events,
                            StatusEvent::status(format!(
                                "Connection lost, reconnecting to {}...",
                                advertisement.name
                            )),
                        );
                        retry_at = Instant::now() + self.settings.reconnect_delay;
                    }
                }
                _ = sleep_until(retry_at), if self.state == SessionState::Reconnecting => {
                    let attempt = self.retry_count + 1;
                    info!(
                        "Reconnection attempt {}/{}",
                        attempt, self.settings.max_reconnect_attempts
                    );
                    match guarded(self.resolve(&device), stop_rx, power).await {
                        Ok(Ok(Some((characteristic, events)))) => {
                            collector.set_characteristic(characteristic);
                            connection = events;
                            self.retry_count = 0;
                            self.transition(SessionState::Polling);
                            let status = format!("Reconnected to {}", advertisement.name);
                            emit(&self.events, StatusEvent::status(status));
                            continue;
                        }
                        Ok(Ok(None)) => warn!("Characteristic missing after reconnect"),
                        Ok(Err(e)) => warn!("Reconnection attempt {} failed: {}", attempt, e),
                        Err(reason) => return reason,
                    }

                    self.retry_count = attempt;
                    self.publish();
                    if self.retry_count >= self.settings.max_reconnect_attempts {
                        return StopReason::ReconnectFailed(self.retry_count);
                    }
                    emit(
                        &self.events,
                        StatusEvent::status(format!(
                            "Reconnection attempt {}/{} failed",
                            attempt, self.settings.max_reconnect_attempts
                        )),
                    );
                    retry_at = Instant::now() + self.settings.reconnect_delay;
                }
                _ = ticker.tick() => {
                    if self.state != SessionState::Polling {
                        debug!("Tick skipped while {}", self.state);
                        continue;
                    }
                    let collected = collector.sample().await;
                    // Results of a tick that raced a stop are discarded
                    match stop_rx.try_recv() {
                        Err(TryRecvError::Empty) => {
                            collector.record(collected);
                        }
                        _ => {
                            debug!("Discarding sample taken during stop");
                            return StopReason::Requested;
                        }
                    }
                }
            }
        }
    }

    /// Scan until the first matching advertisement or the scan timeout
    async fn find_device(&self) -> Result<Option<Advertisement>, BleError> {
        let mut scan = self.adapter.scan().await?;
        let filter = &self.command.device_name;
        let name_match = self.settings.name_match;

        let found = timeout(self.settings.scan_timeout, async {
            while let Some(advertisement) = scan.next().await {
                if name_match.matches(filter, &advertisement.name) {
                    return Some(advertisement);
                }
                debug!("Ignoring {} ({})", advertisement.name, advertisement.id);
            }
            None
        })
        .await
        .unwrap_or(None);

        // Dropping the stream halts discovery
        drop(scan);
        Ok(found)
    }

    /// Connect if needed, subscribe to connection changes and look up the characteristic
    async fn resolve(
        &self,
        device: &A::Device,
    ) -> Result<Option<(<A::Device as BleDevice>::Characteristic, ConnectionStream)>, BleError> {
        if !device.is_connected().await.unwrap_or(false) {
            timeout(self.settings.connect_timeout, device.connect())
                .await
                .map_err(|_| BleError::Timeout("connecting".to_string()))??;
        }

        let connection = match device.connection_events().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Could not subscribe to connection changes: {}", e);
                None
            }
        };

        let characteristic = timeout(
            self.settings.discovery_timeout,
            device.find_characteristic(
                self.settings.service_uuid,
                self.settings.characteristic_uuid,
            ),
        )
        .await
        .map_err(|_| BleError::Timeout("discovering services".to_string()))??;

        Ok(characteristic.map(|c| (c, connection)))
    }

    async fn teardown(&mut self, reason: &StopReason) {
        if reason.is_fatal() {
            error!("Session stopping: {}", reason);
        } else {
            info!("Session stopping: {}", reason);
        }

        if let Some(device) = self.device.take() {
            match timeout(self.settings.connect_timeout, device.disconnect()).await {
                Ok(Ok(())) => debug!("Disconnected"),
                Ok(Err(e)) => warn!("Disconnect failed during teardown: {}", e),
                Err(_) => warn!("Disconnect timed out during teardown"),
            }
        }

        self.transition(SessionState::Stopped);

        let mut event = StatusEvent::status(reason.to_string());
        if reason.is_fatal() {
            event = event.with_toast(reason.to_string());
        }
        emit(&self.events, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::mock::MockBleAdapter;
    use crate::error::LocationError;
    use crate::models::{Fix, LocationPermission};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, Duration};
    use uuid::Uuid;

    /// Takes 3s per fix, well inside the location timeout
    struct SlowFix;

    #[async_trait]
    impl LocationProvider for SlowFix {
        async fn is_enabled(&self) -> bool {
            true
        }

        async fn permission(&self) -> LocationPermission {
            LocationPermission::Always
        }

        async fn current_fix(&self) -> Result<Fix, LocationError> {
            sleep(Duration::from_secs(3)).await;
            Ok(Fix {
                latitude: 61.5,
                longitude: 23.75,
                accuracy: Some(4.0),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_tick_discards_the_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        let adapter = MockBleAdapter::new(&["VC_SENS_1"]);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let snapshot = Arc::new(snapshot);
        let mut states = snapshot.subscribe();

        let session = ConnectionSession::new(
            Arc::new(adapter.clone()),
            Arc::new(SlowFix),
            SessionSettings::new(Uuid::nil(), Uuid::nil()),
            StartCommand {
                device_name: "VC_SENS_1".to_string(),
                file_path: path.clone(),
            },
            events_tx,
            snapshot,
        );
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(session.run(stop_rx));

        states
            .wait_for(|s| s.state == SessionState::Polling)
            .await
            .unwrap();
        // the first tick fires at once and is now waiting on the fix
        sleep(Duration::from_secs(1)).await;
        assert_eq!(adapter.device.read_count(), 1);

        stop_tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), StopReason::Requested);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);

        let mut events = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            events.push(event);
        }
        assert!(events
            .iter()
            .all(|e| e.bt_data.is_empty() && e.location_data.is_empty()));
        assert_eq!(events.last().unwrap().status, "Stopped");
    }
}
