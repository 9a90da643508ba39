/// Command surface for the presentation layer
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::{emit, ConnectionSession, EventSender, SessionSettings, SessionSnapshot, StopReason};
use crate::bluetooth::BleAdapter;
use crate::location::LocationProvider;
use crate::models::{StartCommand, StatusEvent};

struct ActiveSession {
    command: StartCommand,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<StopReason>,
}

/// Owns at most one running `ConnectionSession`
pub struct SessionController<A: BleAdapter, L: LocationProvider> {
    adapter: Arc<A>,
    location: Arc<L>,
    settings: SessionSettings,
    events: EventSender,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    active: Option<ActiveSession>,
    foreground: bool,
}

impl<A: BleAdapter, L: LocationProvider> SessionController<A, L> {
    pub fn new(
        adapter: Arc<A>,
        location: Arc<L>,
        settings: SessionSettings,
        events: EventSender,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        SessionController {
            adapter,
            location,
            settings,
            events,
            snapshot: Arc::new(snapshot),
            active: None,
            foreground: false,
        }
    }

    /// Start a session; refused with a status event while one is running
    pub fn start(&mut self, command: StartCommand) -> bool {
        if let Some(active) = &self.active {
            if !active.handle.is_finished() {
                warn!(
                    "Start for {} ignored, session for {} still running",
                    command.device_name, active.command.device_name
                );
                emit(
                    &self.events,
                    StatusEvent::status(format!(
                        "Session for {} already running",
                        active.command.device_name
                    )),
                );
                return false;
            }
        }

        info!(
            "Starting session for {} -> {}",
            command.device_name,
            command.file_path.display()
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let session = ConnectionSession::new(
            self.adapter.clone(),
            self.location.clone(),
            self.settings.clone(),
            command.clone(),
            self.events.clone(),
            self.snapshot.clone(),
        );
        let handle = tokio::spawn(session.run(stop_rx));

        // A finished previous session is simply replaced
        self.active = Some(ActiveSession {
            command,
            stop_tx,
            handle,
        });
        true
    }

    /// Stop the running session and wait for its teardown; no-op when idle
    pub async fn stop(&mut self) -> Option<StopReason> {
        let active = self.active.take()?;

        // The session may already have stopped on its own
        let _ = active.stop_tx.send(());

        match active.handle.await {
            Ok(reason) => {
                info!("Session for {} ended: {}", active.command.device_name, reason);
                Some(reason)
            }
            Err(e) => {
                error!("Session task failed: {}", e);
                None
            }
        }
    }

    pub fn set_foreground(&mut self) {
        if !self.foreground {
            info!("Service moved to foreground");
        }
        self.foreground = true;
    }

    pub fn set_background(&mut self) {
        if self.foreground {
            info!("Service moved to background");
        }
        self.foreground = false;
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.handle.is_finished())
            .unwrap_or(false)
    }

    /// Watch the current state and retry count
    pub fn snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }
}
