pub mod collector;
pub mod connection;
pub mod controller;
pub mod state;

use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

use crate::models::{NameMatch, StatusEvent};

pub use collector::SampleCollector;
pub use connection::ConnectionSession;
pub use controller::SessionController;
pub use state::{SessionSnapshot, SessionState, StopReason};

/// Outbound status channel; sending never blocks
pub type EventSender = mpsc::UnboundedSender<StatusEvent>;

pub(crate) fn emit(events: &EventSender, event: StatusEvent) {
    // No listener is fine, events are advisory
    let _ = events.send(event);
}

/// Target characteristic and timing of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub name_match: NameMatch,
    pub poll_interval: Duration,
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub discovery_timeout: Duration,
    pub location_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl SessionSettings {
    pub fn new(service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        SessionSettings {
            service_uuid,
            characteristic_uuid,
            name_match: NameMatch::Exact,
            poll_interval: Duration::from_millis(1000),
            scan_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(10),
            location_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_attempts: 3,
        }
    }
}
