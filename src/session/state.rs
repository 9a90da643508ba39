use std::fmt;

/// Lifecycle of one logging session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Polling,
    Reconnecting,
    Stopped,
}

impl SessionState {
    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Stopped {
            return self != Stopped;
        }
        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Connecting)
                | (Connecting, Discovering)
                | (Discovering, Polling)
                | (Polling, Reconnecting)
                | (Reconnecting, Polling)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Connecting => "connecting",
            SessionState::Discovering => "discovering",
            SessionState::Polling => "polling",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Observable view of the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub retry_count: u32,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        SessionSnapshot {
            state: SessionState::Idle,
            retry_count: 0,
        }
    }
}

/// Why a session reached `Stopped`
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Requested,
    AdapterOff,
    DeviceNotFound(String),
    ConnectFailed(String),
    CharacteristicNotFound,
    ReconnectFailed(u32),
    Failed(String),
}

impl StopReason {
    /// Session-fatal reasons are surfaced to the user as a toast
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StopReason::Requested)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "Stopped"),
            StopReason::AdapterOff => write!(f, "Bluetooth turned off"),
            StopReason::DeviceNotFound(name) => write!(f, "Device '{}' not found", name),
            StopReason::ConnectFailed(e) => write!(f, "Connection failed: {}", e),
            StopReason::CharacteristicNotFound => write!(f, "Characteristic not found"),
            StopReason::ReconnectFailed(attempts) => {
                write!(f, "Reconnection failed after {} attempts", attempts)
            }
            StopReason::Failed(e) => write!(f, "Session failed: {}", e),
        }
    }
}
