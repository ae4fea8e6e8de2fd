/// Lifecycle of one WebSocket connection. There is no way back from `Closed`;
/// a client that drops must reconnect and gets a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// What ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame received or the stream ended cleanly.
    Graceful,
    /// Read or write on the socket failed.
    TransportError,
    /// The relay loop stopped draining this connection.
    RelayGone,
}

/// Tracks the state machine for one socket task. `close` reports true only
/// for the first transition, so the task sends at most one `Leave`.
///
/// This only dedupes within a socket task. `Registry::unregister` is what
/// guarantees a single `player_left` per identity, whoever asks for removal.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    close_reason: Option<CloseReason>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            close_reason: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// CONNECTING -> OPEN. Ignored once closed.
    pub fn open(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Open;
        }
    }

    /// Transition to CLOSED. Returns true only for the first call, which is
    /// the one that must run teardown.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Closed;
        self.close_reason = Some(reason);
        true
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
