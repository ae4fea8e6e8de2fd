use crate::protocol::{Envelope, EnvelopeError, Outbound};
use axum::extract::ws::Utf8Bytes;
use duckball_shared::PlayerId;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Frames queued for one socket. The connection task drains it.
pub type Outbox = mpsc::Sender<Utf8Bytes>;

/// Client message type whose latest copy is remembered per connection.
const STATE_KIND: &str = "player_update";

/// One live client session as seen by the registry.
pub struct Connection {
    outbox: Outbox,
    /// Last tagged `player_update` frame received from this connection.
    last_known_state: Option<Utf8Bytes>,
}

impl Connection {
    fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            last_known_state: None,
        }
    }

    /// The socket task still drains the outbox.
    fn is_open(&self) -> bool {
        !self.outbox.is_closed()
    }

    /// Best-effort delivery. A full or closed outbox loses the frame.
    fn deliver(&self, id: PlayerId, frame: &Utf8Bytes) -> bool {
        match self.outbox.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Player {} outbox full, dropping frame", id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Identity -> connection map, owned by the relay loop.
///
/// Only [`Registry::register`] inserts and only [`Registry::unregister`]
/// removes; broadcasting never mutates membership.
pub struct Registry {
    connections: HashMap<PlayerId, Connection>,
    next_id: PlayerId,
    replay_last_state: bool,
}

impl Registry {
    pub fn new(replay_last_state: bool) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            replay_last_state,
        }
    }

    /// Allocate the next identity, announce it to `outbox` alone and insert
    /// the connection.
    pub fn register(&mut self, outbox: Outbox) -> PlayerId {
        let id = self.next_id;
        self.next_id += 1;

        let connection = Connection::new(outbox);
        match Outbound::AssignId(id).into_frame() {
            Ok(frame) => {
                connection.deliver(id, &frame);
            }
            Err(e) => tracing::error!("Failed to encode assign_id for player {}: {}", id, e),
        }

        if self.replay_last_state {
            for other in self.connections.values().filter(|c| c.is_open()) {
                if let Some(state) = &other.last_known_state {
                    connection.deliver(id, state);
                }
            }
        }

        self.connections.insert(id, connection);
        id
    }

    /// Remove `id` and tell everyone left. Returns false (and announces
    /// nothing) when `id` was already gone.
    pub fn unregister(&mut self, id: PlayerId) -> bool {
        if self.connections.remove(&id).is_none() {
            return false;
        }
        match Outbound::PlayerLeft(id).into_frame() {
            Ok(frame) => {
                self.broadcast(None, &frame);
            }
            Err(e) => tracing::error!("Failed to encode player_left for player {}: {}", id, e),
        }
        true
    }

    /// Send `frame` to every open connection except `sender`. Returns how
    /// many outboxes accepted it.
    pub fn broadcast(&self, sender: Option<PlayerId>, frame: &Utf8Bytes) -> usize {
        self.connections
            .iter()
            .filter(|(id, _)| Some(**id) != sender)
            .filter(|(_, conn)| conn.is_open())
            .filter(|(id, conn)| conn.deliver(**id, frame))
            .count()
    }

    /// Validate a raw client frame, stamp the sender's identity and fan it out.
    pub fn ingest(&mut self, sender_id: PlayerId, raw: &[u8]) -> Result<usize, EnvelopeError> {
        let envelope = Envelope::parse_bytes(raw)?;
        if !self.connections.contains_key(&sender_id) {
            tracing::debug!("Dropping message from departed player {}", sender_id);
            return Ok(0);
        }

        let is_state = envelope.kind() == Some(STATE_KIND);
        let frame = Outbound::Relayed {
            sender_id,
            envelope,
        }
        .into_frame()?;

        if is_state {
            if let Some(conn) = self.connections.get_mut(&sender_id) {
                conn.last_known_state = Some(frame.clone());
            }
        }

        Ok(self.broadcast(Some(sender_id), &frame))
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(false)
    }
}
