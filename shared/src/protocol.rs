use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Identity the relay assigns to a connection. Never reused within a process.
pub type PlayerId = u64;

// === Server -> Client ===

/// Messages the relay generates itself. Relayed client payloads are not
/// modelled here: they are forwarded as opaque JSON objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../frontend/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Sent once, only to the newly connected client.
    #[serde(rename = "assign_id")]
    AssignId {
        #[ts(type = "number")]
        id: PlayerId,
    },
    /// Sent to every remaining client when a client disconnects.
    #[serde(rename = "player_left")]
    PlayerLeft {
        #[ts(type = "number")]
        id: PlayerId,
    },
}

impl ServerMsg {
    pub fn id(&self) -> PlayerId {
        match self {
            ServerMsg::AssignId { id } | ServerMsg::PlayerLeft { id } => *id,
        }
    }
}

// === Client -> Server ===

/// Messages the browser client conventionally sends. The relay treats all
/// inbound traffic opaquely; these exist for tooling and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../frontend/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "player_update")]
    PlayerUpdate { x: f64, y: f64, z: f64 },
    #[serde(rename = "player_shoot")]
    PlayerShoot,
}

impl ClientMsg {
    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::PlayerUpdate { .. } => "player_update",
            ClientMsg::PlayerShoot => "player_shoot",
        }
    }
}
