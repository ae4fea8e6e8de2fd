//! Wire types shared between the duck basketball relay and its clients.

pub mod protocol;

pub use protocol::{ClientMsg, PlayerId, ServerMsg, PROTOCOL_VERSION};
