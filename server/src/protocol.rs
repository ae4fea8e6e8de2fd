//! Envelope handling for relayed traffic.
//!
//! Client payloads stay opaque JSON objects: the relay only checks that a
//! `type` discriminator is present and stamps the sender's identity into `id`.

use axum::extract::ws::Utf8Bytes;
use duckball_shared::{PlayerId, ServerMsg};
use serde_json::{Map, Value};

/// Why an inbound frame was dropped instead of relayed.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotObject,
    #[error("payload has no `type` field")]
    MissingType,
    #[error("failed to encode relayed frame: {0}")]
    Encode(serde_json::Error),
}

/// A decoded client payload that passed the shape check.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    payload: Map<String, Value>,
}

impl Envelope {
    /// Decode `raw` and require an object whose `type` is present and truthy.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(payload) => match payload.get("type") {
                Some(kind) if is_truthy(kind) => Ok(Self { payload }),
                _ => Err(EnvelopeError::MissingType),
            },
            _ => Err(EnvelopeError::NotObject),
        }
    }

    /// Same as [`Envelope::parse`] for binary frames.
    pub fn parse_bytes(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(raw).map_err(|_| EnvelopeError::NotUtf8)?;
        Self::parse(text)
    }

    /// The `type` discriminator when it is a string.
    pub fn kind(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// Insert or overwrite `id` with the sender's identity.
    pub fn tag(mut self, sender_id: PlayerId) -> Map<String, Value> {
        self.payload.insert("id".to_string(), Value::from(sender_id));
        self.payload
    }
}

/// `null`, `false`, `""` and zero count as no discriminator at all.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Everything the relay writes to a socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    AssignId(PlayerId),
    PlayerLeft(PlayerId),
    Relayed {
        sender_id: PlayerId,
        envelope: Envelope,
    },
}

impl Outbound {
    /// Serialise once; the returned frame is shared by every recipient.
    pub fn into_frame(self) -> Result<Utf8Bytes, EnvelopeError> {
        let json = match self {
            Outbound::AssignId(id) => serde_json::to_string(&ServerMsg::AssignId { id }),
            Outbound::PlayerLeft(id) => serde_json::to_string(&ServerMsg::PlayerLeft { id }),
            Outbound::Relayed {
                sender_id,
                envelope,
            } => serde_json::to_string(&envelope.tag(sender_id)),
        }
        .map_err(EnvelopeError::Encode)?;
        Ok(json.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_value(frame: &Utf8Bytes) -> Value {
        serde_json::from_str(frame.as_str()).unwrap()
    }

    #[test]
    fn relayed_frame_appends_sender_id() {
        let envelope = Envelope::parse(r#"{"type":"player_update","x":1,"y":0,"z":2}"#).unwrap();
        let frame = Outbound::Relayed {
            sender_id: 1,
            envelope,
        }
        .into_frame()
        .unwrap();
        assert_eq!(
            frame.as_str(),
            r#"{"type":"player_update","x":1,"y":0,"z":2,"id":1}"#
        );
    }

    #[test]
    fn relayed_frame_overwrites_spoofed_id() {
        let envelope = Envelope::parse(r#"{"type":"player_shoot","id":42}"#).unwrap();
        let frame = Outbound::Relayed {
            sender_id: 3,
            envelope,
        }
        .into_frame()
        .unwrap();
        assert_eq!(frame.as_str(), r#"{"type":"player_shoot","id":3}"#);
    }

    #[test]
    fn relayed_frame_keeps_nested_fields() {
        let envelope =
            Envelope::parse(r#"{"type":"chat","body":{"text":"quack","tags":[1,2]}}"#).unwrap();
        let frame = Outbound::Relayed {
            sender_id: 5,
            envelope,
        }
        .into_frame()
        .unwrap();
        let value = frame_value(&frame);
        assert_eq!(value["body"]["text"], "quack");
        assert_eq!(value["body"]["tags"][1], 2);
        assert_eq!(value["id"], 5);
    }

    #[test]
    fn server_generated_frames() {
        let assign = Outbound::AssignId(1).into_frame().unwrap();
        assert_eq!(assign.as_str(), r#"{"type":"assign_id","id":1}"#);
        let left = Outbound::PlayerLeft(2).into_frame().unwrap();
        assert_eq!(left.as_str(), r#"{"type":"player_left","id":2}"#);
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = Envelope::parse("not valid json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn non_object_is_rejected() {
        for raw in ["[1,2,3]", "\"player_update\"", "7", "null"] {
            let err = Envelope::parse(raw).unwrap_err();
            assert!(matches!(err, EnvelopeError::NotObject), "{raw}");
        }
    }

    #[test]
    fn missing_or_falsy_type_is_rejected() {
        for raw in [
            r#"{"x":1}"#,
            r#"{"type":null,"x":1}"#,
            "{}",
            r#"{"type":""}"#,
            r#"{"type":false}"#,
            r#"{"type":0}"#,
            r#"{"type":0.0}"#,
        ] {
            let err = Envelope::parse(raw).unwrap_err();
            assert!(matches!(err, EnvelopeError::MissingType), "{raw}");
        }
    }

    #[test]
    fn type_is_not_interpreted() {
        let envelope = Envelope::parse(r#"{"type":17}"#).unwrap();
        assert_eq!(envelope.kind(), None);
        for raw in [r#"{"type":true}"#, r#"{"type":-1}"#, r#"{"type":[]}"#, r#"{"type":{}}"#] {
            assert!(Envelope::parse(raw).is_ok(), "{raw}");
        }
        let envelope = Envelope::parse(r#"{"type":"anything_goes"}"#).unwrap();
        assert_eq!(envelope.kind(), Some("anything_goes"));
    }

    #[test]
    fn encode_and_decode_errors_are_distinct() {
        let cause = serde_json::from_str::<Value>("{").unwrap_err();
        let err = EnvelopeError::Encode(cause);
        assert!(err.to_string().starts_with("failed to encode relayed frame"));
        assert!(!matches!(err, EnvelopeError::Decode(_)));
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        let err = Envelope::parse_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, EnvelopeError::NotUtf8));
        let envelope = Envelope::parse_bytes(br#"{"type":"player_shoot"}"#).unwrap();
        assert_eq!(envelope.kind(), Some("player_shoot"));
    }
}
