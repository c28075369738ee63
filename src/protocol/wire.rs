//! JSON representation of a delivered message, per spec.md §6: `id`,
//! `headers`, `body`, `delivery_count`. Kept distinct from `Message` so the
//! core routing types never depend on `serde`.

use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::message::Message;

#[derive(Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub headers: HashMap<String, String>,
    /// Body encoded as base64 (spec.md §6 asks the implementer to pick an
    /// encoding for the byte body and document it; SPEC_FULL.md pins base64).
    pub body: String,
    pub delivery_count: u32,
}

impl WireMessage {
    /// Builds the wire form of an in-flight `msg`. Panics if `msg` has no
    /// id yet — callers only reach this after `Delivery::next` has assigned
    /// one, never for a message still sitting in a queue's buffer.
    pub fn from_delivered(msg: &Message) -> Self {
        WireMessage {
            id: msg
                .id()
                .expect("wire encoding requires a dispatched message")
                .to_string(),
            headers: msg.headers().clone(),
            body: base64::engine::general_purpose::STANDARD.encode(msg.body()),
            delivery_count: msg.delivery_count(),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn round_trips_body_and_headers_through_json() {
        let mut headers = HashMap::new();
        headers.insert("app".to_string(), "web".to_string());
        let mut msg = Message::new(Bytes::from_static(b"hello world"), Some(headers));
        msg.begin_dispatch("id-1".to_string());

        let wire = WireMessage::from_delivered(&msg);
        let line = wire.to_line().unwrap();
        let parsed: WireMessage = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.id, "id-1");
        assert_eq!(parsed.delivery_count, 1);
        assert_eq!(parsed.headers.get("app").unwrap(), "web");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(parsed.body)
            .unwrap();
        assert_eq!(decoded, b"hello world");
    }
}
