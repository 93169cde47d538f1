//! Wire and domain message types shared by every relay surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ClientIdentity, OutboundMessageId};

/// An operator reply on its way to a client. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub text: String,
    /// Unix milliseconds on the wire.
    #[serde(rename = "date", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, Utc::now())
    }

    pub fn at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

/// Inbound relay request body: `{"clientId": "...", "text": "..."}`.
///
/// Both fields are optional at the parsing layer so a missing field becomes a
/// validation error rather than a deserialization failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RelayRequest {
    #[serde(rename = "clientId", default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl RelayRequest {
    pub fn new(client_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            text: Some(text.into()),
        }
    }
}

/// A message received on the operator's account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorMessage {
    pub message_id: OutboundMessageId,
    /// Missing for stickers, photos and the like; relayed as empty text.
    pub text: Option<String>,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<OutboundMessageId>,
}

/// Events pushed from the relay to a client over its live channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AdminMessage(PendingMessage),
    /// Another connection registered the same identity; this one is closing.
    Replaced,
}

/// Events sent by a client over its live channel.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Register {
        #[serde(rename = "clientId", default)]
        client_id: Option<ClientIdentity>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn admin_message_wire_shape() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let event = ServerEvent::AdminMessage(PendingMessage::at("hello", ts));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "admin_message");
        assert_eq!(json["data"]["text"], "hello");
        assert_eq!(json["data"]["date"], 1_700_000_000_123_i64);
    }

    #[test]
    fn replaced_has_no_payload() {
        let json = serde_json::to_value(ServerEvent::Replaced).unwrap();
        assert_eq!(json, serde_json::json!({"event": "replaced"}));
    }

    #[test]
    fn parse_register() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"register","data":{"clientId":"u1"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Register {
                client_id: Some(ClientIdentity::from_raw("u1"))
            }
        );
    }

    #[test]
    fn parse_register_without_client_id() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"register","data":{}}"#).unwrap();
        assert_eq!(event, ClientEvent::Register { client_id: None });
    }

    #[test]
    fn unknown_client_event_is_rejected() {
        let parsed = serde_json::from_str::<ClientEvent>(r#"{"event":"typing","data":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn relay_request_tolerates_missing_fields() {
        let req: RelayRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(req.client_id.is_none());
        assert_eq!(req.text.as_deref(), Some("hi"));

        let req: RelayRequest = serde_json::from_str(r#"{"clientId":"u1","text":"hi"}"#).unwrap();
        assert_eq!(req.client_id.as_deref(), Some("u1"));
    }
}
