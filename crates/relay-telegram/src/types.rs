//! Subset of the Bot API object model the relay reads.

use serde::{Deserialize, Serialize};

use relay_core::{OperatorMessage, OutboundMessageId};

/// Envelope around every Bot API answer.
#[derive(Debug, Deserialize)]
pub struct TgResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before retrying after a flood-control error.
    pub retry_after: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<Box<TgMessage>>,
}

impl TgMessage {
    pub fn into_operator_message(self) -> OperatorMessage {
        OperatorMessage {
            message_id: OutboundMessageId::from(self.message_id),
            text: self.text,
            reply_to: self
                .reply_to_message
                .map(|parent| OutboundMessageId::from(parent.message_id)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageParams<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_maps_to_operator_message() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10,
            "message": {
                "message_id": 43,
                "chat": {"id": 777, "type": "private"},
                "date": 1_700_000_000,
                "text": "hello",
                "reply_to_message": {
                    "message_id": 42,
                    "chat": {"id": 777},
                    "date": 1_699_999_000,
                    "text": "📩 New message from client:\n🆔 u1\n\nhi"
                }
            }
        }))
        .unwrap();

        let message = update.message.unwrap().into_operator_message();
        assert_eq!(message.message_id, OutboundMessageId::from(43));
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.reply_to, Some(OutboundMessageId::from(42)));
    }

    #[test]
    fn non_text_message_has_no_text() {
        let message: TgMessage = serde_json::from_value(json!({
            "message_id": 5,
            "chat": {"id": 1},
            "date": 0,
            "sticker": {"file_id": "abc"}
        }))
        .unwrap();
        let message = message.into_operator_message();
        assert!(message.text.is_none());
        assert!(message.reply_to.is_none());
    }

    #[test]
    fn error_envelope_parses() {
        let response: TgResponse<TgMessage> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 3",
            "parameters": {"retry_after": 3}
        }))
        .unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.error_code, Some(429));
        assert_eq!(response.parameters.unwrap().retry_after, Some(3));
    }

    #[test]
    fn update_without_message_is_accepted() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 11,
            "callback_query": {"id": "q"}
        }))
        .unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn get_updates_params_omit_missing_offset() {
        let params = GetUpdatesParams {
            offset: None,
            timeout: 30,
            allowed_updates: &["message"],
        };
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("offset").is_none());
        assert_eq!(value["timeout"], 30);
    }
}
