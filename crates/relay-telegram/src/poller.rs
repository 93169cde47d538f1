//! Long-polling loop that turns operator chat updates into [`OperatorMessage`]s.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use relay_core::OperatorMessage;

use crate::client::TelegramClient;
use crate::types::Update;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Zero would turn long polling into a busy loop.
const MIN_POLL_TIMEOUT_SECS: u64 = 1;

pub struct UpdatePoller {
    client: Arc<TelegramClient>,
    operator_chat: i64,
    timeout_secs: u64,
    offset: Option<i64>,
    backoff: Duration,
}

impl UpdatePoller {
    pub fn new(client: Arc<TelegramClient>, operator_chat: i64, timeout_secs: u64) -> Self {
        Self {
            client,
            operator_chat,
            timeout_secs: timeout_secs.max(MIN_POLL_TIMEOUT_SECS),
            offset: None,
            backoff: INITIAL_BACKOFF,
        }
    }

    /// Next `offset` to request, one past the last update seen.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Keep only messages sent in the operator chat.
    pub fn accept(&self, update: Update) -> Option<OperatorMessage> {
        let message = update.message?;
        if message.chat.id != self.operator_chat {
            trace!(chat_id = message.chat.id, "ignoring message from foreign chat");
            return None;
        }
        Some(message.into_operator_message())
    }

    /// Apply one batch: advance the offset and collect accepted messages.
    pub fn absorb(&mut self, updates: Vec<Update>) -> Vec<OperatorMessage> {
        let mut accepted = Vec::with_capacity(updates.len());
        for update in updates {
            let next = update.update_id + 1;
            self.offset = Some(self.offset.map_or(next, |o| o.max(next)));
            if let Some(message) = self.accept(update) {
                accepted.push(message);
            }
        }
        accepted
    }

    /// Poll until `cancel` fires or the receiving side goes away.
    pub async fn run(mut self, tx: mpsc::Sender<OperatorMessage>, cancel: CancellationToken) {
        info!(chat_id = self.operator_chat, "telegram poller started");
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.client.get_updates(self.offset, self.timeout_secs) => result,
            };

            match result {
                Ok(updates) => {
                    self.backoff = INITIAL_BACKOFF;
                    if !updates.is_empty() {
                        debug!(count = updates.len(), "received updates");
                    }
                    for message in self.absorb(updates) {
                        if tx.send(message).await.is_err() {
                            info!("operator message receiver closed, stopping poller");
                            return;
                        }
                    }
                }
                Err(e) => {
                    let delay = e.retry_after().unwrap_or(self.backoff);
                    warn!(error = %e, kind = e.error_kind(), retry_in_ms = delay.as_millis() as u64, "telegram polling error");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        info!("telegram poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientOptions;
    use relay_core::OutboundMessageId;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPERATOR: i64 = 777;

    fn client(api_base: String) -> Arc<TelegramClient> {
        let options = ClientOptions {
            api_base,
            ..ClientOptions::default()
        };
        Arc::new(TelegramClient::new(SecretString::from("t"), options).unwrap())
    }

    fn update(update_id: i64, chat: i64, reply_to: Option<i64>) -> Update {
        let mut message = json!({
            "message_id": 100 + update_id,
            "chat": {"id": chat},
            "date": 0,
            "text": "reply"
        });
        if let Some(id) = reply_to {
            message["reply_to_message"] = json!({"message_id": id, "chat": {"id": chat}, "date": 0});
        }
        serde_json::from_value(json!({"update_id": update_id, "message": message})).unwrap()
    }

    #[test]
    fn foreign_chats_are_filtered() {
        let mut poller = UpdatePoller::new(client("http://localhost".into()), OPERATOR, 0);
        let accepted = poller.absorb(vec![
            update(1, OPERATOR, Some(42)),
            update(2, 555, Some(42)),
            update(3, OPERATOR, None),
        ]);
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].reply_to, Some(OutboundMessageId::from(42)));
        assert_eq!(accepted[1].reply_to, None);
    }

    #[test]
    fn zero_poll_timeout_is_raised_to_one_second() {
        let poller = UpdatePoller::new(client("http://localhost".into()), OPERATOR, 0);
        assert_eq!(poller.timeout_secs, 1);
    }

    #[test]
    fn offset_advances_past_every_update() {
        let mut poller = UpdatePoller::new(client("http://localhost".into()), OPERATOR, 0);
        assert_eq!(poller.offset(), None);
        poller.absorb(vec![update(7, 555, None), update(9, OPERATOR, None)]);
        assert_eq!(poller.offset(), Some(10));
        poller.absorb(Vec::new());
        assert_eq!(poller.offset(), Some(10));
    }

    #[tokio::test]
    async fn run_emits_operator_messages_and_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 1,
                    "message": {
                        "message_id": 43,
                        "chat": {"id": OPERATOR},
                        "date": 0,
                        "text": "hello",
                        "reply_to_message": {"message_id": 42, "chat": {"id": OPERATOR}, "date": 0}
                    }
                }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let poller = UpdatePoller::new(client(server.uri()), OPERATOR, 0);
        let task = tokio::spawn(poller.run(tx, cancel.clone()));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.reply_to, Some(OutboundMessageId::from(42)));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_survives_polling_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "ok": false,
                "error_code": 409,
                "description": "Conflict: terminated by other getUpdates request"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{
                    "update_id": 5,
                    "message": {"message_id": 8, "chat": {"id": OPERATOR}, "date": 0, "text": "after error"}
                }]
            })))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(UpdatePoller::new(client(server.uri()), OPERATOR, 0).run(tx, cancel.clone()));

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.text.as_deref(), Some("after error"));

        // The mock keeps answering with the same update; closing the
        // receiver stops the poller even while it is blocked on send.
        cancel.cancel();
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
