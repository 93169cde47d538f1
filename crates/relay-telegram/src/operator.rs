use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use relay_core::{ClientIdentity, OperatorTransport, OutboundMessageId, TransportError};

use crate::client::TelegramClient;

/// Text the operator sees for a forwarded client message.
pub fn annotate(origin: &ClientIdentity, text: &str) -> String {
    format!("📩 New message from client:\n🆔 {origin}\n\n{text}")
}

/// Forwards client messages into the operator's Telegram chat.
pub struct TelegramOperator {
    client: Arc<TelegramClient>,
    chat_id: i64,
}

impl TelegramOperator {
    pub fn new(client: Arc<TelegramClient>, chat_id: i64) -> Self {
        Self { client, chat_id }
    }
}

#[async_trait]
impl OperatorTransport for TelegramOperator {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip_all, fields(client_id = %origin))]
    async fn forward(
        &self,
        origin: &ClientIdentity,
        text: &str,
    ) -> Result<OutboundMessageId, TransportError> {
        let sent = self
            .client
            .send_message(self.chat_id, &annotate(origin, text))
            .await?;
        Ok(OutboundMessageId::from(sent.message_id))
    }
}
