use async_trait::async_trait;

use crate::errors::TransportError;
use crate::ids::{ClientIdentity, OutboundMessageId};

/// Outbound half of the operator's messaging account.
///
/// Inbound operator messages arrive separately as [`OperatorMessage`]s
/// (see [`crate::message`]), pushed by whatever polls the account.
///
/// [`OperatorMessage`]: crate::message::OperatorMessage
#[async_trait]
pub trait OperatorTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text` to the operator annotated with `origin`, returning the
    /// id the operator will reply to.
    async fn forward(
        &self,
        origin: &ClientIdentity,
        text: &str,
    ) -> Result<OutboundMessageId, TransportError>;
}
