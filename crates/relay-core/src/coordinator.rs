//! Glue between the registry, the correlator and the pending buffer.
//!
//! Two compound sequences must not interleave for the same client:
//! "resolve channel, else enqueue" and "swap registration, then flush". Both
//! run under the routing lock, which is never held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::connection::ClientConnection;
use crate::correlator::Correlator;
use crate::errors::RelayError;
use crate::ids::{ClientIdentity, OutboundMessageId};
use crate::message::{OperatorMessage, PendingMessage, RelayRequest, ServerEvent};
use crate::pending::PendingBuffer;
use crate::registry::{ConnectionRegistry, Presence};
use crate::transport::OperatorTransport;

/// Client-facing text for a request missing `clientId` or `text`.
pub const MISSING_FIELDS: &str = "clientId & text required";

/// A client message that reached the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub message_id: OutboundMessageId,
    pub client: ClientIdentity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Operator chatter that does not reply to anything.
    NotAReply,
    /// Replies to a message the relay never forwarded (or has forgotten).
    Uncorrelated,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAReply => "not_a_reply",
            Self::Uncorrelated => "uncorrelated",
        }
    }
}

/// What happened to one operator message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Handed to the client's live channel.
    Delivered { client: ClientIdentity },
    /// Queued until the client registers again.
    Buffered { client: ClientIdentity, depth: usize },
    Ignored(IgnoreReason),
}

/// What happened when a channel registered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Backlog messages delivered over the new channel.
    pub flushed: usize,
    /// A different connection held this identity and was closed.
    pub replaced: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub connections: usize,
    pub pending_clients: usize,
    pub correlations: usize,
}

pub struct RelayCoordinator {
    registry: ConnectionRegistry,
    correlator: Correlator,
    pending: PendingBuffer,
    transport: Arc<dyn OperatorTransport>,
    routing: Mutex<()>,
}

impl RelayCoordinator {
    pub fn new(transport: Arc<dyn OperatorTransport>) -> Self {
        Self::with_correlation_ttl(transport, None)
    }

    pub fn with_correlation_ttl(
        transport: Arc<dyn OperatorTransport>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            correlator: Correlator::with_ttl(ttl),
            pending: PendingBuffer::new(),
            transport,
            routing: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    /// Client → operator. Validation and transport failures leave no trace in
    /// any of the three tables.
    #[instrument(skip_all, fields(client_id, transport = self.transport.name()))]
    pub async fn relay_from_client(
        &self,
        request: RelayRequest,
    ) -> Result<ForwardReceipt, RelayError> {
        let (client, text) = validate(request)?;
        let _ = tracing::Span::current().record("client_id", client.as_str());

        let message_id = match self.transport.forward(&client, &text).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "forward to operator failed");
                return Err(e.into());
            }
        };

        self.correlator.record(message_id.clone(), client.clone());
        info!(message_id = %message_id, "client message forwarded");
        Ok(ForwardReceipt { message_id, client })
    }

    /// Operator → client. Anything that is not a reply to a forwarded message
    /// is ignored without error.
    pub fn handle_operator_message(&self, message: &OperatorMessage) -> ReplyOutcome {
        let Some(reply_to) = &message.reply_to else {
            debug!(message_id = %message.message_id, "operator message is not a reply");
            return ReplyOutcome::Ignored(IgnoreReason::NotAReply);
        };
        let Some(client) = self.correlator.resolve(reply_to) else {
            debug!(reply_to = %reply_to, "reply to unknown message");
            return ReplyOutcome::Ignored(IgnoreReason::Uncorrelated);
        };

        let reply = PendingMessage::new(message.text.clone().unwrap_or_default());
        self.route(client, reply)
    }

    /// Deliver to the live channel if there is one, otherwise buffer.
    pub fn route(&self, client: ClientIdentity, reply: PendingMessage) -> ReplyOutcome {
        let _routing = self.routing.lock();
        match self.registry.presence(&client) {
            Presence::Connected(channel) => {
                if channel.send_event(&ServerEvent::AdminMessage(reply.clone())) {
                    info!(client_id = %client, "reply delivered to client");
                    return ReplyOutcome::Delivered { client };
                }
                warn!(client_id = %client, conn_id = %channel.id, "client channel gone, buffering reply");
                let _ = self.registry.unregister(&channel);
                let depth = self.pending.enqueue(client.clone(), reply);
                ReplyOutcome::Buffered { client, depth }
            }
            Presence::Disconnected => {
                let depth = self.pending.enqueue(client.clone(), reply);
                info!(client_id = %client, depth, "client offline, reply buffered");
                ReplyOutcome::Buffered { client, depth }
            }
        }
    }

    /// Make `channel` current for `identity` and drain its backlog over it.
    ///
    /// A different connection previously holding the identity is told it was
    /// replaced and closed. Nothing can be enqueued for `identity` between the
    /// swap and the flush. A channel that is already closed is ignored, and
    /// whatever it fails to accept stays buffered.
    pub fn register(
        &self,
        identity: ClientIdentity,
        channel: Arc<ClientConnection>,
    ) -> RegisterOutcome {
        let _routing = self.routing.lock();

        if !channel.is_open() {
            debug!(client_id = %identity, conn_id = %channel.id, "ignoring register from closed connection");
            return RegisterOutcome::default();
        }

        if let Some(previous) = channel.bind(identity.clone()) {
            if previous != identity {
                let _ = self.registry.unregister_as(&previous, &channel);
            }
        }

        let displaced = self.registry.register(identity.clone(), Arc::clone(&channel));
        if let Some(old) = &displaced {
            debug!(client_id = %identity, old_conn = %old.id, "closing replaced connection");
            let _ = old.send_event(&ServerEvent::Replaced);
            old.close();
        }

        let mut backlog = self.pending.flush(&identity).into_iter();
        let mut flushed = 0;
        while let Some(message) = backlog.next() {
            if channel.send_event(&ServerEvent::AdminMessage(message.clone())) {
                flushed += 1;
                continue;
            }
            let unsent: Vec<_> = std::iter::once(message).chain(backlog).collect();
            warn!(
                client_id = %identity,
                conn_id = %channel.id,
                requeued = unsent.len(),
                "client channel gone during flush"
            );
            self.pending.requeue_front(identity.clone(), unsent);
            let _ = self.registry.unregister(&channel);
            break;
        }

        info!(client_id = %identity, conn_id = %channel.id, flushed, "client registered");
        RegisterOutcome {
            flushed,
            replaced: displaced.is_some(),
        }
    }

    /// Disconnect event. Stale channels are ignored.
    pub fn unregister(&self, channel: &ClientConnection) -> bool {
        let _routing = self.routing.lock();
        let removed = self.registry.unregister(channel);
        if removed {
            debug!(conn_id = %channel.id, "client unregistered");
        }
        removed
    }

    pub fn evict_expired_correlations(&self) -> usize {
        self.correlator.evict_expired()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.len(),
            pending_clients: self.pending.client_count(),
            correlations: self.correlator.len(),
        }
    }
}

fn validate(request: RelayRequest) -> Result<(ClientIdentity, String), RelayError> {
    match (request.client_id, request.text) {
        (Some(client), Some(text)) if !client.is_empty() && !text.is_empty() => {
            Ok((ClientIdentity::from_raw(client), text))
        }
        _ => Err(RelayError::Validation(MISSING_FIELDS)),
    }
}
