use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::TransportError;
use crate::ids::{ClientIdentity, OutboundMessageId};
use crate::transport::OperatorTransport;

/// In-memory operator for deterministic tests without network calls.
///
/// Hands out sequential message ids and records every forwarded message.
/// Queued failures are returned, in order, before any id is issued.
pub struct MockOperator {
    next_id: AtomicI64,
    sent: Mutex<Vec<(ClientIdentity, String)>>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl MockOperator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// The first forwarded message gets id `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            next_id: AtomicI64::new(first_id),
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Make the next `forward` fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.failures.lock().push_back(error);
    }

    pub fn sent(&self) -> Vec<(ClientIdentity, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Default for MockOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperatorTransport for MockOperator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn forward(
        &self,
        origin: &ClientIdentity,
        text: &str,
    ) -> Result<OutboundMessageId, TransportError> {
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        self.sent.lock().push((origin.clone(), text.to_owned()));
        Ok(OutboundMessageId::from(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}
