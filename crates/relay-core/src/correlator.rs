//! Outbound message id → originating client.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::ids::{ClientIdentity, OutboundMessageId};

struct Correlation {
    client: ClientIdentity,
    recorded_at: Instant,
}

/// Remembers which client each forwarded message came from, so an operator
/// reply to that message can be routed back.
///
/// Without a TTL entries live until restart. With one, entries older than the
/// TTL resolve as absent and are dropped by [`evict_expired`](Self::evict_expired).
pub struct Correlator {
    entries: DashMap<OutboundMessageId, Correlation>,
    ttl: Option<Duration>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Last write wins on a duplicate id.
    pub fn record(&self, message_id: OutboundMessageId, client: ClientIdentity) {
        let _ = self.entries.insert(
            message_id,
            Correlation {
                client,
                recorded_at: Instant::now(),
            },
        );
    }

    pub fn resolve(&self, message_id: &OutboundMessageId) -> Option<ClientIdentity> {
        let entry = self.entries.get(message_id)?;
        if self.is_expired(&entry) {
            return None;
        }
        Some(entry.client.clone())
    }

    /// Drop every entry past the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, correlation| !self.is_expired(correlation));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, correlation: &Correlation) -> bool {
        self.ttl
            .is_some_and(|ttl| correlation.recorded_at.elapsed() > ttl)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}
