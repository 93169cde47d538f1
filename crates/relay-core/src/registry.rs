//! Client identity → current live channel.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::ClientConnection;
use crate::ids::ClientIdentity;

/// Whether a client currently has a live channel.
#[derive(Clone, Debug)]
pub enum Presence {
    Connected(Arc<ClientConnection>),
    Disconnected,
}

impl Presence {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// At most one channel per identity. Presence tracking only.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: DashMap<ClientIdentity, Arc<ClientConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `channel` the current channel for `identity`.
    ///
    /// Returns the channel it displaced, if that was a different connection.
    pub fn register(
        &self,
        identity: ClientIdentity,
        channel: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        self.entries
            .insert(identity, Arc::clone(&channel))
            .filter(|previous| previous.id != channel.id)
    }

    /// Remove `channel` from the identity it is bound to, if it is still the
    /// current channel there. A stale channel is a no-op.
    pub fn unregister(&self, channel: &ClientConnection) -> bool {
        match channel.identity() {
            Some(identity) => self.unregister_as(&identity, channel),
            None => false,
        }
    }

    /// Like [`unregister`](Self::unregister) but for an explicit identity.
    pub fn unregister_as(&self, identity: &ClientIdentity, channel: &ClientConnection) -> bool {
        self.entries
            .remove_if(identity, |_, stored| stored.id == channel.id)
            .is_some()
    }

    pub fn resolve(&self, identity: &ClientIdentity) -> Option<Arc<ClientConnection>> {
        self.entries.get(identity).map(|entry| Arc::clone(entry.value()))
    }

    pub fn presence(&self, identity: &ClientIdentity) -> Presence {
        self.resolve(identity)
            .map_or(Presence::Disconnected, Presence::Connected)
    }

    /// Number of identities with a live channel.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
