//! Store-and-forward queues for clients without a live channel.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::ids::ClientIdentity;
use crate::message::PendingMessage;

/// Per-identity FIFO of undelivered messages. Unbounded.
///
/// An identity has an entry only while something is queued for it.
#[derive(Default)]
pub struct PendingBuffer {
    queues: Mutex<HashMap<ClientIdentity, VecDeque<PendingMessage>>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the identity's queue, creating it if needed. Returns the new depth.
    pub fn enqueue(&self, identity: ClientIdentity, message: PendingMessage) -> usize {
        let mut queues = self.queues.lock();
        let queue = queues.entry(identity).or_default();
        queue.push_back(message);
        queue.len()
    }

    /// Take everything queued for `identity`, oldest first, and drop the entry.
    pub fn flush(&self, identity: &ClientIdentity) -> Vec<PendingMessage> {
        self.queues
            .lock()
            .remove(identity)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Put undelivered messages back ahead of anything queued since.
    pub fn requeue_front(&self, identity: ClientIdentity, messages: Vec<PendingMessage>) -> usize {
        if messages.is_empty() {
            return self.depth(&identity);
        }
        let mut queues = self.queues.lock();
        let queue = queues.entry(identity).or_default();
        for message in messages.into_iter().rev() {
            queue.push_front(message);
        }
        queue.len()
    }

    pub fn depth(&self, identity: &ClientIdentity) -> usize {
        self.queues.lock().get(identity).map_or(0, VecDeque::len)
    }

    /// Number of identities with something queued.
    pub fn client_count(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }
}
