//! Unbounded in-memory FIFO queue.

use std::collections::VecDeque;

use super::MessageQueue;
use crate::transport::Message;

/// Unbounded FIFO queue backed by a [`VecDeque`].
#[derive(Debug, Default)]
pub struct SimpleQueue {
    messages: VecDeque<Message>,
}

impl SimpleQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageQueue for SimpleQueue {
    fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        tracing::trace!(queued = self.messages.len(), "message queued");
    }

    fn purge(&mut self) {
        if !self.messages.is_empty() {
            tracing::debug!(dropped = self.messages.len(), "purging message queue");
        }
        self.messages.clear();
    }

    fn flush(&mut self, send: &mut dyn FnMut(Message)) {
        // Re-check on every iteration rather than draining a snapshot
        while let Some(message) = self.messages.pop_front() {
            send(message);
        }
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}
