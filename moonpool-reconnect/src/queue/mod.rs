//! Outbound buffering while the socket is reconnecting.
//!
//! A [`MessageQueue`] holds messages passed to
//! [`RetrySocket::send`](crate::RetrySocket::send) while no live transport
//! exists. The socket flushes it on the next successful open, before the
//! user's open handler runs, and purges it whenever the socket closes or
//! gives up.

mod simple;

pub use simple::SimpleQueue;

use crate::transport::Message;

/// FIFO buffer strategy for outbound messages.
pub trait MessageQueue {
    /// Append a message to the tail of the queue.
    fn push(&mut self, message: Message);

    /// Discard every buffered message.
    fn purge(&mut self);

    /// Remove messages from the head and pass each to `send`, oldest first,
    /// until the queue is empty.
    fn flush(&mut self, send: &mut dyn FnMut(Message));

    /// Number of buffered messages.
    fn len(&self) -> usize;

    /// Whether nothing is buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
