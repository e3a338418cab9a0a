//! In-process transport driven by the caller.
//!
//! [`MemoryTransportFactory`] hands out [`MemoryTransport`]s and keeps a
//! [`MemoryConnection`] handle for each one. The handle plays the remote
//! side: it decides when the connection opens, delivers inbound messages,
//! injects errors and drops the connection with any close code. Nothing is
//! asynchronous; every event fires synchronously from the handle call, which
//! makes reentrancy paths easy to reach in tests.
//!
//! ```text
//! test code                MemoryConnection         MemoryTransport          RetrySocket
//! ─────────                ────────────────         ───────────────          ───────────
//! conn.open()        ────► status = Open     ────► on_open callback  ────► flush + open handler
//! conn.disconnect(1006) ─► status = Closed   ────► on_close callback ────► retry / abort
//!                                                  send(msg)         ◄──── socket.send(msg)
//! conn.sent()        ◄──── recorded messages
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    CloseCallback, CloseCode, ConnectionOptions, ErrorCallback, Message, MessageCallback,
    NORMAL_CLOSURE, OpenCallback, Transport, TransportFactory,
};
use crate::error::TransportError;

/// Lifecycle of a memory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStatus {
    /// Created, not opened yet
    Connecting,
    /// Open, accepting sends
    Open,
    /// Closed by either side
    Closed,
}

#[derive(Default)]
struct Callbacks {
    open: Option<Rc<dyn Fn()>>,
    close: Option<Rc<dyn Fn(CloseCode, String)>>,
    message: Option<Rc<dyn Fn(Message)>>,
    error: Option<Rc<dyn Fn(TransportError)>>,
}

struct ConnectionShared {
    url: String,
    protocols: Vec<String>,
    options: ConnectionOptions,
    status: MemoryStatus,
    sent: Vec<Message>,
    /// Code and reason passed to `Transport::close`, if the local side closed
    close_request: Option<(Option<CloseCode>, Option<String>)>,
    callbacks: Callbacks,
}

/// Remote-side handle of one memory connection.
#[derive(Clone)]
pub struct MemoryConnection {
    shared: Rc<RefCell<ConnectionShared>>,
}

impl MemoryConnection {
    /// URL the connection was created for.
    pub fn url(&self) -> String {
        self.shared.borrow().url.clone()
    }

    /// Sub-protocols the connection was created with.
    pub fn protocols(&self) -> Vec<String> {
        self.shared.borrow().protocols.clone()
    }

    /// Connection options the connection was created with.
    pub fn options(&self) -> ConnectionOptions {
        self.shared.borrow().options.clone()
    }

    /// Current status.
    pub fn status(&self) -> MemoryStatus {
        self.shared.borrow().status
    }

    /// Messages the local side sent, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.shared.borrow().sent.clone()
    }

    /// Code and reason of the local `close` call, if any.
    pub fn close_request(&self) -> Option<(Option<CloseCode>, Option<String>)> {
        self.shared.borrow().close_request.clone()
    }

    /// Complete the opening handshake and fire `open`.
    ///
    /// Ignored unless the connection is still connecting.
    pub fn open(&self) {
        let callback = {
            let mut shared = self.shared.borrow_mut();
            if shared.status != MemoryStatus::Connecting {
                return;
            }
            shared.status = MemoryStatus::Open;
            shared.callbacks.open.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Deliver an inbound message. Ignored unless open.
    pub fn deliver(&self, message: impl Into<Message>) {
        let callback = {
            let shared = self.shared.borrow();
            if shared.status != MemoryStatus::Open {
                return;
            }
            shared.callbacks.message.clone()
        };
        if let Some(callback) = callback {
            callback(message.into());
        }
    }

    /// Report an error without closing.
    pub fn fail(&self, error: TransportError) {
        let callback = self.shared.borrow().callbacks.error.clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    /// Drop the connection from the remote side and fire `close`.
    ///
    /// Ignored if the connection is already closed.
    pub fn disconnect(&self, code: CloseCode, reason: &str) {
        let callback = {
            let mut shared = self.shared.borrow_mut();
            if shared.status == MemoryStatus::Closed {
                return;
            }
            shared.status = MemoryStatus::Closed;
            shared.callbacks.close.clone()
        };
        if let Some(callback) = callback {
            callback(code, reason.to_string());
        }
    }
}

/// Local side of a memory connection.
pub struct MemoryTransport {
    shared: Rc<RefCell<ConnectionShared>>,
}

impl Transport for MemoryTransport {
    fn on_open(&self, callback: OpenCallback) {
        self.shared.borrow_mut().callbacks.open = Some(Rc::from(callback));
    }

    fn on_close(&self, callback: CloseCallback) {
        self.shared.borrow_mut().callbacks.close = Some(Rc::from(callback));
    }

    fn on_message(&self, callback: MessageCallback) {
        self.shared.borrow_mut().callbacks.message = Some(Rc::from(callback));
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.shared.borrow_mut().callbacks.error = Some(Rc::from(callback));
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut shared = self.shared.borrow_mut();
        match shared.status {
            MemoryStatus::Open => {
                shared.sent.push(message);
                Ok(())
            }
            MemoryStatus::Connecting => Err(TransportError::NotOpen),
            MemoryStatus::Closed => Err(TransportError::AlreadyClosed),
        }
    }

    fn close(&self, code: Option<CloseCode>, reason: Option<&str>) -> Result<(), TransportError> {
        let callback = {
            let mut shared = self.shared.borrow_mut();
            if shared.status == MemoryStatus::Closed {
                return Err(TransportError::AlreadyClosed);
            }
            shared.status = MemoryStatus::Closed;
            shared.close_request = Some((code, reason.map(str::to_string)));
            shared.callbacks.close.clone()
        };
        // Loopback: the close handshake completes immediately
        if let Some(callback) = callback {
            callback(
                code.unwrap_or(NORMAL_CLOSURE),
                reason.unwrap_or_default().to_string(),
            );
        }
        Ok(())
    }
}

#[derive(Default)]
struct FactoryState {
    connections: Vec<MemoryConnection>,
    next_failure: Option<TransportError>,
}

/// Factory producing [`MemoryTransport`]s.
///
/// Clones share state, so a test can keep one clone and give the other to
/// the socket.
#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    state: Rc<RefCell<FactoryState>>,
}

impl MemoryTransportFactory {
    /// Create a factory with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail with `error`.
    pub fn fail_next(&self, error: TransportError) {
        self.state.borrow_mut().next_failure = Some(error);
    }

    /// Number of transports created so far.
    pub fn connection_count(&self) -> usize {
        self.state.borrow().connections.len()
    }

    /// Handle of the `index`-th transport created.
    pub fn connection(&self, index: usize) -> Option<MemoryConnection> {
        self.state.borrow().connections.get(index).cloned()
    }

    /// Handle of the most recently created transport.
    pub fn latest(&self) -> Option<MemoryConnection> {
        self.state.borrow().connections.last().cloned()
    }
}

impl TransportFactory for MemoryTransportFactory {
    type Transport = MemoryTransport;

    fn create(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectionOptions,
    ) -> Result<MemoryTransport, TransportError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.next_failure.take() {
            return Err(error);
        }

        let shared = Rc::new(RefCell::new(ConnectionShared {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            options: options.clone(),
            status: MemoryStatus::Connecting,
            sent: Vec::new(),
            close_request: None,
            callbacks: Callbacks::default(),
        }));
        state.connections.push(MemoryConnection {
            shared: shared.clone(),
        });

        Ok(MemoryTransport { shared })
    }
}
