//! Canonical transport surface.
//!
//! A [`Transport`] is one connection attempt: it is created by a
//! [`TransportFactory`], reports `open`/`message`/`error`/`close` through the
//! callbacks registered on it, and accepts `send`/`close`. Concrete socket
//! implementations are adapted to this surface; [`RetrySocket`](crate::RetrySocket)
//! never sees anything else.
//!
//! Transports are single-threaded and take `&self`: the callbacks they invoke
//! may call straight back into the transport, so implementations must not
//! hold internal borrows while calling out.

use std::fmt;

use crate::error::TransportError;

pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

/// Websocket close status code.
pub type CloseCode = u16;

/// Clean, intentional shutdown. Never retried.
pub const NORMAL_CLOSURE: CloseCode = 1000;

/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: CloseCode = 1006;

/// Opaque, implementation-specific connection options handed to the factory.
pub type ConnectionOptions = serde_json::Value;

/// Callback invoked when the transport finishes opening.
pub type OpenCallback = Box<dyn Fn()>;

/// Callback invoked when the transport closes, with code and reason.
pub type CloseCallback = Box<dyn Fn(CloseCode, String)>;

/// Callback invoked for every inbound message.
pub type MessageCallback = Box<dyn Fn(Message)>;

/// Callback invoked when the transport reports an error.
pub type ErrorCallback = Box<dyn Fn(TransportError)>;

/// A data frame.
#[derive(Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Message {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(text) => write!(f, "Text({:?})", text),
            Message::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Binary(bytes)
    }
}

/// One connection attempt to a remote endpoint.
///
/// Each `on_*` registration replaces the previous callback for that event.
pub trait Transport {
    /// Register the open callback.
    fn on_open(&self, callback: OpenCallback);

    /// Register the close callback.
    fn on_close(&self, callback: CloseCallback);

    /// Register the inbound message callback.
    fn on_message(&self, callback: MessageCallback);

    /// Register the error callback.
    fn on_error(&self, callback: ErrorCallback);

    /// Send a message to the remote end.
    ///
    /// # Errors
    ///
    /// Fails if the transport is not open or already closed.
    fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Start closing the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyClosed`] when there is nothing left to
    /// close.
    fn close(&self, code: Option<CloseCode>, reason: Option<&str>) -> Result<(), TransportError>;
}

/// Creates a fresh [`Transport`] for every connect or reconnect.
pub trait TransportFactory {
    /// Transport type produced by this factory.
    type Transport: Transport + 'static;

    /// Create and start a new transport.
    ///
    /// # Errors
    ///
    /// Fails when the transport cannot even be started (bad URL, no
    /// runtime); failures of the connection itself are reported through the
    /// transport's close callback.
    fn create(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectionOptions,
    ) -> Result<Self::Transport, TransportError>;
}
