//! Error types for the reconnecting socket.

use thiserror::Error;

use crate::transport::CloseCode;

/// Errors raised by a [`Transport`](crate::Transport) or its factory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be created or could not reach the remote end
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport is already closed
    #[error("Transport is already closed")]
    AlreadyClosed,

    /// The transport has not finished its opening handshake
    #[error("Transport is not open yet")]
    NotOpen,

    /// I/O or protocol failure reported by the underlying implementation
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

/// Errors returned by [`RetrySocket`](crate::RetrySocket) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// `send` was called before the first `connect`
    #[error("Socket is not connected")]
    NotConnected,

    /// The socket was closed locally or its retry loop terminated
    #[error("Socket is closed")]
    Closed,

    /// The transport rejected the operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for socket operations.
pub type SocketResult<T> = Result<T, SocketError>;

/// Construction-time configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `reconnect.type` names a policy this crate does not provide
    #[error("Invalid reconnect type: {0}")]
    UnknownRetryPolicy(String),

    /// `queueMessages.type` names a queue this crate does not provide
    #[error("Invalid message queue type: {0}")]
    UnknownMessageQueue(String),

    /// The options document could not be parsed
    #[error("Invalid socket options: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error delivered to the user error handler after an abnormal close.
///
/// Carries the close metadata together with the connection counters at the
/// time of the disconnect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Connection closed abnormally (code {code}): {message}")]
pub struct DisconnectError {
    /// Close code reported by the transport.
    pub code: CloseCode,
    /// Close reason reported by the transport.
    pub message: String,
    /// Number of abnormal closes so far, this one included.
    pub close_count: u32,
    /// Number of successful opens so far.
    pub open_count: u32,
    /// Retry attempts spent since the last successful open.
    pub retry_attempts_used: u32,
}

/// Payload of the user error handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    /// Error reported directly by the live transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Abnormal close that is about to be retried
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),
}

/// Errors from building and connecting a socket in one step.
#[derive(Error, Debug)]
pub enum OpenError {
    /// The options could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The first connect failed
    #[error(transparent)]
    Socket(#[from] SocketError),
}
