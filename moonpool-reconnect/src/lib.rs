//! # moonpool-reconnect
//!
//! A reconnecting, message-buffering socket layer.
//!
//! [`RetrySocket`] sits between application code and a concrete connection
//! implementation. When the connection drops abnormally it consults a
//! pluggable [`RetryPolicy`] to schedule a reconnect, and while it is down it
//! buffers outbound messages in a pluggable [`MessageQueue`], replaying them
//! in order once the next connection opens.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RetrySocket                                                │
//! │  • connect / send / close                                   │
//! │  • open / message / error / close handlers                  │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  RetryPolicy             │  MessageQueue                    │
//! │  • IntervalRetryPolicy   │  • SimpleQueue                   │
//! │    (providers: time,task)│                                  │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │  Transport + TransportFactory                               │
//! │  • MemoryTransport (in-process, scriptable)                 │
//! │  • WebSocketTransport (feature `websocket`)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use moonpool_reconnect::{RetrySocket, SocketOptions, TokioProviders, WebSocketFactory};
//!
//! let options = SocketOptions::from_json(
//!     r#"{ "reconnect": { "maxAttempts": 5, "interval": 250 }, "queueMessages": true }"#,
//! )?;
//! let socket = RetrySocket::open(WebSocketFactory, "ws://localhost:9000/feed", &options, TokioProviders::new())?;
//! socket.on_message(|message| tracing::info!(?message, "received"));
//! socket.send("subscribe")?;
//! ```
//!
//! Everything is single-threaded: run sockets inside a
//! [`tokio::task::LocalSet`].

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod providers;
pub mod queue;
pub mod retry;
pub mod socket;
pub mod transport;

pub use config::{
    INTERVAL_POLICY, QueueOption, QueueSettings, ReconnectOption, RetrySettings, SIMPLE_QUEUE,
    SocketOptions,
};
pub use error::{
    ConfigError, DisconnectError, ErrorEvent, OpenError, SocketError, SocketResult, TransportError,
};
pub use providers::{
    Providers, TaskProvider, TimeError, TimeProvider, TokioProviders, TokioTaskProvider,
    TokioTimeProvider,
};
pub use queue::{MessageQueue, SimpleQueue};
pub use retry::{AttemptOutcome, DEFAULT_RETRY_INTERVAL, IntervalRetryPolicy, Proceed, RetryPolicy};
pub use socket::{ConnectionState, LOCAL_CLOSE_REASON, OpenInfo, RetrySocket, SocketMetrics};
pub use transport::memory::{
    MemoryConnection, MemoryStatus, MemoryTransport, MemoryTransportFactory,
};
#[cfg(feature = "websocket")]
pub use transport::websocket::{WebSocketFactory, WebSocketTransport};
pub use transport::{
    ABNORMAL_CLOSURE, CloseCallback, CloseCode, ConnectionOptions, ErrorCallback, Message,
    MessageCallback, NORMAL_CLOSURE, OpenCallback, Transport, TransportFactory,
};
