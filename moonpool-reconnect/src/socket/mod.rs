//! Reconnecting socket.
//!
//! [`RetrySocket`] wraps a [`TransportFactory`] and keeps one logical
//! connection alive across transport failures:
//!
//! - **Abnormal close** (any code but 1000) with a retry policy installed:
//!   the error handler gets a [`DisconnectError`](crate::DisconnectError),
//!   then the policy schedules a reconnect or gives up.
//! - **Normal close**, no policy, or a local [`RetrySocket::close`]: the close
//!   handler runs and the socket is done.
//! - **Sends while connecting** go to the message queue and are replayed, in
//!   order, as soon as the next transport opens and before the open handler
//!   runs.

mod core;
mod state;

pub use self::core::{LOCAL_CLOSE_REASON, RetrySocket};
pub use self::state::{ConnectionState, OpenInfo, SocketMetrics};

use crate::config::SocketOptions;
use crate::error::{ConfigError, OpenError};
use crate::providers::Providers;
use crate::transport::TransportFactory;

impl<F: TransportFactory + 'static> RetrySocket<F> {
    /// Build an idle socket from options.
    ///
    /// The retry policy and queue are resolved here, so misconfiguration
    /// surfaces before any connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unknown policy or queue types.
    pub fn with_options<P: Providers>(
        factory: F,
        url: impl Into<String>,
        options: &SocketOptions,
        providers: P,
    ) -> Result<Self, ConfigError> {
        let retryer = options.reconnect.build(providers)?;
        let queue = options.queue_messages.build()?;

        let socket = Self::new(
            factory,
            url,
            options.protocols.clone(),
            options.connection.clone(),
        );
        socket.set_retryer(retryer);
        socket.set_message_queue(queue);
        Ok(socket)
    }

    /// Build a socket from options and connect it.
    ///
    /// Handlers registered afterwards still see the first open, since the
    /// transport reports it asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Config`] for bad options and [`OpenError::Socket`]
    /// when the first transport cannot be created.
    pub fn open<P: Providers>(
        factory: F,
        url: impl Into<String>,
        options: &SocketOptions,
        providers: P,
    ) -> Result<Self, OpenError> {
        let socket = Self::with_options(factory, url, options, providers)?;
        socket.connect()?;
        Ok(socket)
    }
}
