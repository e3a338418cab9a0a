//! Reconnecting socket implementation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::state::{ConnectionState, OpenInfo, SharedRetryPolicy, SocketMetrics, SocketState};
use crate::error::{DisconnectError, ErrorEvent, SocketError, SocketResult, TransportError};
use crate::queue::MessageQueue;
use crate::retry::{AttemptOutcome, Proceed, RetryPolicy};
use crate::transport::{
    ABNORMAL_CLOSURE, CloseCode, ConnectionOptions, Message, NORMAL_CLOSURE, Transport,
    TransportFactory,
};

/// Reason reported to the close handler when the socket was closed locally.
pub const LOCAL_CLOSE_REASON: &str = "Socket was closed locally";

/// Reason used when a superseded transport is shut down by `connect()`.
const SUPERSEDED_REASON: &str = "Superseded by a new connection";

/// What an incoming close event leads to.
enum CloseDecision {
    /// `close()` was called; report a clean local close
    LocallyClosed,
    /// Normal closure or no policy; report the transport's close as-is
    Terminal,
    /// Abnormal close with a policy configured
    Retry(SharedRetryPolicy),
}

/// Where a `send` goes.
enum SendTarget<T> {
    Transport(Rc<T>),
    Queue(Option<Rc<RefCell<Box<dyn MessageQueue>>>>),
}

/// A socket that reconnects after abnormal closes and replays messages sent
/// while it was down.
///
/// `RetrySocket` is a cheap handle: clones share the same connection. It is
/// single-threaded (`!Send`) and its retry timer runs as a local task, so it
/// must live inside a [`tokio::task::LocalSet`] when a timer-based policy is
/// installed.
///
/// Handlers are invoked without any internal borrow held, so they may call
/// back into the socket, including [`close`](Self::close) from the error
/// handler to stop a pending reconnect.
///
/// ```rust,ignore
/// let socket = RetrySocket::new(factory, "ws://localhost:9000/feed", vec![], ConnectionOptions::Null);
/// socket.set_retryer(Some(Box::new(IntervalRetryPolicy::new_with_defaults(TokioProviders::new()))));
/// socket.set_message_queue(Some(Box::new(SimpleQueue::new())));
/// socket.on_message(|message| println!("{message:?}"));
/// socket.connect()?;
/// socket.send("subscribe")?;
/// ```
pub struct RetrySocket<F: TransportFactory> {
    inner: Rc<RefCell<SocketState<F>>>,
}

impl<F: TransportFactory> Clone for RetrySocket<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: TransportFactory + 'static> RetrySocket<F> {
    /// Create an idle socket. Nothing is connected until [`connect`](Self::connect).
    pub fn new(
        factory: F,
        url: impl Into<String>,
        protocols: Vec<String>,
        connection_options: ConnectionOptions,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SocketState::new(
                factory,
                url.into(),
                protocols,
                connection_options,
            ))),
        }
    }

    /// Install or remove the retry policy. Without one, every close is final.
    pub fn set_retryer(&self, retryer: Option<Box<dyn RetryPolicy>>) {
        self.inner.borrow_mut().retryer = retryer.map(|r| Rc::new(RefCell::new(r)));
    }

    /// Install or remove the outbound queue. Without one, messages sent while
    /// reconnecting are dropped.
    pub fn set_message_queue(&self, queue: Option<Box<dyn MessageQueue>>) {
        self.inner.borrow_mut().message_queue = queue.map(|q| Rc::new(RefCell::new(q)));
    }

    /// Set the open handler, replacing any previous one.
    pub fn on_open(&self, handler: impl Fn(OpenInfo) + 'static) {
        self.inner.borrow_mut().handlers.open = Some(Rc::new(handler));
    }

    /// Set the inbound message handler, replacing any previous one.
    pub fn on_message(&self, handler: impl Fn(Message) + 'static) {
        self.inner.borrow_mut().handlers.message = Some(Rc::new(handler));
    }

    /// Set the error handler, replacing any previous one.
    pub fn on_error(&self, handler: impl Fn(ErrorEvent) + 'static) {
        self.inner.borrow_mut().handlers.error = Some(Rc::new(handler));
    }

    /// Set the close handler, replacing any previous one.
    ///
    /// Called exactly once per terminal close, with the close code and reason.
    pub fn on_close(&self, handler: impl Fn(CloseCode, String) + 'static) {
        self.inner.borrow_mut().handlers.close = Some(Rc::new(handler));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().observed_state()
    }

    /// Whether sends are currently buffered (or dropped) instead of forwarded.
    pub fn is_connecting(&self) -> bool {
        self.inner.borrow().connecting
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// URL this socket connects to.
    pub fn url(&self) -> String {
        self.inner.borrow().url.clone()
    }

    /// Snapshot of the socket's counters.
    pub fn metrics(&self) -> SocketMetrics {
        self.inner.borrow().metrics
    }

    /// Create a fresh transport and start connecting.
    ///
    /// Also usable on a live socket to force a reconnect: the previous
    /// transport is detached and closed.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Closed`] once the socket is closed, or the
    /// factory's error if the transport cannot be created.
    pub fn connect(&self) -> SocketResult<&Self> {
        self.start_transport()?;
        Ok(self)
    }

    /// Send a message, or buffer it while reconnecting.
    ///
    /// While connecting, the message goes to the queue if one is installed
    /// and is silently dropped otherwise.
    ///
    /// # Errors
    ///
    /// - [`SocketError::Closed`] after [`close`](Self::close) or a give-up
    /// - [`SocketError::NotConnected`] before the first [`connect`](Self::connect)
    /// - [`SocketError::Transport`] when the live transport rejects it
    pub fn send(&self, message: impl Into<Message>) -> SocketResult<()> {
        let message = message.into();

        let target = {
            let state = self.inner.borrow();
            if state.observed_state() == ConnectionState::Closed {
                return Err(SocketError::Closed);
            }
            if state.connecting {
                SendTarget::Queue(state.message_queue.clone())
            } else {
                match &state.transport {
                    Some(transport) => SendTarget::Transport(transport.clone()),
                    None => return Err(SocketError::NotConnected),
                }
            }
        };

        match target {
            SendTarget::Transport(transport) => {
                transport.send(message)?;
                self.inner.borrow_mut().metrics.messages_sent += 1;
            }
            SendTarget::Queue(Some(queue)) => {
                queue.borrow_mut().push(message);
                self.inner.borrow_mut().metrics.messages_queued += 1;
            }
            SendTarget::Queue(None) => {
                tracing::debug!(
                    bytes = message.len(),
                    "dropping message sent while connecting"
                );
                self.inner.borrow_mut().metrics.messages_dropped += 1;
            }
        }
        Ok(())
    }

    /// Close the socket for good.
    ///
    /// Cancels any pending retry, purges the queue and closes the transport.
    /// The close handler runs when the transport reports its close, with
    /// code 1000 and [`LOCAL_CLOSE_REASON`].
    pub fn close(&self, code: Option<CloseCode>, reason: Option<&str>) {
        let (retryer, queue, transport) = {
            let mut state = self.inner.borrow_mut();
            state.closed = true;
            (
                state.retryer.clone(),
                state.message_queue.clone(),
                state.transport.clone(),
            )
        };

        tracing::info!(?code, ?reason, "closing socket");

        if let Some(retryer) = retryer {
            retryer.borrow_mut().cancel();
        }
        if let Some(queue) = queue {
            queue.borrow_mut().purge();
        }
        if let Some(transport) = transport {
            if let Err(e) = transport.close(code, reason) {
                // Already closed; the end state is reached either way
                tracing::debug!(error = %e, "ignoring transport close failure");
            }
        }
    }

    /// Build a transport, make it current and subscribe to its events.
    fn start_transport(&self) -> SocketResult<()> {
        let transport = {
            let state = self.inner.borrow();
            if state.observed_state() == ConnectionState::Closed {
                return Err(SocketError::Closed);
            }
            state
                .factory
                .create(&state.url, &state.protocols, &state.connection_options)?
        };
        let transport = Rc::new(transport);

        let (generation, previous) = {
            let mut state = self.inner.borrow_mut();
            state.connecting = true;
            state.state = ConnectionState::Connecting;
            state.generation += 1;
            let previous = state.transport.replace(transport.clone());
            tracing::info!(url = %state.url, generation = state.generation, "connecting");
            (state.generation, previous)
        };

        self.subscribe(&transport, generation);

        // Its events are already filtered out by generation
        if let Some(previous) = previous {
            if let Err(e) = previous.close(Some(NORMAL_CLOSURE), Some(SUPERSEDED_REASON)) {
                tracing::debug!(error = %e, "ignoring superseded transport close failure");
            }
        }
        Ok(())
    }

    /// Register one internal callback per event kind on `transport`.
    fn subscribe(&self, transport: &F::Transport, generation: u64) {
        let weak = Rc::downgrade(&self.inner);
        transport.on_open(Box::new(move || {
            if let Some(socket) = Self::current(&weak, generation) {
                socket.handle_open();
            }
        }));

        let weak = Rc::downgrade(&self.inner);
        transport.on_close(Box::new(move |code, reason| {
            if let Some(socket) = Self::current(&weak, generation) {
                socket.handle_close(code, reason);
            }
        }));

        let weak = Rc::downgrade(&self.inner);
        transport.on_message(Box::new(move |message| {
            if let Some(socket) = Self::current(&weak, generation) {
                let handler = socket.inner.borrow().handlers.message.clone();
                if let Some(handler) = handler {
                    handler(message);
                }
            }
        }));

        let weak = Rc::downgrade(&self.inner);
        transport.on_error(Box::new(move |error| {
            if let Some(socket) = Self::current(&weak, generation) {
                tracing::debug!(error = %error, "transport error");
                socket.emit_error(ErrorEvent::Transport(error));
            }
        }));
    }

    /// Resolve a transport callback to its socket, if the socket still exists
    /// and `generation` is still its current transport.
    fn current(weak: &Weak<RefCell<SocketState<F>>>, generation: u64) -> Option<Self> {
        let inner = weak.upgrade()?;
        let current = inner.borrow().generation;
        if current != generation {
            tracing::trace!(generation, current, "ignoring event from superseded transport");
            return None;
        }
        Some(Self { inner })
    }

    /// Transport opened: reset the policy, replay the queue, notify.
    fn handle_open(&self) {
        let (retryer, queue) = {
            let mut state = self.inner.borrow_mut();
            if state.observed_state() == ConnectionState::Closed {
                tracing::debug!("ignoring open on a closed socket");
                return;
            }
            state.connecting = false;
            state.state = ConnectionState::Open;
            (state.retryer.clone(), state.message_queue.clone())
        };

        let retry_attempts_used = match retryer {
            Some(retryer) => {
                let mut retryer = retryer.borrow_mut();
                let used = retryer.attempts();
                retryer.cancel();
                retryer.reset();
                used
            }
            None => 0,
        };

        if let Some(queue) = queue {
            let mut backlog = Vec::new();
            queue.borrow_mut().flush(&mut |message| backlog.push(message));
            if !backlog.is_empty() {
                tracing::debug!(messages = backlog.len(), "replaying queued messages");
            }
            for message in backlog {
                if let Err(e) = self.send(message) {
                    tracing::warn!(error = %e, "failed to replay queued message");
                }
            }
        }

        let (handler, info) = {
            let mut state = self.inner.borrow_mut();
            state.metrics.open_count += 1;
            (
                state.handlers.open.clone(),
                state.open_info(retry_attempts_used),
            )
        };

        tracing::info!(
            open_count = info.open_count,
            reconnect = info.reconnect,
            retry_attempts_used,
            "socket open"
        );

        if let Some(handler) = handler {
            handler(info);
        }
    }

    /// Transport closed: decide between give-up and another attempt.
    fn handle_close(&self, code: CloseCode, reason: String) {
        let decision = {
            let state = self.inner.borrow();
            if state.closed {
                CloseDecision::LocallyClosed
            } else if code == NORMAL_CLOSURE {
                CloseDecision::Terminal
            } else {
                match &state.retryer {
                    Some(retryer) => CloseDecision::Retry(retryer.clone()),
                    None => CloseDecision::Terminal,
                }
            }
        };

        let retryer = match decision {
            CloseDecision::LocallyClosed => {
                self.abort(NORMAL_CLOSURE, LOCAL_CLOSE_REASON.to_string());
                return;
            }
            CloseDecision::Terminal => {
                self.abort(code, reason);
                return;
            }
            CloseDecision::Retry(retryer) => retryer,
        };

        let retry_attempts_used = retryer.borrow().attempts();
        let error = {
            let mut state = self.inner.borrow_mut();
            state.metrics.close_count += 1;
            DisconnectError {
                code,
                message: reason.clone(),
                close_count: state.metrics.close_count,
                open_count: state.metrics.open_count,
                retry_attempts_used,
            }
        };

        tracing::warn!(
            code,
            reason = %reason,
            close_count = error.close_count,
            retry_attempts_used,
            "connection lost"
        );

        self.emit_error(ErrorEvent::Disconnected(error));

        // The error handler may have closed the socket or removed the policy
        let retryer = {
            let mut state = self.inner.borrow_mut();
            if state.closed {
                tracing::debug!("socket closed by error handler, not retrying");
                return;
            }
            let retryer = state.retryer.clone();
            match retryer {
                Some(retryer) => {
                    state.connecting = true;
                    state.state = ConnectionState::Retrying;
                    retryer
                }
                None => {
                    drop(state);
                    self.abort(code, reason);
                    return;
                }
            }
        };

        let weak = Rc::downgrade(&self.inner);
        let proceed: Proceed = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.retry_connect();
            }
        });

        let outcome = retryer.borrow_mut().attempt(proceed);
        if outcome == AttemptOutcome::GaveUp {
            tracing::warn!(code, "retry policy gave up");
            self.abort(code, reason);
        }
    }

    /// Scheduled reconnect fired.
    fn retry_connect(&self) {
        match self.start_transport() {
            Ok(()) => {}
            Err(SocketError::Closed) => {
                tracing::debug!("socket closed before scheduled reconnect");
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect attempt failed");
                let reason = match e {
                    SocketError::Transport(TransportError::ConnectionFailed(reason)) => reason,
                    other => other.to_string(),
                };
                self.handle_close(ABNORMAL_CLOSURE, reason);
            }
        }
    }

    /// Terminal exit of a disconnect episode.
    fn abort(&self, code: CloseCode, reason: String) {
        let (queue, handler) = {
            let mut state = self.inner.borrow_mut();
            state.connecting = false;
            state.state = ConnectionState::Closed;
            (state.message_queue.clone(), state.handlers.close.clone())
        };

        if let Some(queue) = queue {
            queue.borrow_mut().purge();
        }

        tracing::info!(code, reason = %reason, "socket closed");

        if let Some(handler) = handler {
            handler(code, reason);
        }
    }

    fn emit_error(&self, error: ErrorEvent) {
        let handler = self.inner.borrow().handlers.error.clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }
}
