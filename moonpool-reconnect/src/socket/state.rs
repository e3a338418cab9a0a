//! State record and event payloads of a [`RetrySocket`](super::RetrySocket).

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ErrorEvent;
use crate::queue::MessageQueue;
use crate::retry::RetryPolicy;
use crate::transport::{CloseCode, ConnectionOptions, Message, TransportFactory};

/// Connection lifecycle.
///
/// ```text
/// Idle ──connect()──► Connecting ──open──► Open
///                         ▲                 │ abnormal close,
///                         │ timer fires     │ policy present
///                         └──── Retrying ◄──┘
/// any ──abort──► Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `connect()` not called yet
    Idle,
    /// A transport exists and is opening
    Connecting,
    /// The current transport is open
    Open,
    /// Waiting for the retry policy's timer
    Retrying,
    /// Closed locally or retry loop terminated; no transition leaves it
    Closed,
}

/// Payload of the user open handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenInfo {
    /// Successful opens so far, this one included.
    pub open_count: u32,
    /// Abnormal closes so far.
    pub close_count: u32,
    /// Whether this open follows an earlier one.
    pub reconnect: bool,
    /// Retry attempts it took to get here since the previous open.
    pub retry_attempts_used: u32,
}

/// Counters describing a socket's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketMetrics {
    /// Successful transport opens
    pub open_count: u32,
    /// Abnormal closes handed to the retry policy
    pub close_count: u32,
    /// Messages forwarded to a transport
    pub messages_sent: u64,
    /// Messages buffered while reconnecting
    pub messages_queued: u64,
    /// Messages dropped while reconnecting without a queue
    pub messages_dropped: u64,
}

pub(super) type OpenHandler = Rc<dyn Fn(OpenInfo)>;
pub(super) type MessageHandler = Rc<dyn Fn(Message)>;
pub(super) type ErrorHandler = Rc<dyn Fn(ErrorEvent)>;
pub(super) type CloseHandler = Rc<dyn Fn(CloseCode, String)>;

pub(super) type SharedRetryPolicy = Rc<RefCell<Box<dyn RetryPolicy>>>;
pub(super) type SharedMessageQueue = Rc<RefCell<Box<dyn MessageQueue>>>;

/// One slot per event kind; registering again replaces the slot.
#[derive(Default)]
pub(super) struct Handlers {
    pub(super) open: Option<OpenHandler>,
    pub(super) message: Option<MessageHandler>,
    pub(super) error: Option<ErrorHandler>,
    pub(super) close: Option<CloseHandler>,
}

/// Everything a socket knows, behind one `RefCell`.
///
/// Borrows of this record never outlive a single transition step: handlers,
/// policies, queues and transports are cloned out before they are called.
pub(super) struct SocketState<F: TransportFactory> {
    pub(super) factory: F,
    pub(super) url: String,
    pub(super) protocols: Vec<String>,
    pub(super) connection_options: ConnectionOptions,

    pub(super) transport: Option<Rc<F::Transport>>,
    /// Bumped for every transport; events tagged with an older value are dropped
    pub(super) generation: u64,

    pub(super) handlers: Handlers,
    pub(super) retryer: Option<SharedRetryPolicy>,
    pub(super) message_queue: Option<SharedMessageQueue>,

    pub(super) state: ConnectionState,
    pub(super) connecting: bool,
    pub(super) closed: bool,
    pub(super) metrics: SocketMetrics,
}

impl<F: TransportFactory> SocketState<F> {
    pub(super) fn new(
        factory: F,
        url: String,
        protocols: Vec<String>,
        connection_options: ConnectionOptions,
    ) -> Self {
        Self {
            factory,
            url,
            protocols,
            connection_options,
            transport: None,
            generation: 0,
            handlers: Handlers::default(),
            retryer: None,
            message_queue: None,
            state: ConnectionState::Idle,
            connecting: false,
            closed: false,
            metrics: SocketMetrics::default(),
        }
    }

    /// State as observed from outside: a local close wins immediately.
    pub(super) fn observed_state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Closed
        } else {
            self.state
        }
    }

    pub(super) fn open_info(&self, retry_attempts_used: u32) -> OpenInfo {
        OpenInfo {
            open_count: self.metrics.open_count,
            close_count: self.metrics.close_count,
            reconnect: self.metrics.open_count > 1,
            retry_attempts_used,
        }
    }
}
