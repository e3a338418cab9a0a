//! Shared fixtures for the socket integration tests.
//!
//! - [`Recorder`] captures every handler invocation in order
//! - [`ScriptedFactory`] builds transports whose events fire only when a test
//!   says so, any number of times
//! - [`ManualPolicy`] holds `proceed` until the test fires it
//! - [`InspectableQueue`] exposes the queue the socket buffers into

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use moonpool_reconnect::{
    AttemptOutcome, CloseCallback, CloseCode, ConnectionOptions, ErrorCallback, ErrorEvent,
    Message, MessageCallback, MessageQueue, OpenCallback, OpenInfo, Proceed, RetryPolicy,
    RetrySocket, SimpleQueue, Transport, TransportError, TransportFactory,
};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Run a test body inside a `LocalSet` so retry timers can be spawned.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    init_tracing();
    LocalSet::new().run_until(future).await
}

/// One user-visible socket event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open(OpenInfo),
    Message(Message),
    Error(ErrorEvent),
    Close(CloseCode, String),
}

/// Ordered log of handler invocations.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    /// Register all four handlers on `socket`.
    pub fn attach<F: TransportFactory + 'static>(socket: &RetrySocket<F>) -> Self {
        init_tracing();
        let recorder = Self::default();

        let events = recorder.events.clone();
        socket.on_open(move |info| events.borrow_mut().push(Event::Open(info)));
        let events = recorder.events.clone();
        socket.on_message(move |message| events.borrow_mut().push(Event::Message(message)));
        let events = recorder.events.clone();
        socket.on_error(move |error| events.borrow_mut().push(Event::Error(error)));
        let events = recorder.events.clone();
        socket.on_close(move |code, reason| events.borrow_mut().push(Event::Close(code, reason)));

        recorder
    }

    pub fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn closes(&self) -> Vec<(CloseCode, String)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Close(code, reason) => Some((*code, reason.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> Vec<OpenInfo> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Open(info) => Some(*info),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct ScriptedInner {
    open: RefCell<Option<Rc<dyn Fn()>>>,
    close: RefCell<Option<Rc<dyn Fn(CloseCode, String)>>>,
    message: RefCell<Option<Rc<dyn Fn(Message)>>>,
    error: RefCell<Option<Rc<dyn Fn(TransportError)>>>,
    opened: Cell<bool>,
    sent: RefCell<Vec<Message>>,
    close_calls: RefCell<Vec<(Option<CloseCode>, Option<String>)>>,
}

/// Transport with no state machine of its own.
///
/// `close` only records the request; the close event arrives when the test
/// fires it, like a real close handshake.
pub struct ScriptedTransport {
    inner: Rc<ScriptedInner>,
}

/// Test-side handle of a [`ScriptedTransport`].
#[derive(Clone)]
pub struct ScriptedHandle {
    inner: Rc<ScriptedInner>,
}

impl ScriptedHandle {
    pub fn fire_open(&self) {
        self.inner.opened.set(true);
        let callback = self.inner.open.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn fire_close(&self, code: CloseCode, reason: &str) {
        self.inner.opened.set(false);
        let callback = self.inner.close.borrow().clone();
        if let Some(callback) = callback {
            callback(code, reason.to_string());
        }
    }

    pub fn fire_message(&self, message: impl Into<Message>) {
        let callback = self.inner.message.borrow().clone();
        if let Some(callback) = callback {
            callback(message.into());
        }
    }

    pub fn fire_error(&self, error: TransportError) {
        let callback = self.inner.error.borrow().clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.inner.sent.borrow().clone()
    }

    pub fn close_calls(&self) -> Vec<(Option<CloseCode>, Option<String>)> {
        self.inner.close_calls.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn on_open(&self, callback: OpenCallback) {
        *self.inner.open.borrow_mut() = Some(Rc::from(callback));
    }

    fn on_close(&self, callback: CloseCallback) {
        *self.inner.close.borrow_mut() = Some(Rc::from(callback));
    }

    fn on_message(&self, callback: MessageCallback) {
        *self.inner.message.borrow_mut() = Some(Rc::from(callback));
    }

    fn on_error(&self, callback: ErrorCallback) {
        *self.inner.error.borrow_mut() = Some(Rc::from(callback));
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.inner.opened.get() {
            return Err(TransportError::NotOpen);
        }
        self.inner.sent.borrow_mut().push(message);
        Ok(())
    }

    fn close(&self, code: Option<CloseCode>, reason: Option<&str>) -> Result<(), TransportError> {
        self.inner
            .close_calls
            .borrow_mut()
            .push((code, reason.map(str::to_string)));
        Ok(())
    }
}

/// Factory keeping a handle to every transport it built.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    transports: Rc<RefCell<Vec<ScriptedHandle>>>,
}

impl ScriptedFactory {
    pub fn count(&self) -> usize {
        self.transports.borrow().len()
    }

    pub fn transport(&self, index: usize) -> ScriptedHandle {
        self.transports.borrow()[index].clone()
    }
}

impl TransportFactory for ScriptedFactory {
    type Transport = ScriptedTransport;

    fn create(
        &self,
        _url: &str,
        _protocols: &[String],
        _options: &ConnectionOptions,
    ) -> Result<ScriptedTransport, TransportError> {
        let inner = Rc::new(ScriptedInner::default());
        self.transports.borrow_mut().push(ScriptedHandle {
            inner: inner.clone(),
        });
        Ok(ScriptedTransport { inner })
    }
}

#[derive(Default)]
struct ManualState {
    pending: Option<Proceed>,
    attempts: u32,
    max_attempts: u32,
    cancels: u32,
    resets: u32,
}

/// Retry policy without timers: `proceed` waits for [`ManualPolicy::fire`].
#[derive(Clone, Default)]
pub struct ManualPolicy {
    state: Rc<RefCell<ManualState>>,
}

impl ManualPolicy {
    /// Policy allowing `max_attempts` retries, 0 for unlimited.
    pub fn new(max_attempts: u32) -> Self {
        let policy = Self::default();
        policy.state.borrow_mut().max_attempts = max_attempts;
        policy
    }

    pub fn boxed(&self) -> Option<Box<dyn RetryPolicy>> {
        Some(Box::new(self.clone()))
    }

    /// Run the pending reconnect. Returns whether one was pending.
    pub fn fire(&self) -> bool {
        let pending = self.state.borrow_mut().pending.take();
        match pending {
            Some(proceed) => {
                proceed();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    pub fn cancels(&self) -> u32 {
        self.state.borrow().cancels
    }

    pub fn resets(&self) -> u32 {
        self.state.borrow().resets
    }
}

impl RetryPolicy for ManualPolicy {
    fn attempt(&mut self, proceed: Proceed) -> AttemptOutcome {
        let mut state = self.state.borrow_mut();
        if state.max_attempts > 0 && state.attempts >= state.max_attempts {
            return AttemptOutcome::GaveUp;
        }
        state.attempts += 1;
        state.pending = Some(proceed);
        AttemptOutcome::Scheduled
    }

    fn reset(&mut self) {
        let mut state = self.state.borrow_mut();
        state.attempts = 0;
        state.resets += 1;
    }

    fn cancel(&mut self) {
        let mut state = self.state.borrow_mut();
        state.pending = None;
        state.cancels += 1;
    }

    fn attempts(&self) -> u32 {
        self.state.borrow().attempts
    }
}

/// [`SimpleQueue`] the test can look into after handing it to a socket.
#[derive(Clone, Default)]
pub struct InspectableQueue {
    queue: Rc<RefCell<SimpleQueue>>,
}

impl InspectableQueue {
    pub fn boxed(&self) -> Option<Box<dyn MessageQueue>> {
        Some(Box::new(self.clone()))
    }
}

impl MessageQueue for InspectableQueue {
    fn push(&mut self, message: Message) {
        self.queue.borrow_mut().push(message);
    }

    fn purge(&mut self) {
        self.queue.borrow_mut().purge();
    }

    fn flush(&mut self, send: &mut dyn FnMut(Message)) {
        self.queue.borrow_mut().flush(send);
    }

    fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}
