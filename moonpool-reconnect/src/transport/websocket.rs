//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each [`WebSocketTransport`] owns one local task that performs the opening
//! handshake, then multiplexes outbound commands and inbound frames:
//!
//! ```text
//! WebSocketTransport::send ──► mpsc ──► connection task ──► sink
//! callbacks ◄──────────────────────── connection task ◄── stream
//! ```
//!
//! The task only holds a weak reference to the callbacks, so dropping the
//! transport detaches it; the closed command channel then makes the task
//! close the sink and exit.
//!
//! Connection options may carry extra handshake headers:
//!
//! ```json
//! { "headers": { "Authorization": "Bearer abc" } }
//! ```

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

use super::{
    ABNORMAL_CLOSURE, CloseCallback, CloseCode, ConnectionOptions, ErrorCallback, Message,
    MessageCallback, NORMAL_CLOSURE, OpenCallback, Transport, TransportFactory,
};
use crate::error::TransportError;

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: CloseCode = 1005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Connecting,
    Open,
    Closing,
    Closed,
}

enum Command {
    Send(Message),
    Close(CloseCode, String),
}

struct Shared {
    status: Status,
    open: Option<Rc<dyn Fn()>>,
    close: Option<Rc<dyn Fn(CloseCode, String)>>,
    message: Option<Rc<dyn Fn(Message)>>,
    error: Option<Rc<dyn Fn(TransportError)>>,
}

/// Factory for [`WebSocketTransport`]s.
///
/// Must be used from within a [`tokio::task::LocalSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    type Transport = WebSocketTransport;

    fn create(
        &self,
        url: &str,
        protocols: &[String],
        options: &ConnectionOptions,
    ) -> Result<WebSocketTransport, TransportError> {
        let request = build_request(url, protocols, options)?;

        let shared = Rc::new(RefCell::new(Shared {
            status: Status::Connecting,
            open: None,
            close: None,
            message: None,
            error: None,
        }));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        // Runs on the next yield, after the caller registered its callbacks
        let task = tokio::task::spawn_local(connection_task(
            request,
            Rc::downgrade(&shared),
            commands_rx,
        ));

        Ok(WebSocketTransport {
            shared,
            commands: commands_tx,
            task,
        })
    }
}

fn build_request(
    url: &str,
    protocols: &[String],
    options: &ConnectionOptions,
) -> Result<Request<()>, TransportError> {
    let invalid = |e: &dyn std::fmt::Display| TransportError::ConnectionFailed(e.to_string());

    let mut request = url.into_client_request().map_err(|e| invalid(&e))?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", ")).map_err(|e| invalid(&e))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    if let Some(headers) = options.get("headers").and_then(|h| h.as_object()) {
        for (name, value) in headers {
            let Some(value) = value.as_str() else {
                return Err(TransportError::ConnectionFailed(format!(
                    "header {name} must be a string"
                )));
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(&e))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(&e))?;
            request.headers_mut().insert(name, value);
        }
    }

    Ok(request)
}

/// A single WebSocket connection.
pub struct WebSocketTransport {
    shared: Rc<RefCell<Shared>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Transport for WebSocketTransport {
    fn on_open(&self, callback: OpenCallback) {
        self.shared.borrow_mut().open = Some(Rc::from(callback));
    }

    fn on_close(&self, callback: CloseCallback) {
        self.shared.borrow_mut().close = Some(Rc::from(callback));
    }

    fn on_message(&self, callback: MessageCallback) {
        self.shared.borrow_mut().message = Some(Rc::from(callback));
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.shared.borrow_mut().error = Some(Rc::from(callback));
    }

    fn send(&self, message: Message) -> Result<(), TransportError> {
        match self.shared.borrow().status {
            Status::Open => {}
            Status::Connecting => return Err(TransportError::NotOpen),
            Status::Closing | Status::Closed => return Err(TransportError::AlreadyClosed),
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| TransportError::AlreadyClosed)
    }

    fn close(&self, code: Option<CloseCode>, reason: Option<&str>) -> Result<(), TransportError> {
        {
            let mut shared = self.shared.borrow_mut();
            if matches!(shared.status, Status::Closing | Status::Closed) {
                return Err(TransportError::AlreadyClosed);
            }
            shared.status = Status::Closing;
        }
        self.commands
            .send(Command::Close(
                code.unwrap_or(NORMAL_CLOSURE),
                reason.unwrap_or_default().to_string(),
            ))
            .map_err(|_| TransportError::AlreadyClosed)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // Callbacks are gone; the task notices the closed channel and exits
        self.shared.borrow_mut().status = Status::Closed;
    }
}

async fn connection_task(
    request: Request<()>,
    shared: Weak<RefCell<Shared>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let uri = request.uri().to_string();
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%uri, error = %e, "websocket handshake failed");
            emit_error(&shared, TransportError::ConnectionFailed(e.to_string()));
            emit_close(&shared, ABNORMAL_CLOSURE, e.to_string());
            return;
        }
    };

    let closing_early = match shared.upgrade() {
        Some(shared) => {
            let mut shared = shared.borrow_mut();
            let closing = shared.status == Status::Closing;
            if !closing {
                shared.status = Status::Open;
            }
            closing
        }
        None => return,
    };
    if !closing_early {
        tracing::debug!(%uri, "websocket open");
        emit_open(&shared);
    }

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Err(e) = sink.send(to_ws(message)).await {
                        emit_error(&shared, TransportError::Io(e.to_string()));
                    }
                }
                Some(Command::Close(code, reason)) => {
                    let frame = CloseFrame {
                        code: WsCloseCode::from(code),
                        reason: Cow::Owned(reason),
                    };
                    // Keep reading until the peer echoes the close frame
                    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                        emit_close(&shared, ABNORMAL_CLOSURE, e.to_string());
                        return;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => emit_message(&shared, Message::Text(text)),
                Some(Ok(WsMessage::Binary(bytes))) => emit_message(&shared, Message::Binary(bytes)),
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    emit_close(&shared, code, reason);
                    return;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit_error(&shared, TransportError::Io(e.to_string()));
                    emit_close(&shared, ABNORMAL_CLOSURE, e.to_string());
                    return;
                }
                None => {
                    emit_close(&shared, ABNORMAL_CLOSURE, "connection reset".to_string());
                    return;
                }
            },
        }
    }
}

fn to_ws(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text),
        Message::Binary(bytes) => WsMessage::Binary(bytes),
    }
}

/// Clone a callback out of the shared state, releasing the borrow before it runs.
fn callback<T>(
    shared: &Weak<RefCell<Shared>>,
    pick: impl FnOnce(&Shared) -> Option<T>,
) -> Option<T> {
    let shared = shared.upgrade()?;
    let picked = pick(&shared.borrow());
    picked
}

fn emit_open(shared: &Weak<RefCell<Shared>>) {
    if let Some(callback) = callback(shared, |s| s.open.clone()) {
        callback();
    }
}

fn emit_message(shared: &Weak<RefCell<Shared>>, message: Message) {
    if let Some(callback) = callback(shared, |s| s.message.clone()) {
        callback(message);
    }
}

fn emit_error(shared: &Weak<RefCell<Shared>>, error: TransportError) {
    if let Some(callback) = callback(shared, |s| s.error.clone()) {
        callback(error);
    }
}

fn emit_close(shared: &Weak<RefCell<Shared>>, code: CloseCode, reason: String) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let callback = {
        let mut state = shared.borrow_mut();
        if state.status == Status::Closed {
            return;
        }
        state.status = Status::Closed;
        state.close.clone()
    };
    if let Some(callback) = callback {
        callback(code, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_protocols_and_headers() {
        let options = serde_json::json!({ "headers": { "x-token": "abc" } });
        let request = build_request(
            "ws://localhost:9000/feed",
            &["chat".to_string(), "json".to_string()],
            &options,
        )
        .unwrap();

        assert_eq!(request.headers()[SEC_WEBSOCKET_PROTOCOL], "chat, json");
        assert_eq!(request.headers()["x-token"], "abc");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let err = build_request("not a url", &[], &ConnectionOptions::Null).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }

    #[test]
    fn test_non_string_header_is_rejected() {
        let options = serde_json::json!({ "headers": { "x-retries": 3 } });
        let err = build_request("ws://localhost:9000", &[], &options).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
