//! Building sockets from user-facing options.

mod common;

use std::time::Duration;

use common::{Recorder, run_local};
use moonpool_reconnect::{
    ABNORMAL_CLOSURE, ConfigError, ConnectionState, MemoryTransportFactory, Message, OpenError,
    RetrySocket, SocketError, SocketOptions, TokioProviders, TransportError,
};
use tokio::time::sleep;

fn options(json: &str) -> SocketOptions {
    SocketOptions::from_json(json).unwrap()
}

#[test]
fn test_with_options_passes_protocols_and_connection() {
    let factory = MemoryTransportFactory::new();
    let socket = RetrySocket::with_options(
        factory.clone(),
        "mem://feed",
        &options(r#"{"protocols": "chat.v2", "connection": {"timeout": 5}}"#),
        TokioProviders::new(),
    )
    .unwrap();

    assert_eq!(socket.state(), ConnectionState::Idle);
    socket.connect().unwrap();

    let conn = factory.latest().unwrap();
    assert_eq!(conn.protocols(), vec!["chat.v2".to_string()]);
    assert_eq!(conn.options()["timeout"], 5);
}

#[test]
fn test_unknown_types_fail_before_connecting() {
    let factory = MemoryTransportFactory::new();

    let err = RetrySocket::open(
        factory.clone(),
        "mem://feed",
        &options(r#"{"reconnect": "exponential"}"#),
        TokioProviders::new(),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        OpenError::Config(ConfigError::UnknownRetryPolicy(ref name)) if name == "exponential"
    ));

    let err = RetrySocket::with_options(
        factory.clone(),
        "mem://feed",
        &options(r#"{"queueMessages": {"type": "disk"}}"#),
        TokioProviders::new(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, ConfigError::UnknownMessageQueue(_)));

    assert_eq!(factory.connection_count(), 0);
}

#[test]
fn test_open_surfaces_first_connect_failure() {
    let factory = MemoryTransportFactory::new();
    factory.fail_next(TransportError::ConnectionFailed("refused".into()));

    let err = RetrySocket::open(
        factory,
        "mem://feed",
        &SocketOptions::default(),
        TokioProviders::new(),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        OpenError::Socket(SocketError::Transport(TransportError::ConnectionFailed(_)))
    ));
}

#[test]
fn test_defaults_neither_retry_nor_buffer() {
    let factory = MemoryTransportFactory::new();
    let socket = RetrySocket::open(
        factory.clone(),
        "mem://feed",
        &SocketOptions::default(),
        TokioProviders::new(),
    )
    .unwrap();
    let recorder = Recorder::attach(&socket);

    socket.send("dropped").unwrap();
    factory.latest().unwrap().open();
    factory.latest().unwrap().disconnect(ABNORMAL_CLOSURE, "gone");

    assert!(factory.connection(0).unwrap().sent().is_empty());
    assert_eq!(recorder.closes(), vec![(ABNORMAL_CLOSURE, "gone".to_string())]);
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_true_uses_default_interval() {
    run_local(async {
        let factory = MemoryTransportFactory::new();
        let socket = RetrySocket::open(
            factory.clone(),
            "mem://feed",
            &options(r#"{"reconnect": true, "queueMessages": "simple"}"#),
            TokioProviders::new(),
        )
        .unwrap();
        factory.latest().unwrap().open();
        factory.latest().unwrap().disconnect(ABNORMAL_CLOSURE, "gone");
        socket.send("queued").unwrap();

        sleep(Duration::from_millis(400)).await;
        assert_eq!(factory.connection_count(), 1);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(factory.connection_count(), 2);

        factory.latest().unwrap().open();
        assert_eq!(
            factory.latest().unwrap().sent(),
            vec![Message::Text("queued".into())]
        );
    })
    .await;
}
