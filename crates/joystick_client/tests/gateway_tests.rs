use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures_util::{SinkExt, StreamExt};
use joystick_client::{ConnectionState, GatewayConfig, GatewayError, GatewayEvent, SecretString, spawn};
use joystick_domain::Event;
use joystick_protocol::{ENVELOPE_PREFIX, SUBSCRIBE_COMMAND, SUBSCRIBE_CONFIRMATION};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

type ServerWs = tokio_tungstenite::WebSocketStream<TcpStream>;

/// What the upgrade request carried, captured for later assertions.
#[derive(Debug, Clone, Default)]
struct UpgradeCapture {
	query: Option<String>,
	subprotocol: Option<String>,
}

async fn bind() -> (TcpListener, String) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();

	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
	let addr = listener.local_addr().expect("listener addr");
	(listener, format!("ws://{addr}/cable"))
}

/// Accept one websocket connection, echoing the requested subprotocol the way
/// the live service does.
async fn accept(listener: &TcpListener, capture: Arc<Mutex<UpgradeCapture>>) -> ServerWs {
	let (stream, _) = listener.accept().await.expect("accept tcp");
	let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
		let mut guard = capture.lock().expect("capture lock");
		guard.query = req.uri().query().map(|q| q.to_string());
		if let Some(proto) = req.headers().get("sec-websocket-protocol") {
			guard.subprotocol = proto.to_str().ok().map(|p| p.to_string());
			resp.headers_mut().insert("sec-websocket-protocol", proto.clone());
		}
		Ok(resp)
	};
	tokio_tungstenite::accept_hdr_async(stream, callback)
		.await
		.expect("ws upgrade")
}

/// Welcome, expect the subscribe command, confirm with trailing NUL padding.
async fn serve_handshake(ws: &mut ServerWs) {
	ws.send(Message::text(r#"{"type":"welcome"}"#)).await.expect("send welcome");

	let frame = ws.next().await.expect("subscribe frame").expect("subscribe read");
	assert_eq!(frame.into_text().expect("subscribe text").as_str(), SUBSCRIBE_COMMAND);

	ws.send(Message::text(format!("{SUBSCRIBE_CONFIRMATION}\0\0")))
		.await
		.expect("send confirmation");
}

fn test_config(ws_url: String) -> GatewayConfig {
	let mut cfg = GatewayConfig::new("test-id", SecretString::new("test-secret"));
	cfg.ws_url = ws_url;
	cfg.reconnect_delay = Duration::from_millis(50);
	cfg
}

async fn next_event(events: &mut mpsc::Receiver<GatewayEvent>) -> GatewayEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("timed out waiting for gateway event")
		.expect("event channel closed")
}

async fn wait_for_state(events: &mut mpsc::Receiver<GatewayEvent>, wanted: ConnectionState) {
	loop {
		if let GatewayEvent::State { state, .. } = next_event(events).await
			&& state == wanted
		{
			return;
		}
	}
}

fn chat_payload(author: &str, text: &str) -> String {
	format!(
		concat!(
			"{}{{\"event\":\"ChatMessage\",\"text\":\"{}\",\"channelId\":\"chan-1\",",
			"\"author\":{{\"username\":\"{}\"}},\"streamer\":{{\"username\":\"bob\"}}}}}}"
		),
		ENVELOPE_PREFIX, text, author
	)
}

#[tokio::test]
async fn handshake_reaches_open_and_delivers_in_arrival_order() {
	let (listener, url) = bind().await;
	let capture = Arc::new(Mutex::new(UpgradeCapture::default()));

	let server_capture = Arc::clone(&capture);
	let server = tokio::spawn(async move {
		let mut ws = accept(&listener, server_capture).await;
		serve_handshake(&mut ws).await;

		ws.send(Message::text(r#"{"type":"ping","message":1700000000}"#))
			.await
			.expect("send ping");
		ws.send(Message::text(chat_payload("alice", "first")))
			.await
			.expect("send chat 1");
		ws.send(Message::text(chat_payload("alice", "second")))
			.await
			.expect("send chat 2");

		// Hold the socket open until the client is done reading.
		let _ = ws.next().await;
	});

	let (handle, mut events) = spawn(test_config(url));
	wait_for_state(&mut events, ConnectionState::Open).await;

	let GatewayEvent::Message(msg) = next_event(&mut events).await else {
		panic!("expected ping message first");
	};
	assert_eq!(msg.event, Event::Ping);

	for expected in ["first", "second"] {
		let GatewayEvent::Message(msg) = next_event(&mut events).await else {
			panic!("expected chat message");
		};
		let Event::Chat(chat) = msg.event else {
			panic!("expected chat event, got {:?}", msg.event);
		};
		assert_eq!(chat.text, expected);
	}

	let seen = capture.lock().expect("capture lock").clone();
	let expected_token = BASE64_STANDARD.encode("test-id:test-secret");
	assert_eq!(seen.query.as_deref(), Some(format!("token={expected_token}").as_str()));
	assert_eq!(seen.subprotocol.as_deref(), Some("actioncable-v1-json"));

	handle.shutdown().await;
	server.await.expect("server task");
}

#[tokio::test]
async fn reconnects_after_peer_close() {
	let (listener, url) = bind().await;
	let capture = Arc::new(Mutex::new(UpgradeCapture::default()));

	let server_capture = Arc::clone(&capture);
	let server = tokio::spawn(async move {
		// First session: handshake, then drop the connection.
		let mut ws = accept(&listener, Arc::clone(&server_capture)).await;
		serve_handshake(&mut ws).await;
		ws.close(None).await.expect("close first session");

		// Second session: handshake and deliver one message.
		let mut ws = accept(&listener, server_capture).await;
		serve_handshake(&mut ws).await;
		ws.send(Message::text(chat_payload("alice", "after reconnect")))
			.await
			.expect("send chat");
		let _ = ws.next().await;
	});

	let (handle, mut events) = spawn(test_config(url));

	wait_for_state(&mut events, ConnectionState::Open).await;
	wait_for_state(&mut events, ConnectionState::Reconnecting).await;
	wait_for_state(&mut events, ConnectionState::Open).await;

	let GatewayEvent::Message(msg) = next_event(&mut events).await else {
		panic!("expected chat after reconnect");
	};
	let Event::Chat(chat) = msg.event else {
		panic!("expected chat event, got {:?}", msg.event);
	};
	assert_eq!(chat.text, "after reconnect");

	handle.shutdown().await;
	server.await.expect("server task");
}

#[tokio::test]
async fn invalid_identifiers_are_rejected_before_the_socket() {
	let (listener, url) = bind().await;
	let capture = Arc::new(Mutex::new(UpgradeCapture::default()));

	let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
	let server = tokio::spawn(async move {
		let mut ws = accept(&listener, capture).await;
		serve_handshake(&mut ws).await;
		while let Some(Ok(frame)) = ws.next().await {
			if let Message::Text(t) = frame {
				let _ = frames_tx.send(t.as_str().to_string());
			}
		}
	});

	let (handle, mut events) = spawn(test_config(url));
	wait_for_state(&mut events, ConnectionState::Open).await;

	// One hex digit short of a channel id.
	let short_channel = "0123456789abcdef".repeat(4);
	let short_channel = &short_channel[..63];
	let err = handle.send_message(short_channel, "hi").await.expect_err("short id");
	assert!(matches!(err, GatewayError::InvalidIdentifier(_)), "got {err:?}");

	// Malformed message id for a moderation command.
	let channel = "0123456789abcdef".repeat(4);
	let err = handle.mute_user(&channel, "not-a-message-id").await.expect_err("bad message id");
	assert!(matches!(err, GatewayError::InvalidIdentifier(_)), "got {err:?}");

	// A valid command still goes through afterwards.
	handle.send_message(&channel, "hello").await.expect("valid send");

	handle.shutdown().await;
	server.await.expect("server task");

	// The socket saw exactly one command frame, the valid one.
	let frame = frames_rx.recv().await.expect("one command frame");
	assert!(frame.contains(r#"\"action\":\"send_message\""#), "frame: {frame}");
	assert!(frames_rx.recv().await.is_none(), "no further frames expected");
}

#[tokio::test]
async fn commands_while_disconnected_fail_with_socket_not_open() {
	// Bind then drop, so the port is likely refusing connections.
	let (listener, url) = bind().await;
	drop(listener);

	let (handle, mut events) = spawn(test_config(url));
	wait_for_state(&mut events, ConnectionState::Reconnecting).await;

	let channel = "0123456789abcdef".repeat(4);
	let err = handle.send_message(&channel, "hi").await.expect_err("no socket");
	assert!(matches!(err, GatewayError::SocketNotOpen), "got {err:?}");

	handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_the_socket_and_ends_the_event_stream() {
	let (listener, url) = bind().await;
	let capture = Arc::new(Mutex::new(UpgradeCapture::default()));

	let server = tokio::spawn(async move {
		let mut ws = accept(&listener, capture).await;
		serve_handshake(&mut ws).await;
		while ws.next().await.is_some() {}
	});

	let (handle, mut events) = spawn(test_config(url));
	wait_for_state(&mut events, ConnectionState::Open).await;

	handle.shutdown().await;
	wait_for_state(&mut events, ConnectionState::Closed).await;

	assert!(
		tokio::time::timeout(Duration::from_secs(5), events.recv())
			.await
			.expect("worker should drop the event sender")
			.is_none()
	);

	server.await.expect("server task");
}
