#![forbid(unsafe_code)]

//! Async client for the joystick.tv gateway.
//!
//! [`spawn`] starts a worker task that owns the websocket for its whole
//! lifetime: it connects, performs the subscribe handshake, decodes inbound
//! payloads and reconnects on failure. Callers interact through a
//! [`GatewayHandle`] for outbound commands and an event receiver for inbound
//! traffic; events arrive in the order their frames arrived on the socket.

pub mod gateway;
pub mod rest;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use joystick_domain::{ChannelId, GatewayMessage, MessageId, ParseIdError};
use joystick_protocol::Command;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use gateway::Gateway;

pub use rest::JoystickApiClient;

/// The socket type the worker owns; named so tests can inject a connector.
pub type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Pluggable websocket connector, injectable for tests.
pub type WsConnector = Arc<dyn Fn(Url) -> BoxFuture<'static, anyhow::Result<WsStream>> + Send + Sync>;

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

/// Gateway connection configuration.
#[derive(Clone)]
pub struct GatewayConfig {
	pub client_id: String,
	pub client_secret: SecretString,
	pub ws_url: String,
	pub reconnect_delay: Duration,
	pub event_buffer: usize,
	pub ws_connector: Option<WsConnector>,
}

impl GatewayConfig {
	pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret,
			ws_url: "wss://joystick.tv/cable".to_string(),
			reconnect_delay: Duration::from_secs(3),
			event_buffer: 256,
			ws_connector: None,
		}
	}
}

impl fmt::Debug for GatewayConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GatewayConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("ws_url", &self.ws_url)
			.field("reconnect_delay", &self.reconnect_delay)
			.field("event_buffer", &self.event_buffer)
			.finish_non_exhaustive()
	}
}

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Subscribing,
	Open,
	Reconnecting,
	/// Terminal; entered only on explicit shutdown.
	Closed,
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Disconnected => "disconnected",
			Self::Connecting => "connecting",
			Self::Subscribing => "subscribing",
			Self::Open => "open",
			Self::Reconnecting => "reconnecting",
			Self::Closed => "closed",
		};
		f.write_str(s)
	}
}

/// Worker → caller event.
#[derive(Debug)]
pub enum GatewayEvent {
	/// A decoded inbound payload, in socket arrival order.
	Message(Box<GatewayMessage>),

	/// A connection state transition.
	State {
		state: ConnectionState,
		detail: String,
	},
}

/// Client operation errors.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("connection failed: {0}")]
	ConnectionFailed(String),

	#[error("subscription failed: {0}")]
	SubscriptionFailed(String),

	#[error("socket not open")]
	SocketNotOpen,

	#[error("invalid identifier: {0}")]
	InvalidIdentifier(#[from] ParseIdError),

	#[error("gateway worker gone")]
	WorkerGone,
}

/// Caller → worker control message.
#[derive(Debug)]
pub(crate) enum GatewayControl {
	Command {
		command: Command,
		resp: oneshot::Sender<Result<(), GatewayError>>,
	},
	Shutdown,
}

/// Handle for issuing outbound commands to a running gateway worker.
///
/// Every identifier-taking method validates its arguments before anything is
/// written to the socket, so a malformed id can never produce a wire frame.
#[derive(Clone)]
pub struct GatewayHandle {
	control_tx: mpsc::Sender<GatewayControl>,
}

impl GatewayHandle {
	/// Post a chat message to a channel.
	pub async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		self.dispatch(Command::SendMessage {
			text: text.to_string(),
			channel_id,
		})
		.await
	}

	/// Whisper a user in a channel.
	pub async fn send_whisper(&self, channel_id: &str, username: &str, text: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		self.dispatch(Command::SendWhisper {
			username: username.to_string(),
			text: text.to_string(),
			channel_id,
		})
		.await
	}

	/// Silence the sender of a message.
	pub async fn mute_user(&self, channel_id: &str, message_id: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		let message_id = MessageId::new(message_id)?;
		self.dispatch(Command::MuteUser { message_id, channel_id }).await
	}

	/// Lift a mute by username.
	pub async fn unmute_user(&self, channel_id: &str, username: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		self.dispatch(Command::UnmuteUser {
			username: username.to_string(),
			channel_id,
		})
		.await
	}

	/// Block the sender of a message from a channel.
	pub async fn block_user(&self, channel_id: &str, message_id: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		let message_id = MessageId::new(message_id)?;
		self.dispatch(Command::BlockUser { message_id, channel_id }).await
	}

	/// Remove a message from a channel.
	pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), GatewayError> {
		let channel_id = ChannelId::new(channel_id)?;
		let message_id = MessageId::new(message_id)?;
		self.dispatch(Command::DeleteMessage { message_id, channel_id }).await
	}

	/// Send an already-validated command.
	pub async fn send_command(&self, command: Command) -> Result<(), GatewayError> {
		self.dispatch(command).await
	}

	/// Request a graceful shutdown of the worker.
	///
	/// The worker closes the socket, emits [`ConnectionState::Closed`] and
	/// drops its event sender; completion is observed as the event stream
	/// ending.
	pub async fn shutdown(&self) {
		let _ = self.control_tx.send(GatewayControl::Shutdown).await;
	}

	async fn dispatch(&self, command: Command) -> Result<(), GatewayError> {
		let (resp, rx) = oneshot::channel();
		self.control_tx
			.send(GatewayControl::Command { command, resp })
			.await
			.map_err(|_| GatewayError::WorkerGone)?;
		rx.await.map_err(|_| GatewayError::WorkerGone)?
	}
}

/// Spawn a gateway worker; returns the command handle and the event stream.
///
/// The worker runs until [`GatewayHandle::shutdown`] is called, every handle
/// is dropped, or the event receiver goes away.
pub fn spawn(cfg: GatewayConfig) -> (GatewayHandle, mpsc::Receiver<GatewayEvent>) {
	let (control_tx, control_rx) = mpsc::channel(32);
	let (events_tx, events_rx) = mpsc::channel(cfg.event_buffer.max(1));

	tokio::spawn(Gateway::new(cfg, control_rx, events_tx).run());

	(GatewayHandle { control_tx }, events_rx)
}
