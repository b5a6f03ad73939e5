#![forbid(unsafe_code)]

//! The gateway worker: connect, subscribe, read, reconnect.
//!
//! One task owns the socket. Inbound frames are decoded inline and forwarded
//! over a bounded channel with a blocking send, which preserves socket
//! arrival order end to end. Any socket fault tears the connection down and
//! re-enters the connect path after the configured delay; commands issued
//! while the socket is down are answered with
//! [`GatewayError::SocketNotOpen`] instead of being queued.

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use joystick_protocol::{SUBSCRIBE_COMMAND, SUBSCRIBE_CONFIRMATION, decode_message};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::{ConnectionState, GatewayConfig, GatewayControl, GatewayError, GatewayEvent, WsConnector, WsStream};

/// ActionCable subprotocol the service requires during the ws upgrade.
const CABLE_SUBPROTOCOL: &str = "actioncable-v1-json";

pub(crate) struct Gateway {
	cfg: GatewayConfig,
	control_rx: mpsc::Receiver<GatewayControl>,
	events_tx: mpsc::Sender<GatewayEvent>,
}

impl Gateway {
	pub(crate) fn new(
		cfg: GatewayConfig,
		control_rx: mpsc::Receiver<GatewayControl>,
		events_tx: mpsc::Sender<GatewayEvent>,
	) -> Self {
		Self {
			cfg,
			control_rx,
			events_tx,
		}
	}

	pub(crate) async fn run(mut self) {
		'outer: loop {
			self.state(ConnectionState::Connecting, format!("connecting to {}", self.cfg.ws_url))
				.await;

			let mut ws = match self.connect().await {
				Ok(ws) => ws,
				Err(err) => {
					warn!(error = %err, "gateway connect failed");
					self.state(ConnectionState::Reconnecting, err.to_string()).await;
					if !self.sleep_before_retry().await {
						break 'outer;
					}
					continue 'outer;
				}
			};

			self.state(ConnectionState::Subscribing, "negotiating channel subscription")
				.await;

			if let Err(err) = subscribe(&mut ws).await {
				let err = GatewayError::SubscriptionFailed(format!("{err:#}"));
				warn!(error = %err, "gateway subscribe failed");
				let _ = ws.close(None).await;
				self.state(ConnectionState::Reconnecting, err.to_string()).await;
				if !self.sleep_before_retry().await {
					break 'outer;
				}
				continue 'outer;
			}

			info!(url = %self.cfg.ws_url, "gateway online");
			self.state(ConnectionState::Open, "subscription confirmed").await;

			loop {
				tokio::select! {
					cmd = self.control_rx.recv() => match cmd {
						Some(GatewayControl::Command { command, resp }) => {
							debug!(action = command.action(), "sending gateway command");
							let result = ws
								.send(Message::text(command.encode()))
								.await
								.map_err(|e| GatewayError::ConnectionFailed(e.to_string()));
							let failed = result.is_err();
							let _ = resp.send(result);
							if failed {
								self.state(ConnectionState::Reconnecting, "command write failed").await;
								if !self.sleep_before_retry().await {
									break 'outer;
								}
								continue 'outer;
							}
						}
						Some(GatewayControl::Shutdown) | None => {
							let _ = ws.close(None).await;
							self.state(ConnectionState::Closed, "shutdown requested").await;
							break 'outer;
						}
					},
					frame = ws.next() => match frame {
						Some(Ok(Message::Text(t))) => {
							// The service NUL-pads some frames.
							let raw = t.as_str().trim_end_matches('\0');
							let msg = decode_message(raw, Utc::now());
							if self.events_tx.send(GatewayEvent::Message(Box::new(msg))).await.is_err() {
								debug!("event receiver dropped; stopping gateway");
								let _ = ws.close(None).await;
								break 'outer;
							}
						}
						Some(Ok(Message::Ping(p))) => {
							let _ = ws.send(Message::Pong(p)).await;
						}
						Some(Ok(Message::Close(frame))) => {
							debug!(?frame, "gateway closed by peer");
							self.state(ConnectionState::Reconnecting, "closed by peer").await;
							if !self.sleep_before_retry().await {
								break 'outer;
							}
							continue 'outer;
						}
						Some(Ok(_)) => {}
						Some(Err(err)) => {
							warn!(error = %err, "gateway read error");
							self.state(ConnectionState::Reconnecting, format!("read error: {err}")).await;
							if !self.sleep_before_retry().await {
								break 'outer;
							}
							continue 'outer;
						}
						None => {
							self.state(ConnectionState::Reconnecting, "stream ended").await;
							if !self.sleep_before_retry().await {
								break 'outer;
							}
							continue 'outer;
						}
					}
				}
			}
		}
	}

	async fn connect(&self) -> Result<WsStream, GatewayError> {
		let url = self
			.gateway_url()
			.map_err(|e| GatewayError::ConnectionFailed(format!("{e:#}")))?;
		(self.ws_connector())(url)
			.await
			.map_err(|e| GatewayError::ConnectionFailed(format!("{e:#}")))
	}

	/// Build the connect url with the basic-auth style token query parameter.
	fn gateway_url(&self) -> anyhow::Result<Url> {
		let token = BASE64_STANDARD.encode(format!("{}:{}", self.cfg.client_id, self.cfg.client_secret.expose()));
		Url::parse(&format!("{}?token={token}", self.cfg.ws_url)).context("parse gateway url")
	}

	fn ws_connector(&self) -> WsConnector {
		if let Some(c) = &self.cfg.ws_connector {
			return c.clone();
		}

		std::sync::Arc::new(|url: Url| {
			Box::pin(async move { connect_gateway_ws(url).await }) as BoxFuture<'static, anyhow::Result<WsStream>>
		})
	}

	async fn state(&self, state: ConnectionState, detail: impl Into<String>) {
		let _ = self
			.events_tx
			.send(GatewayEvent::State {
				state,
				detail: detail.into(),
			})
			.await;
	}

	/// Wait out the reconnect delay while still answering control traffic.
	/// Returns false when the worker should stop instead of retrying.
	async fn sleep_before_retry(&mut self) -> bool {
		let deadline = tokio::time::Instant::now() + self.cfg.reconnect_delay;
		loop {
			tokio::select! {
				_ = tokio::time::sleep_until(deadline) => return true,
				cmd = self.control_rx.recv() => match cmd {
					Some(GatewayControl::Command { resp, .. }) => {
						let _ = resp.send(Err(GatewayError::SocketNotOpen));
					}
					Some(GatewayControl::Shutdown) | None => {
						self.state(ConnectionState::Closed, "shutdown requested").await;
						return false;
					}
				}
			}
		}
	}
}

async fn connect_gateway_ws(url: Url) -> anyhow::Result<WsStream> {
	let mut request = url.as_str().into_client_request().context("build ws request")?;
	request
		.headers_mut()
		.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(CABLE_SUBPROTOCOL));
	let (ws, _resp) = tokio_tungstenite::connect_async(request)
		.await
		.context("connect_async to gateway")?;
	Ok(ws)
}

/// Perform the subscribe handshake: discard the welcome frame, send the
/// subscribe command, require the exact confirmation in reply.
async fn subscribe(ws: &mut WsStream) -> anyhow::Result<()> {
	let _welcome = next_text(ws).await.context("await welcome")?;

	ws.send(Message::text(SUBSCRIBE_COMMAND)).await.context("send subscribe")?;

	let reply = next_text(ws).await.context("await confirmation")?;
	let reply = reply.trim_end_matches('\0');
	if reply != SUBSCRIBE_CONFIRMATION {
		anyhow::bail!("unexpected subscribe reply: {reply}");
	}
	Ok(())
}

async fn next_text(ws: &mut WsStream) -> anyhow::Result<String> {
	loop {
		let Some(frame) = ws.next().await else {
			anyhow::bail!("socket closed");
		};
		match frame.context("ws read")? {
			Message::Text(t) => return Ok(t.as_str().to_string()),
			Message::Ping(p) => {
				let _ = ws.send(Message::Pong(p)).await;
			}
			Message::Close(c) => anyhow::bail!("socket closed: {c:?}"),
			_ => {}
		}
	}
}
