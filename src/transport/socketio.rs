//! WebSocket transport speaking Socket.IO.
//!
//! The transport connects straight to the WebSocket endpoint (no polling
//! upgrade), joins the default namespace, and then exchanges `EVENT`
//! packets. It spawns one event loop task that handles:
//!
//! - Engine.IO heartbeats
//! - Inbound events, dispatched to the [`HandlerRegistry`]
//! - Outbound emits, buffered until the namespace is joined
//! - Local `connect` / `disconnect` notifications
//!
//! # Example
//!
//! ```ignore
//! let options = SocketIoOptions::new("http://localhost:3000")?;
//! let transport = SocketIoTransport::connect(&options).await?;
//! manager.init(transport);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::HandlerId;

use super::packet::{EnginePacket, SocketPacket, event_frame};
use super::registry::HandlerRegistry;
use super::{EventHandler, Transport, events};

// ============================================================================
// Constants
// ============================================================================

/// Default engine mount path on the server.
pub const DEFAULT_PATH: &str = "/llamaproxws/";

/// Engine.IO protocol revision.
const ENGINE_IO_VERSION: &str = "4";

// ============================================================================
// SocketIoOptions
// ============================================================================

/// Where and how to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketIoOptions {
    base_url: Url,
    path: String,
}

impl SocketIoOptions {
    /// Creates options for the server at `base_url` with the default path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `base_url` does not parse.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            path: DEFAULT_PATH.to_string(),
        })
    }

    /// Overrides the engine mount path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the engine mount path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Builds the WebSocket endpoint URL.
    ///
    /// `http` maps to `ws` and `https` to `wss`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for schemes other than http(s) and ws(s).
    pub fn endpoint(&self) -> Result<Url> {
        let scheme = match self.base_url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::config(format!("unsupported URL scheme: {other}"))),
        };

        let mut url = self.base_url.clone();
        url.set_scheme(scheme)
            .map_err(|()| Error::config(format!("cannot use scheme {scheme}")))?;
        url.set_path(&self.path);
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", ENGINE_IO_VERSION)
            .append_pair("transport", "websocket");
        Ok(url)
    }
}

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Send an encoded frame.
    Send(String),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// SocketIoTransport
// ============================================================================

/// Socket.IO client over a single WebSocket.
///
/// `emit` never blocks; frames go through an unbounded channel to the
/// event loop, which holds them until the namespace is joined.
pub struct SocketIoTransport {
    registry: Arc<HandlerRegistry>,
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    open: Arc<AtomicBool>,
}

impl fmt::Debug for SocketIoTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketIoTransport")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl SocketIoTransport {
    /// Opens the WebSocket and spawns the event loop.
    ///
    /// Returns as soon as the socket is open. The namespace handshake
    /// completes in the background and is reported through the local
    /// `connect` event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the connection cannot be opened.
    pub async fn connect(options: &SocketIoOptions) -> Result<Arc<Self>> {
        let endpoint = options.endpoint()?;
        debug!(%endpoint, "Opening Socket.IO connection");

        let (ws_stream, _) = connect_async(endpoint.as_str()).await?;
        let (ws_write, ws_read) = ws_stream.split();

        Ok(Self::spawn(ws_write, ws_read))
    }

    /// Wires an already split socket to a new event loop.
    fn spawn<W, R>(ws_write: W, ws_read: R) -> Arc<Self>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
        R: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin
            + Send
            + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(HandlerRegistry::new());
        let open = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_event_loop(
            ws_write,
            ws_read,
            command_rx,
            Arc::clone(&registry),
            Arc::clone(&open),
        ));

        Arc::new(Self {
            registry,
            command_tx,
            open,
        })
    }

    /// Returns `true` once the namespace has been joined.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Closes the socket. Later emits fail with [`Error::ConnectionClosed`].
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }
}

impl Transport for SocketIoTransport {
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        self.registry.add(event, handler)
    }

    fn off(&self, event: &str, id: HandlerId) {
        self.registry.remove(event, id);
    }

    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Send(event_frame(event, payload)))
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Whether the event loop keeps running after a packet.
enum Flow {
    Continue,
    Stop,
}

async fn run_event_loop<W, R>(
    mut ws_write: W,
    mut ws_read: R,
    mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    registry: Arc<HandlerRegistry>,
    open: Arc<AtomicBool>,
) where
    W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut buffered: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(frame = %text.as_str(), "Frame received");

                        let packet = match EnginePacket::decode(text.as_str()) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed frame");
                                continue;
                            }
                        };

                        let flow = handle_packet(
                            packet,
                            &mut ws_write,
                            &registry,
                            &open,
                            &mut buffered,
                        )
                        .await;

                        if matches!(flow, Flow::Stop) {
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(TransportCommand::Send(frame)) => {
                        if !open.load(Ordering::Acquire) {
                            trace!("Buffering frame until namespace is joined");
                            buffered.push(frame);
                            continue;
                        }
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            error!(error = %e, "Failed to send frame");
                            break;
                        }
                    }

                    Some(TransportCommand::Shutdown) | None => {
                        debug!("Shutdown requested");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    command_rx.close();

    if open.swap(false, Ordering::AcqRel) {
        registry.dispatch(events::DISCONNECT, &Value::Null);
    }

    if !buffered.is_empty() {
        debug!(count = buffered.len(), "Discarded unsent frames");
    }

    debug!("Socket.IO event loop terminated");
}

async fn handle_packet<W>(
    packet: EnginePacket,
    ws_write: &mut W,
    registry: &HandlerRegistry,
    open: &AtomicBool,
    buffered: &mut Vec<String>,
) -> Flow
where
    W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let reply = match packet {
        EnginePacket::Open(handshake) => {
            debug!(sid = ?handshake.get("sid"), "Engine open, joining namespace");
            Some(EnginePacket::Message(SocketPacket::Connect(None)).encode())
        }

        EnginePacket::Ping(data) => Some(EnginePacket::Pong(data).encode()),

        EnginePacket::Close => {
            debug!("Engine close received");
            return Flow::Stop;
        }

        EnginePacket::Message(SocketPacket::Connect(_)) => {
            open.store(true, Ordering::Release);
            debug!(buffered = buffered.len(), "Namespace joined");

            for frame in buffered.drain(..) {
                if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                    error!(error = %e, "Failed to flush frame");
                    return Flow::Stop;
                }
            }

            registry.dispatch(events::CONNECT, &Value::Null);
            None
        }

        EnginePacket::Message(SocketPacket::Event { name, payload, .. }) => {
            registry.dispatch(&name, &payload);
            None
        }

        EnginePacket::Message(SocketPacket::Disconnect) => {
            debug!("Namespace disconnected by server");
            return Flow::Stop;
        }

        EnginePacket::Message(SocketPacket::ConnectError(data)) => {
            warn!(%data, "Namespace connect refused");
            return Flow::Stop;
        }

        EnginePacket::Message(SocketPacket::Ack { ack_id, .. }) => {
            trace!(ack_id, "Ignoring acknowledgment");
            None
        }

        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => None,
    };

    if let Some(frame) = reply
        && let Err(e) = ws_write.send(Message::Text(frame.into())).await
    {
        error!(error = %e, "Failed to send control frame");
        return Flow::Stop;
    }

    Flow::Continue
}

// ============================================================================
// Tests
// ============================================================================
