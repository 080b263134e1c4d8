//! One WebSocket connection to the chat backend.
//!
//! A [`Connector`] opens the socket; [`Connection::spawn`] splits it across
//! three tasks (read, write, ping) the same way for the real
//! `tokio-tungstenite` transport and for in-memory test transports.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cloudbot_protocol::constants::{WS_CLOSE_TIMEOUT, WS_MAX_MESSAGE_SIZE};
use cloudbot_protocol::{InboundMessage, Rejection};

use crate::error::GatewayError;
use crate::types::GatewaySettings;

/// Outbound half of a socket.
pub type WsSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of a socket.
pub type WsStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// An opened socket, already split.
pub struct WsTransport {
    pub sink: WsSink,
    pub stream: WsStream,
}

/// Boxed future returned by [`Connector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WsTransport, GatewayError>> + Send + 'a>>;

/// Opens WebSocket connections.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
            ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (sink, stream) = ws_stream.split();
            Ok(WsTransport {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

pub(crate) type MessageCallback = Box<dyn Fn(InboundMessage) + Send + Sync>;
pub(crate) type RejectCallback = Box<dyn Fn(Rejection) + Send + Sync>;
pub(crate) type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// Hooks invoked by the read pump.
pub(crate) struct Callbacks {
    pub(crate) on_message: MessageCallback,
    pub(crate) on_rejected: RejectCallback,
    /// Fires once when the socket dies on its own (not on [`Connection::close`]).
    pub(crate) on_disconnect: DisconnectCallback,
}

/// Cheap, cloneable sender bound to one socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    write_tx: mpsc::Sender<tungstenite::Message>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// `true` while the socket is open and its writer is alive.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.write_tx.is_closed()
    }

    /// Queues a text frame on this socket.
    pub async fn send_text(&self, text: String) -> Result<(), GatewayError> {
        if !self.is_open() {
            return Err(GatewayError::NotConnected);
        }
        self.write_raw(text).await
    }

    /// Queues a text frame regardless of the open flag. Used for the
    /// pre-open queue flush.
    pub(crate) async fn write_raw(&self, text: String) -> Result<(), GatewayError> {
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| GatewayError::NotConnected)
    }

    pub(crate) fn mark_open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// A handle with no socket behind it; frames land on the receiver.
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<tungstenite::Message>) {
        let (write_tx, write_rx) = mpsc::channel(capacity);
        (
            Self {
                write_tx,
                open: Arc::new(AtomicBool::new(false)),
            },
            write_rx,
        )
    }
}

/// A live socket and the tasks that drive it.
pub(crate) struct Connection {
    handle: ConnectionHandle,
    cancel: CancellationToken,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
    ping_handle: JoinHandle<()>,
}

impl Connection {
    /// Starts the read, write and ping pumps for `transport`.
    ///
    /// The returned connection is not yet open for application sends; the
    /// owner flushes its queue through [`ConnectionHandle::write_raw`] and
    /// then calls [`ConnectionHandle::mark_open`].
    ///
    /// `make_callbacks` receives the handle of the new socket so replies to
    /// its messages go back out on the same socket.
    pub(crate) fn spawn(
        transport: WsTransport,
        settings: &GatewaySettings,
        make_callbacks: impl FnOnce(ConnectionHandle) -> Callbacks,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let cancel = CancellationToken::new();
        // Set by the writer on a failed write; also fires on `cancel`.
        let broken = cancel.child_token();
        let handle = ConnectionHandle {
            write_tx: write_tx.clone(),
            open: Arc::new(AtomicBool::new(false)),
        };
        let callbacks = make_callbacks(handle.clone());

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                transport.sink,
                write_rx,
                cancel,
                broken.clone(),
            ))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                transport.stream,
                callbacks,
                write_tx,
                settings.pong_wait,
                cancel,
                broken.clone(),
            ))
        };

        let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
            write_tx,
            settings.ping_period,
            broken,
        ));

        Self {
            handle,
            cancel,
            read_handle,
            write_handle,
            ping_handle,
        }
    }

    pub(crate) fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Closes the socket and waits, bounded by [`WS_CLOSE_TIMEOUT`], for the
    /// Close frame to be written.
    pub(crate) async fn close(mut self) {
        self.handle.mark_closed();
        self.cancel.cancel();
        if tokio::time::timeout(WS_CLOSE_TIMEOUT, &mut self.write_handle)
            .await
            .is_err()
        {
            debug!("close frame not flushed in time, aborting writer");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.mark_closed();
        self.cancel.cancel();
        self.read_handle.abort();
        self.write_handle.abort();
        self.ping_handle.abort();
    }
}
