//! In-memory doubles shared by the unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use cloudbot_media::{DownloadedMedia, MediaError, MediaFuture, MediaTransfer};

use crate::connection::{ConnectFuture, ConnectionHandle, Connector, WsTransport};
use crate::error::GatewayError;
use crate::runtime::{
    AgentRoute, AgentRuntime, InboundContext, Peer, ReplyDispatcher, ReplyPayload, RuntimeError,
    RuntimeFuture,
};

pub(crate) type ClientFrames = mpsc::UnboundedSender<Result<tungstenite::Message, tungstenite::Error>>;
pub(crate) type ServerFrames = mpsc::UnboundedReceiver<tungstenite::Message>;

/// Transport backed by channels: frames the client writes arrive on the
/// returned receiver, frames pushed into the sender are read by the client.
pub(crate) fn memory_transport() -> (WsTransport, ClientFrames, ServerFrames) {
    logged_transport(None)
}

fn logged_transport(log: Option<(Arc<Mutex<Vec<String>>>, usize)>) -> (WsTransport, ClientFrames, ServerFrames) {
    let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
    let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

    let sink = sink::unfold(
        to_server_tx,
        move |tx: mpsc::UnboundedSender<tungstenite::Message>, msg: tungstenite::Message| {
            let log = log.clone();
            async move {
                if let (Some((log, n)), tungstenite::Message::Close(_)) = (&log, &msg) {
                    log.lock().unwrap().push(format!("close#{n}"));
                }
                tx.send(msg)
                    .map_err(|_| tungstenite::Error::ConnectionClosed)?;
                Ok::<_, tungstenite::Error>(tx)
            }
        },
    );
    let stream = stream::unfold(
        to_client_rx,
        |mut rx: mpsc::UnboundedReceiver<Result<tungstenite::Message, tungstenite::Error>>| async move {
            rx.recv().await.map(|item| (item, rx))
        },
    );

    (
        WsTransport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        },
        to_client_tx,
        to_server_rx,
    )
}

/// An open handle whose frames land on the returned receiver.
pub(crate) fn open_handle() -> (ConnectionHandle, mpsc::Receiver<tungstenite::Message>) {
    let (handle, rx) = ConnectionHandle::detached(64);
    handle.mark_open();
    (handle, rx)
}

/// Server side of one accepted mock connection.
pub(crate) struct Accepted {
    pub(crate) url: String,
    pub(crate) to_client: ClientFrames,
    pub(crate) from_client: ServerFrames,
}

impl Accepted {
    /// Sends a text frame to the client.
    pub(crate) fn push_text(&self, text: &str) {
        let _ = self
            .to_client
            .send(Ok(tungstenite::Message::Text(text.to_string().into())));
    }

    /// Next text frame written by the client, skipping pings and pongs.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        while let Some(msg) = self.from_client.recv().await {
            match msg {
                tungstenite::Message::Text(text) => return Some(text.as_str().to_string()),
                tungstenite::Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }
}

/// Connector that hands out in-memory sockets, or fails on demand.
///
/// Every accepted connection is forwarded to the receiver returned by
/// [`MockConnector::new`]. Connects and client-side closes are appended to
/// `log` as `connect#n` / `close#n`.
pub(crate) struct MockConnector {
    accepted: mpsc::UnboundedSender<Accepted>,
    failures: Mutex<VecDeque<bool>>,
    always_fail: bool,
    pub(crate) log: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Accepted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: tx,
                failures: Mutex::new(VecDeque::new()),
                always_fail: false,
                log: Arc::new(Mutex::new(Vec::new())),
            },
            rx,
        )
    }

    /// A connector whose every attempt fails.
    pub(crate) fn refusing() -> (Self, mpsc::UnboundedReceiver<Accepted>) {
        let (mut connector, rx) = Self::new();
        connector.always_fail = true;
        (connector, rx)
    }

    /// Makes the next `n` attempts fail.
    pub(crate) fn fail_next(&self, n: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..n {
            failures.push_back(true);
        }
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("connect#"))
            .count()
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let n = {
                let mut log = self.log.lock().unwrap();
                let n = log.iter().filter(|e| e.starts_with("connect#")).count() + 1;
                log.push(format!("connect#{n}"));
                n
            };

            let fail = self.always_fail || self.failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                return Err(GatewayError::Ws(tungstenite::Error::ConnectionClosed));
            }

            let (transport, to_client, from_client) = logged_transport(Some((self.log.clone(), n)));
            let _ = self.accepted.send(Accepted {
                url: url.to_string(),
                to_client,
                from_client,
            });
            Ok(transport)
        })
    }
}

/// Media store double that records calls.
#[derive(Default)]
pub(crate) struct RecordingMedia {
    pub(crate) uploads: Mutex<Vec<(String, PathBuf, String)>>,
    pub(crate) downloads: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl RecordingMedia {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl MediaTransfer for RecordingMedia {
    fn upload<'a>(
        &'a self,
        server_url: &'a str,
        local_path: &'a Path,
        user_id: &'a str,
    ) -> MediaFuture<'a, String> {
        Box::pin(async move {
            self.uploads.lock().unwrap().push((
                server_url.to_string(),
                local_path.to_path_buf(),
                user_id.to_string(),
            ));
            if self.fail {
                return Err(MediaError::NotFound(local_path.display().to_string()));
            }
            Ok("file-1".to_string())
        })
    }

    fn download<'a>(
        &'a self,
        server_url: &'a str,
        file_path: &'a str,
        user_id: &'a str,
    ) -> MediaFuture<'a, DownloadedMedia> {
        Box::pin(async move {
            self.downloads.lock().unwrap().push((
                server_url.to_string(),
                file_path.to_string(),
                user_id.to_string(),
            ));
            if self.fail {
                return Err(MediaError::Status {
                    status: 404,
                    body: String::new(),
                });
            }
            let name = Path::new(file_path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file")
                .to_string();
            Ok(DownloadedMedia {
                path: PathBuf::from("/inbound").join(format!("1_{name}")),
                mime_type: "image/png".into(),
                original_name: name,
            })
        })
    }
}

/// Runtime double: routes every peer to agent `main`, records contexts and
/// optionally answers with `[Auto Reply] <body>`.
#[derive(Default)]
pub(crate) struct RecordingRuntime {
    pub(crate) contexts: Mutex<Vec<InboundContext>>,
    reply: bool,
    fail: bool,
}

impl RecordingRuntime {
    pub(crate) fn replying() -> Self {
        Self {
            reply: true,
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl AgentRuntime for RecordingRuntime {
    fn resolve_agent_route(&self, channel: &str, peer: &Peer) -> AgentRoute {
        AgentRoute {
            agent_id: "main".into(),
            session_key: format!("agent:main:{channel}:dm:{}", peer.id),
        }
    }

    fn dispatch_reply<'a>(
        &'a self,
        ctx: InboundContext,
        dispatcher: ReplyDispatcher,
    ) -> RuntimeFuture<'a, Result<(), RuntimeError>> {
        Box::pin(async move {
            let body = ctx.body.clone();
            self.contexts.lock().unwrap().push(ctx);
            if self.fail {
                return Err(RuntimeError::Dispatch("agent crashed".into()));
            }
            if self.reply {
                let result = dispatcher
                    .deliver(ReplyPayload::text(format!("[Auto Reply] {body}")))
                    .await;
                if let Some(e) = result.error {
                    return Err(RuntimeError::Dispatch(e.to_string()));
                }
            }
            Ok(())
        })
    }
}
