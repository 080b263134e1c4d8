//! WebSocket read pump: decodes inbound envelopes and detects dead sockets.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use cloudbot_protocol::{Frame, decode};

use crate::connection::{Callbacks, MessageCallback, RejectCallback};

/// Reads frames from the WebSocket and hands chat messages to the callbacks.
///
/// Any inbound frame resets a read deadline of `pong_wait`. If nothing
/// arrives within that window, or the writer reports the socket `broken`,
/// the socket is treated as dead. The disconnect callback fires on every
/// exit except cancellation.
pub(crate) async fn read_pump<S>(
    mut read: S,
    callbacks: Callbacks,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pong_wait: Duration,
    cancel: CancellationToken,
    broken: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let Callbacks {
        on_message,
        on_rejected,
        on_disconnect,
    } = callbacks;

    let pong_deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            _ = broken.cancelled() => {
                warn!("socket write failed, closing");
                break;
            }

            () = &mut pong_deadline => {
                warn!(pong_wait_secs = pong_wait.as_secs(), "no traffic within pong wait, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + pong_wait);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_payload(text.as_bytes(), &on_message, &on_rejected);
                            }
                            tungstenite::Message::Binary(data) => {
                                handle_payload(&data, &on_message, &on_rejected);
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(frame = ?frame, "received close frame");
                                break;
                            }
                            tungstenite::Message::Frame(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read error");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    on_disconnect();
}

/// Decodes one payload. Rejected payloads are logged and reported; they
/// never affect the socket.
fn handle_payload(bytes: &[u8], on_message: &MessageCallback, on_rejected: &RejectCallback) {
    trace!(size = bytes.len(), "received payload");

    let data = match decode(bytes) {
        Ok(Frame::Message(data)) => data,
        Ok(Frame::Other(msg_type)) => {
            trace!(msg_type = ?msg_type, "ignoring non-message envelope");
            return;
        }
        Err(rejection) => {
            warn!(reason = %rejection, "dropping inbound payload");
            on_rejected(rejection);
            return;
        }
    };

    match data.validate(chrono::Utc::now().timestamp_millis()) {
        Ok(message) => on_message(message),
        Err(rejection) => {
            warn!(reason = %rejection, "dropping inbound message");
            on_rejected(rejection);
        }
    }
}
