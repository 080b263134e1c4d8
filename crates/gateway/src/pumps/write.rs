//! WebSocket write pump: the only task that touches the socket's sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Writes frames from `frames` until `cancel` fires or every sender is gone,
/// then sends a normal Close frame.
///
/// A failed write cancels `broken` instead, so the read pump tears the
/// socket down without waiting for its read deadline. No Close frame is
/// attempted on a sink that already failed.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
    broken: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut written: u64 = 0;
    let failed = loop {
        let frame = tokio::select! {
            biased;

            _ = cancel.cancelled() => break false,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else {
            break false;
        };

        trace!(len = frame.len(), "writing frame");
        if let Err(e) = sink.send(frame).await {
            error!(error = %e, written, "WebSocket write failed");
            break true;
        }
        written += 1;
    };

    if failed {
        broken.cancel();
        return;
    }

    let close = tungstenite::Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bridge closing".into(),
    }));
    if let Err(e) = sink.send(close).await {
        debug!(error = %e, "close frame not sent");
    }
    debug!(written, "writer stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use futures_util::sink;

    fn recording_sink(
        tx: mpsc::UnboundedSender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<tungstenite::Message>) -> Vec<tungstenite::Message> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            frames.push(msg);
        }
        frames
    }

    #[tokio::test]
    async fn drains_in_order_then_closes_normally() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::channel(16);
        for text in ["a", "b"] {
            frames_tx
                .send(tungstenite::Message::Text(text.into()))
                .await
                .unwrap();
        }
        drop(frames_tx);

        let broken = CancellationToken::new();
        write_pump(
            recording_sink(sink_tx),
            frames_rx,
            CancellationToken::new(),
            broken.clone(),
        )
        .await;

        let frames = collect(&mut sink_rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], tungstenite::Message::Text("a".into()));
        assert_eq!(frames[1], tungstenite::Message::Text("b".into()));
        match &frames[2] {
            tungstenite::Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(!broken.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_still_sends_close() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (_frames_tx, frames_rx) = mpsc::channel(16);

        let handle = tokio::spawn(write_pump(
            recording_sink(sink_tx),
            frames_rx,
            cancel.clone(),
            CancellationToken::new(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("writer should stop")
            .unwrap();

        let frames = collect(&mut sink_rx);
        assert!(matches!(frames.as_slice(), [tungstenite::Message::Close(_)]));
    }

    #[tokio::test]
    async fn failed_write_marks_socket_broken() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let failing = Box::pin(sink::unfold((), move |(), _msg: tungstenite::Message| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(tungstenite::Error::ConnectionClosed) }
        }));
        let (frames_tx, frames_rx) = mpsc::channel(16);
        frames_tx
            .send(tungstenite::Message::Text("lost".into()))
            .await
            .unwrap();

        let broken = CancellationToken::new();
        write_pump(failing, frames_rx, CancellationToken::new(), broken.clone()).await;

        assert!(broken.is_cancelled());
        // Only the failed frame; no close attempt afterwards.
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
