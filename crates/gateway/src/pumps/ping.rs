//! Keepalive pings.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Queues a Ping every `period`, the first one a full period after start.
///
/// Stops on `stop` or once the writer is gone. Late ticks are not bunched
/// up; the read pump owns the dead-socket deadline.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticks.tick() => {
                if write_tx.send(tungstenite::Message::Ping(Default::default())).await.is_err() {
                    debug!(sent, "writer gone, keepalive stopped");
                    break;
                }
                sent += 1;
                trace!(sent, "ping queued");
            }
        }
    }
}
