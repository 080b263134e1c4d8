//! Reconnection with exponential backoff.
//!
//! Every unplanned close runs [`schedule`]. It arms at most one timer per
//! account; when the timer fires the account-start procedure runs again with
//! the last known configuration. Timer-driven restarts keep the attempt
//! counter, so the ceiling holds across a flapping backend. Only an explicit
//! start or a successful open resets it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::supervisor::{AccountSlot, GatewayInner, connect_account};
use crate::types::{AccountState, ConnectionState, GatewayEvent};

/// Backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Retries allowed before the account is left offline.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// `min(base * 2^attempts, cap)` for a 0-based attempt count.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Per-account retry bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct ReconnectState {
    attempts: u32,
    timer: Option<CancellationToken>,
}

impl ReconnectState {
    /// Delay for the next retry, counting it, or `None` at the ceiling.
    pub(crate) fn next_delay(&mut self, config: &ReconnectConfig) -> Option<Duration> {
        if self.attempts >= config.max_attempts {
            return None;
        }
        let delay = config.delay_for_attempt(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Cancels any pending timer and returns the token for a new one.
    pub(crate) fn arm_timer(&mut self) -> CancellationToken {
        self.cancel_timer();
        let token = CancellationToken::new();
        self.timer = Some(token.clone());
        token
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }

    pub(crate) fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Forgets a timer that has fired.
    pub(crate) fn clear_timer(&mut self) {
        self.timer = None;
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Arms a reconnect timer for `account_id`, or gives up at the ceiling.
///
/// The caller holds the account lock and has already cleared the dead
/// connection.
pub(crate) fn schedule(
    inner: &Arc<GatewayInner>,
    slot: &mut AccountSlot,
    account_id: &str,
    generation: u64,
) {
    let Some(delay) = slot.reconnect.next_delay(&inner.settings.reconnect) else {
        error!(
            account = %account_id,
            attempts = slot.reconnect.attempts(),
            "reconnect limit reached, account offline until restarted"
        );
        slot.reconnect.cancel_timer();
        inner.set_state(
            account_id,
            slot,
            Some(AccountState::Idle),
            Some(ConnectionState::Disconnected),
        );
        inner.emit(GatewayEvent::ReconnectExhausted {
            account_id: account_id.to_string(),
        });
        return;
    };

    let attempt = slot.reconnect.attempts();
    let cancel = slot.reconnect.arm_timer();

    inner.set_state(
        account_id,
        slot,
        None,
        Some(ConnectionState::Reconnecting { attempt }),
    );
    inner.emit(GatewayEvent::Reconnecting {
        account_id: account_id.to_string(),
        attempt,
        delay,
    });
    info!(
        account = %account_id,
        attempt,
        max_attempts = inner.settings.reconnect.max_attempts,
        delay_ms = delay.as_millis() as u64,
        "reconnect scheduled"
    );

    tokio::spawn(reconnect_after(
        inner.clone(),
        account_id.to_string(),
        generation,
        delay,
        cancel,
    ));
}

/// Waits out the backoff, then reruns the start procedure.
///
/// Returns a boxed future to break the recursive type cycle with
/// `connect_account` (which schedules this through [`schedule`]).
fn reconnect_after(
    inner: Arc<GatewayInner>,
    account_id: String,
    generation: u64,
    delay: Duration,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(account = %account_id, "reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(slot) = inner.slot(&account_id).await else {
            return;
        };
        {
            let mut s = slot.lock().await;
            if cancel.is_cancelled() || s.generation != generation {
                return;
            }
            s.reconnect.clear_timer();
        }

        connect_account(&inner, &account_id, generation).await;
    })
}
