//! Gateway supervisor: the per-account registry and lifecycle.
//!
//! [`Gateway`] is the only owner of live connections, pending queues and
//! reconnection counters. Each account sits behind its own lock so one
//! account's backoff or slow close never stalls another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, error, info, warn};

use cloudbot_media::MediaTransfer;
use cloudbot_protocol::{OutboundData, encode, redact_api_key};

use crate::connection::{Callbacks, Connection, ConnectionHandle, Connector};
use crate::dispatcher::{DeliveryResult, OutboundDispatcher};
use crate::error::GatewayError;
use crate::queue::OutboundQueue;
use crate::reconnection::{self, ReconnectState};
use crate::router::Router;
use crate::runtime::{AgentRuntime, ReplyPayload};
use crate::types::{
    AccountConfig, AccountState, ConnectionState, GatewayEvent, GatewaySettings, SendStatus,
};

/// Registry entry for one account.
pub(crate) struct AccountSlot {
    /// Last configuration passed to `start_account`.
    pub(crate) config: Option<AccountConfig>,
    pub(crate) state: AccountState,
    pub(crate) connection_state: ConnectionState,
    pub(crate) connection: Option<Connection>,
    /// Bumped by every start and stop; callbacks and timers carrying an
    /// older value are ignored.
    pub(crate) generation: u64,
    pub(crate) queue: OutboundQueue,
    pub(crate) reconnect: ReconnectState,
}

impl AccountSlot {
    fn new(queue_capacity: usize) -> Self {
        Self {
            config: None,
            state: AccountState::Idle,
            connection_state: ConnectionState::Disconnected,
            connection: None,
            generation: 0,
            queue: OutboundQueue::new(queue_capacity),
            reconnect: ReconnectState::default(),
        }
    }

    /// Handle of the current socket, only while it is open.
    fn open_handle(&self) -> Option<ConnectionHandle> {
        if self.connection_state != ConnectionState::Open {
            return None;
        }
        self.connection.as_ref().map(Connection::handle)
    }
}

/// Shared state behind [`Gateway`].
pub(crate) struct GatewayInner {
    accounts: RwLock<HashMap<String, Arc<Mutex<AccountSlot>>>>,
    connector: Arc<dyn Connector>,
    runtime: Arc<dyn AgentRuntime>,
    media: Arc<dyn MediaTransfer>,
    pub(crate) settings: GatewaySettings,
    events_tx: mpsc::Sender<GatewayEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<GatewayEvent>>>,
}

impl GatewayInner {
    pub(crate) async fn slot(&self, account_id: &str) -> Option<Arc<Mutex<AccountSlot>>> {
        self.accounts.read().await.get(account_id).cloned()
    }

    async fn slot_or_insert(&self, account_id: &str) -> Arc<Mutex<AccountSlot>> {
        if let Some(slot) = self.slot(account_id).await {
            return slot;
        }
        self.accounts
            .write()
            .await
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AccountSlot::new(self.settings.queue_capacity))))
            .clone()
    }

    /// Emits an event without waiting; events are dropped if nobody reads.
    pub(crate) fn emit(&self, event: GatewayEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!("gateway event not delivered: {e}");
        }
    }

    /// Updates the slot's states and emits `StateChanged` if either moved.
    pub(crate) fn set_state(
        &self,
        account_id: &str,
        slot: &mut AccountSlot,
        account: Option<AccountState>,
        connection: Option<ConnectionState>,
    ) {
        let account = account.unwrap_or(slot.state);
        let connection = connection.unwrap_or(slot.connection_state);
        if account == slot.state && connection == slot.connection_state {
            return;
        }
        slot.state = account;
        slot.connection_state = connection;
        self.emit(GatewayEvent::StateChanged {
            account_id: account_id.to_string(),
            account,
            connection,
        });
    }
}

/// Bridges chat-backend accounts to an agent runtime.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Creates a gateway with no accounts.
    pub fn new(
        connector: Arc<dyn Connector>,
        runtime: Arc<dyn AgentRuntime>,
        media: Arc<dyn MediaTransfer>,
        settings: GatewaySettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            inner: Arc::new(GatewayInner {
                accounts: RwLock::new(HashMap::new()),
                connector,
                runtime,
                media,
                settings,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<GatewayEvent>> {
        self.inner.events_rx.lock().await.take()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.inner.settings
    }

    /// Starts (or restarts) an account.
    ///
    /// Any previous socket for the account is closed before the new one is
    /// opened, and any pending reconnect is cancelled. Only configuration
    /// errors are returned; transport failures are retried in the
    /// background.
    pub async fn start_account(
        &self,
        account_id: &str,
        config: AccountConfig,
    ) -> Result<(), GatewayError> {
        if let Err(e) = config.validate() {
            error!(account = %account_id, error = %e, "invalid account configuration, not connecting");
            return Err(e.into());
        }

        let slot = self.inner.slot_or_insert(account_id).await;
        let generation = {
            let mut s = slot.lock().await;
            s.generation += 1;
            s.reconnect.cancel_timer();
            s.reconnect.reset();
            s.config = Some(config);

            let previous = s.connection.take();
            let connection = if previous.is_some() {
                ConnectionState::Closing
            } else {
                s.connection_state
            };
            self.inner.set_state(
                account_id,
                &mut s,
                Some(AccountState::Starting),
                Some(connection),
            );
            if let Some(previous) = previous {
                info!(account = %account_id, "closing previous connection");
                previous.close().await;
                self.inner
                    .set_state(account_id, &mut s, None, Some(ConnectionState::Disconnected));
            }
            s.generation
        };

        connect_account(&self.inner, account_id, generation).await;

        let mut s = slot.lock().await;
        if s.generation == generation && s.state == AccountState::Starting {
            self.inner
                .set_state(account_id, &mut s, Some(AccountState::Running), None);
        }
        Ok(())
    }

    /// Stops an account: cancels any pending reconnect and closes the socket.
    ///
    /// Queued messages are kept and flush on the next start.
    pub async fn stop_account(&self, account_id: &str) -> Result<(), GatewayError> {
        let slot = self
            .inner
            .slot(account_id)
            .await
            .ok_or_else(|| GatewayError::UnknownAccount(account_id.to_string()))?;

        let mut s = slot.lock().await;
        s.generation += 1;
        if s.reconnect.has_timer() {
            debug!(account = %account_id, "cancelling pending reconnect");
        }
        s.reconnect.cancel_timer();

        self.inner.set_state(
            account_id,
            &mut s,
            Some(AccountState::Stopping),
            Some(ConnectionState::Closing),
        );
        if let Some(connection) = s.connection.take() {
            connection.close().await;
        }
        self.inner.set_state(
            account_id,
            &mut s,
            Some(AccountState::Idle),
            Some(ConnectionState::Disconnected),
        );
        info!(account = %account_id, queued = s.queue.len(), "account stopped");
        Ok(())
    }

    /// Sends an application message, queueing it while the socket is not
    /// open.
    pub async fn send(
        &self,
        account_id: &str,
        data: &OutboundData,
    ) -> Result<SendStatus, GatewayError> {
        let envelope = encode(data)?;
        let slot = self.inner.slot_or_insert(account_id).await;
        let mut s = slot.lock().await;

        if let Some(handle) = s.open_handle() {
            match handle.send_text(envelope.clone()).await {
                Ok(()) => return Ok(SendStatus::Sent),
                Err(e) => debug!(account = %account_id, error = %e, "socket closing, queueing"),
            }
        }

        let dropped = s.queue.push(envelope);
        if dropped.is_some() {
            warn!(
                account = %account_id,
                capacity = self.inner.settings.queue_capacity,
                "outbound queue full, dropped oldest message"
            );
        } else {
            debug!(account = %account_id, queued = s.queue.len(), "message queued");
        }
        Ok(SendStatus::Queued { dropped })
    }

    /// A dispatcher bound to the account's current socket.
    ///
    /// Sends through it fail with [`GatewayError::NotConnected`] if the
    /// socket is not open; they are never queued.
    pub async fn outbound(&self, account_id: &str) -> Result<OutboundDispatcher, GatewayError> {
        let slot = self
            .inner
            .slot(account_id)
            .await
            .ok_or_else(|| GatewayError::UnknownAccount(account_id.to_string()))?;
        let s = slot.lock().await;
        let server_url = s
            .config
            .as_ref()
            .map(|c| c.server_url.clone())
            .unwrap_or_else(|| AccountConfig::default().server_url);
        Ok(OutboundDispatcher::new(
            account_id,
            s.open_handle(),
            self.inner.media.clone(),
            server_url,
        ))
    }

    /// Sends text to `to` through the account's socket.
    pub async fn send_text(&self, account_id: &str, to: &str, text: &str) -> DeliveryResult {
        match self.outbound(account_id).await {
            Ok(outbound) => outbound.send_text(to, text).await,
            Err(e) => failed(e),
        }
    }

    /// Sends an attachment to `to` through the account's socket.
    pub async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        media_url: &str,
    ) -> DeliveryResult {
        match self.outbound(account_id).await {
            Ok(outbound) => outbound.send_media(to, text, media_url).await,
            Err(e) => failed(e),
        }
    }

    /// Sends a payload to `to` through the account's socket.
    pub async fn send_payload(
        &self,
        account_id: &str,
        to: &str,
        payload: &ReplyPayload,
        conversation_id: Option<&str>,
    ) -> DeliveryResult {
        match self.outbound(account_id).await {
            Ok(outbound) => outbound.send_payload(to, payload, conversation_id).await,
            Err(e) => failed(e),
        }
    }

    pub async fn account_state(&self, account_id: &str) -> Option<AccountState> {
        let slot = self.inner.slot(account_id).await?;
        Some(slot.lock().await.state)
    }

    pub async fn connection_state(&self, account_id: &str) -> Option<ConnectionState> {
        let slot = self.inner.slot(account_id).await?;
        Some(slot.lock().await.connection_state)
    }

    /// Number of messages waiting for the account's next open.
    pub async fn queued_len(&self, account_id: &str) -> usize {
        match self.inner.slot(account_id).await {
            Some(slot) => slot.lock().await.queue.len(),
            None => 0,
        }
    }

    pub async fn account_ids(&self) -> Vec<String> {
        self.inner.accounts.read().await.keys().cloned().collect()
    }

    /// Stops every account.
    pub async fn shutdown(&self) {
        for account_id in self.account_ids().await {
            if let Err(e) = self.stop_account(&account_id).await {
                warn!(account = %account_id, error = %e, "failed to stop account");
            }
        }
        info!("gateway shut down");
    }
}

fn failed(error: GatewayError) -> DeliveryResult {
    DeliveryResult::failed(None, error)
}

/// Opens a socket for `account_id` with its stored configuration.
///
/// Shared by explicit starts and timer-driven retries. Does nothing if the
/// account was restarted or stopped since `generation` was taken.
pub(crate) async fn connect_account(inner: &Arc<GatewayInner>, account_id: &str, generation: u64) {
    let Some(slot) = inner.slot(account_id).await else {
        return;
    };

    let config = {
        let mut s = slot.lock().await;
        if s.generation != generation {
            return;
        }
        let Some(config) = s.config.clone() else {
            return;
        };
        inner.set_state(account_id, &mut s, None, Some(ConnectionState::Connecting));
        config
    };

    let url = config.stream_url();
    info!(account = %account_id, url = %redact_api_key(&url), "connecting");

    let transport =
        match tokio::time::timeout(inner.settings.connect_timeout, inner.connector.connect(&url))
            .await
        {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!(account = %account_id, error = %e, "connection failed");
                on_socket_closed(inner.clone(), account_id.to_string(), generation).await;
                return;
            }
            Err(_) => {
                warn!(account = %account_id, error = %GatewayError::ConnectTimeout, "connection failed");
                on_socket_closed(inner.clone(), account_id.to_string(), generation).await;
                return;
            }
        };

    let mut s = slot.lock().await;
    if s.generation != generation {
        debug!(account = %account_id, "account restarted while connecting, dropping socket");
        return;
    }

    let connection = Connection::spawn(transport, &inner.settings, |handle| {
        callbacks(inner, account_id, generation, &config, handle)
    });

    let handle = connection.handle();
    let flushed = match flush_queue(&handle, &mut s.queue).await {
        Ok(flushed) => flushed,
        Err(e) => {
            warn!(
                account = %account_id,
                error = %e,
                requeued = s.queue.len(),
                "queue flush interrupted, dropping socket"
            );
            drop(connection);
            inner.set_state(account_id, &mut s, None, Some(ConnectionState::Disconnected));
            reconnection::schedule(inner, &mut s, account_id, generation);
            return;
        }
    };
    handle.mark_open();

    s.connection = Some(connection);
    s.reconnect.reset();
    inner.set_state(
        account_id,
        &mut s,
        Some(AccountState::Running),
        Some(ConnectionState::Open),
    );
    info!(account = %account_id, flushed, "connected");
}

/// Writes the queue ahead of any new send. If the writer is gone, whatever
/// was not written goes back to the front of the queue in order.
async fn flush_queue(
    handle: &ConnectionHandle,
    queue: &mut OutboundQueue,
) -> Result<usize, GatewayError> {
    let mut pending = queue.drain().into_iter();
    let mut flushed = 0;
    while let Some(envelope) = pending.next() {
        if let Err(e) = handle.write_raw(envelope.clone()).await {
            queue.restore(std::iter::once(envelope).chain(pending).collect());
            return Err(e);
        }
        flushed += 1;
    }
    Ok(flushed)
}

/// Builds the read-pump hooks for one socket.
fn callbacks(
    inner: &Arc<GatewayInner>,
    account_id: &str,
    generation: u64,
    config: &AccountConfig,
    handle: ConnectionHandle,
) -> Callbacks {
    let router = Arc::new(Router {
        account_id: account_id.to_string(),
        server_url: config.server_url.clone(),
        media: inner.media.clone(),
        runtime: inner.runtime.clone(),
        outbound: OutboundDispatcher::new(
            account_id,
            Some(handle),
            inner.media.clone(),
            config.server_url.clone(),
        ),
    });

    let on_rejected = {
        let inner = inner.clone();
        let account_id = account_id.to_string();
        Box::new(move |rejection: cloudbot_protocol::Rejection| {
            inner.emit(GatewayEvent::InboundDropped {
                account_id: account_id.clone(),
                reason: rejection.to_string(),
            });
        })
    };

    let on_disconnect = {
        let inner = inner.clone();
        let account_id = account_id.to_string();
        Box::new(move || {
            tokio::spawn(on_socket_closed(inner, account_id, generation));
        })
    };

    Callbacks {
        on_message: Box::new(move |message| {
            router.clone().spawn(message);
        }),
        on_rejected,
        on_disconnect,
    }
}

/// Handles an unplanned close or a failed connect: clears the socket and
/// hands over to the reconnection policy.
async fn on_socket_closed(inner: Arc<GatewayInner>, account_id: String, generation: u64) {
    let Some(slot) = inner.slot(&account_id).await else {
        return;
    };
    let mut s = slot.lock().await;
    if s.generation != generation {
        debug!(account = %account_id, "ignoring close from superseded socket");
        return;
    }
    if s.connection.is_none() && s.reconnect.has_timer() {
        debug!(account = %account_id, "reconnect already scheduled");
        return;
    }

    if s.connection.take().is_some() {
        info!(account = %account_id, "disconnected");
    }
    inner.set_state(&account_id, &mut s, None, Some(ConnectionState::Disconnected));
    reconnection::schedule(&inner, &mut s, &account_id, generation);
}
