// ── Connection manager ──
//
// Owns the single broker connection: spawns the STOMP transport task,
// funnels its events through one pump task per connection epoch, keeps
// the retry bookkeeping in `ConnectionState`, and broadcasts status and
// error changes to registered listeners.

mod listeners;
mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetwatch_api::{StompConfig, StompHandle, TransportEvent};

use crate::error::{CoreError, SubscriptionError};
use crate::subscription::{InboundMessage, RouteTable, SubscriptionId};

pub use listeners::ListenerId;
pub use state::{
    ConnectionState, ConnectionStatus, DEFAULT_MAX_RETRY, ErrorKind, ErrorRecord,
};

use listeners::{ListenerIds, Listeners};

// ── ConnectionManager ────────────────────────────────────────────────

/// Process-wide handle to the broker connection.
///
/// Cheaply cloneable via `Arc<Inner>`. Every clone shares the transport,
/// the state, the listeners and the subscription routes.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    stomp: StompConfig,
    state: watch::Sender<ConnectionState>,
    status_listeners: Listeners<ConnectionState>,
    error_listeners: Listeners<ErrorRecord>,
    listener_ids: ListenerIds,
    transport: Mutex<Option<Transport>>,
    /// Bumped by every connect/disconnect. The pump drops events from an
    /// older epoch.
    epoch: AtomicU64,
    routes: RouteTable,
}

struct Transport {
    handle: StompHandle,
    epoch: u64,
}

impl ConnectionManager {
    /// Create a manager. Does NOT connect: call [`connect()`](Self::connect).
    pub fn new(stomp: StompConfig, max_retry: u32) -> Self {
        let (state, _) = watch::channel(ConnectionState::new(max_retry));
        Self {
            inner: Arc::new(Inner {
                stomp,
                state,
                status_listeners: Listeners::default(),
                error_listeners: Listeners::default(),
                listener_ids: ListenerIds::default(),
                transport: Mutex::new(None),
                epoch: AtomicU64::new(0),
                routes: RouteTable::default(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the transport if it is not already running.
    ///
    /// Returns as soon as the transport task is spawned; progress is
    /// reported through the state channel and listeners. Calling this
    /// while a transport is live is a no-op. Must be called within a
    /// Tokio runtime.
    pub fn connect(&self) -> Result<(), CoreError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CoreError::Internal("connect() must be called within a Tokio runtime".into())
        })?;

        let (epoch, events, attempt_started) = {
            let mut transport = self.inner.lock_transport();
            if transport.as_ref().is_some_and(|t| !t.handle.is_closed()) {
                debug!("connect() with a live transport: no-op");
                return Ok(());
            }

            let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            let (handle, events) = {
                let _guard = runtime.enter();
                StompHandle::spawn(self.inner.stomp.clone(), CancellationToken::new())
            };
            *transport = Some(Transport { handle, epoch });

            // Recorded before the pump exists: a fast CONNECTED must land
            // after `Connecting`, never before it.
            let attempt_started = self.inner.state.send_if_modified(|state| {
                let before = state.clone();
                state.begin_attempt();
                *state != before
            });
            info!(url = %self.inner.stomp.url, epoch, "transport started");
            (epoch, events, attempt_started)
        };

        if attempt_started && self.inner.is_current(epoch) {
            let snapshot = self.inner.state.borrow().clone();
            self.inner.status_listeners.emit(&snapshot);
        }
        runtime.spawn(pump(Arc::downgrade(&self.inner), epoch, events));
        Ok(())
    }

    /// Tear down the transport and every live subscription. Idempotent.
    ///
    /// When this returns, no subscription callback is running and none
    /// will run again.
    pub fn disconnect(&self) {
        let transport = self.inner.lock_transport().take();

        // The epoch bump happens inside the state write so a pump that is
        // mid-event cannot publish a stale status after this one.
        let changed = self.inner.state.send_if_modified(|state| {
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
            let changed = state.status != ConnectionStatus::Disconnected;
            state.record_disconnected();
            changed
        });

        self.inner.routes.close_all();

        if let Some(transport) = transport {
            transport.handle.shutdown();
            info!(epoch = transport.epoch, "transport stopped");
        }

        if changed {
            let snapshot = self.inner.state.borrow().clone();
            self.inner.status_listeners.emit(&snapshot);
        }
    }

    /// Send a JSON payload to an application destination.
    ///
    /// Fails with [`CoreError::NotConnected`] unless the status is
    /// `Connected`.
    pub fn publish(&self, destination: &str, payload: &impl Serialize) -> Result<(), CoreError> {
        if !self.inner.state.borrow().is_connected() {
            return Err(CoreError::NotConnected);
        }
        let body = serde_json::to_string(payload)
            .map_err(|e| CoreError::Internal(format!("cannot encode payload: {e}")))?;

        let transport = self.inner.lock_transport();
        let handle = transport.as_ref().ok_or(CoreError::NotConnected)?;
        handle
            .handle
            .send(destination, body)
            .map_err(|_| CoreError::NotConnected)?;
        debug!(%destination, "published");
        Ok(())
    }

    /// Clear the retry counter and the failed flag without connecting.
    pub fn reset(&self) {
        self.inner.update_state(None, ConnectionState::reset);
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Async observation of the state. Every write is visible here.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    /// Register a status listener. Called synchronously, in registration
    /// order, with the new state after every change.
    pub fn on_status(&self, f: impl FnMut(&ConnectionState) + Send + 'static) -> ListenerId {
        let id = self.inner.listener_ids.next();
        self.inner.status_listeners.add(id, f);
        id
    }

    /// Register an error listener, called for every transport failure.
    pub fn on_error(&self, f: impl FnMut(&ErrorRecord) + Send + 'static) -> ListenerId {
        let id = self.inner.listener_ids.next();
        self.inner.error_listeners.add(id, f);
        id
    }

    /// Remove a status or error listener. Idempotent.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.status_listeners.remove(id) || self.inner.error_listeners.remove(id)
    }

    /// Number of subscriptions with a live route.
    pub fn subscription_count(&self) -> usize {
        self.inner.routes.len()
    }

    // ── Subscription plumbing (used by the registry) ─────────────────

    pub(crate) fn attach(
        &self,
        destination: &str,
        handler: impl FnMut(&InboundMessage) + Send + 'static,
    ) -> Result<SubscriptionId, SubscriptionError> {
        let transport = self.inner.lock_transport();
        let Some(transport) = transport.as_ref().filter(|t| !t.handle.is_closed()) else {
            return Err(SubscriptionError::NotConnected {
                destination: destination.to_owned(),
            });
        };

        let id = SubscriptionId::new();
        // Route first: the broker may answer before `subscribe` returns.
        self.inner.routes.insert(id, destination, handler);
        if let Err(e) = transport.handle.subscribe(&id.wire(), destination) {
            self.inner.routes.remove(id);
            return Err(SubscriptionError::Transport {
                message: e.to_string(),
            });
        }
        debug!(subscription = %id, %destination, "subscribed");
        Ok(id)
    }

    pub(crate) fn detach(&self, id: SubscriptionId) -> bool {
        let Some(destination) = self.inner.routes.remove(id) else {
            return false;
        };
        if let Some(transport) = self.inner.lock_transport().as_ref() {
            let _ = transport.handle.unsubscribe(&id.wire());
        }
        debug!(subscription = %id, %destination, "unsubscribed");
        true
    }

    pub(crate) fn destination_of(&self, id: SubscriptionId) -> Option<String> {
        self.inner.routes.destination(id)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.stomp.url.as_str())
            .field("state", &*self.inner.state.borrow())
            .field("subscriptions", &self.inner.routes.len())
            .finish()
    }
}

// ── Inner ────────────────────────────────────────────────────────────

impl Inner {
    fn lock_transport(&self) -> std::sync::MutexGuard<'_, Option<Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Apply `f` to the state and notify status listeners if it changed.
    ///
    /// With `Some(epoch)`, the write is skipped when that epoch is stale.
    fn update_state(&self, epoch: Option<u64>, f: impl FnOnce(&mut ConnectionState)) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if epoch.is_some_and(|e| !self.is_current(e)) {
                return false;
            }
            let before = state.clone();
            f(state);
            *state != before
        });
        if changed {
            let snapshot = self.state.borrow().clone();
            self.status_listeners.emit(&snapshot);
        }
        changed
    }

    fn handle_event(&self, epoch: u64, event: TransportEvent) {
        match event {
            TransportEvent::Connecting { attempt } => {
                debug!(attempt, epoch, "connection attempt");
                self.update_state(Some(epoch), ConnectionState::begin_attempt);
            }
            TransportEvent::Connected { server } => {
                info!(server = server.as_deref().unwrap_or("unknown"), epoch, "connected");
                self.update_state(Some(epoch), ConnectionState::record_connected);
            }
            TransportEvent::Message(frame) => self.routes.dispatch(frame),
            TransportEvent::Failed(error) => self.handle_failure(epoch, &error),
            TransportEvent::Stopped => {
                {
                    let mut transport = self.lock_transport();
                    if transport.as_ref().is_some_and(|t| t.epoch == epoch) {
                        transport.take();
                    }
                }
                self.update_state(Some(epoch), ConnectionState::record_disconnected);
            }
        }
    }

    fn handle_failure(&self, epoch: u64, error: &fleetwatch_api::Error) {
        let kind = if error.is_auth() {
            ErrorKind::Auth
        } else {
            ErrorKind::Connection
        };
        let record = ErrorRecord::new(kind, error.to_string());

        let mut crossed = false;
        let applied = self.update_state(Some(epoch), |state| {
            crossed = state.record_failure(record.clone());
        });
        if !applied {
            return;
        }

        let state = self.state.borrow().clone();
        if crossed {
            warn!(
                retry_count = state.retry_count,
                max_retry = state.max_retry,
                "streaming connection failed repeatedly; fallback polling should take over"
            );
        } else {
            debug!(retry_count = state.retry_count, %kind, "connection attempt failed");
        }
        self.error_listeners.emit(&record);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let transport = self
            .transport
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(transport) = transport.take() {
            transport.handle.shutdown();
        }
        self.status_listeners.clear();
        self.error_listeners.clear();
    }
}

// ── Event pump ───────────────────────────────────────────────────────

/// Single consumer of one transport's events. Every store mutation driven
/// by the stream happens here, in arrival order.
async fn pump(inner: Weak<Inner>, epoch: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(epoch) {
            break;
        }
        inner.handle_event(epoch, event);
    }
    debug!(epoch, "event pump exiting");
}
