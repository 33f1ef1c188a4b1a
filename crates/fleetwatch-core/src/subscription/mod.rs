// ── Subscription registry ──
//
// Per-destination subscribe/unsubscribe bookkeeping over the connection
// manager. The registry only tracks ids: two consumers subscribing to the
// same destination get two independent subscriptions. `SubscriptionHook`
// is the per-consumer view that enforces one subscription per destination.

pub mod destination;
mod route;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use fleetwatch_api::FeedRequest;

use crate::connection::ConnectionManager;
use crate::error::{CoreError, SubscriptionError};

pub(crate) use route::RouteTable;
pub use route::{InboundMessage, SubscriptionId};

// ── SubscriptionRegistry ─────────────────────────────────────────────

/// Subscribe/unsubscribe entry point, shared by every consumer.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    connection: ConnectionManager,
}

impl SubscriptionRegistry {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Attach `on_message` to `destination`.
    ///
    /// Requires a started transport (`connect()` called). Subscriptions
    /// made while the socket is reconnecting are sent once it is back.
    pub fn subscribe(
        &self,
        destination: &str,
        on_message: impl FnMut(&InboundMessage) + Send + 'static,
    ) -> Result<SubscriptionId, SubscriptionError> {
        self.connection.attach(destination, on_message)
    }

    /// Detach a subscription. Idempotent; returns whether it was live.
    ///
    /// When this returns the callback is not running and never runs again.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.connection.detach(id)
    }

    /// Ask the backend to start pushing `domain`, by publishing
    /// `{"action":"subscribe","timestamp":<epoch-ms>}` to
    /// `/app/<domain>/subscribe`.
    pub fn request_feed(&self, domain: &str) -> Result<(), CoreError> {
        let destination = destination::app_subscribe(domain);
        self.connection
            .publish(&destination, &FeedRequest::subscribe_now())
    }

    /// A fresh per-consumer hook.
    pub fn hook(&self) -> SubscriptionHook {
        SubscriptionHook {
            registry: self.clone(),
            active: Mutex::new(HashMap::new()),
        }
    }
}

// ── SubscriptionHook ─────────────────────────────────────────────────

/// One consumer's subscriptions, at most one per destination.
///
/// Subscribing again to a destination this hook already holds replaces
/// the old subscription: the new one is attached, swapped in under the
/// hook's lock, and the displaced one is then unsubscribed. The consumer must
/// call [`detach`](Self::detach) or [`teardown`](Self::teardown) when it
/// stops observing: dropping the hook does NOT unsubscribe.
#[derive(Debug)]
pub struct SubscriptionHook {
    registry: SubscriptionRegistry,
    active: Mutex<HashMap<String, SubscriptionId>>,
}

impl SubscriptionHook {
    pub fn subscribe(
        &self,
        destination: &str,
        on_message: impl FnMut(&InboundMessage) + Send + 'static,
    ) -> Result<SubscriptionId, SubscriptionError> {
        let id = self.registry.subscribe(destination, on_message)?;
        let previous = self.lock().insert(destination.to_owned(), id);
        if let Some(previous) = previous {
            debug!(%destination, subscription = %previous, "replacing subscription");
            self.registry.unsubscribe(previous);
        }
        Ok(id)
    }

    /// Drop this hook's subscription to `destination`, if any.
    pub fn unsubscribe(&self, destination: &str) -> bool {
        let id = self.lock().remove(destination);
        id.is_some_and(|id| self.registry.unsubscribe(id))
    }

    /// Release every subscription this hook holds. The connection stays
    /// up for other consumers.
    pub fn detach(&self) {
        let ids: Vec<SubscriptionId> = self.lock().drain().map(|(_, id)| id).collect();
        for id in ids {
            self.registry.unsubscribe(id);
        }
    }

    /// Release everything and disconnect the shared transport.
    pub fn teardown(&self) {
        self.detach();
        self.registry.connection().disconnect();
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Destinations this hook currently holds, sorted.
    pub fn destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, id)| self.registry.connection().destination_of(**id).is_some())
            .map(|(destination, _)| destination.clone())
            .collect();
        destinations.sort();
        destinations
    }

    pub fn subscription(&self, destination: &str) -> Option<SubscriptionId> {
        self.lock().get(destination).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SubscriptionId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
