// ── Inbound message routing ──
//
// Maps wire subscription ids to consumer callbacks. The pump task looks a
// route up, releases the map guard, then invokes the route's slot, so a
// callback can freely subscribe or unsubscribe.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use fleetwatch_api::{InboundFrame, OneOrMany};

use crate::callback::CallbackSlot;
use crate::error::CoreError;

const WIRE_PREFIX: &str = "sub-";

// ── SubscriptionId ───────────────────────────────────────────────────

/// Unique id of one active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The `id` header value used in SUBSCRIBE / MESSAGE frames.
    pub fn wire(&self) -> String {
        format!("{WIRE_PREFIX}{}", self.0.simple())
    }

    pub(crate) fn from_wire(raw: &str) -> Option<Self> {
        raw.strip_prefix(WIRE_PREFIX)
            .and_then(|s| Uuid::try_parse(s).ok())
            .map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire())
    }
}

// ── InboundMessage ───────────────────────────────────────────────────

/// One message delivered to a subscription callback.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subscription: SubscriptionId,
    pub destination: String,
    pub message_id: Option<String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_str(&self.body).map_err(|e| CoreError::MessageParse {
            destination: self.destination.clone(),
            message: e.to_string(),
        })
    }

    /// Decode a body that may be a single object or an array of them.
    pub fn json_batch<T: DeserializeOwned>(&self) -> Result<Vec<T>, CoreError> {
        self.json::<OneOrMany<T>>().map(OneOrMany::into_vec)
    }
}

// ── RouteTable ───────────────────────────────────────────────────────

struct Route {
    destination: String,
    slot: Arc<CallbackSlot<InboundMessage>>,
}

#[derive(Default)]
pub(crate) struct RouteTable {
    routes: DashMap<SubscriptionId, Route>,
}

impl RouteTable {
    pub(crate) fn insert(
        &self,
        id: SubscriptionId,
        destination: &str,
        handler: impl FnMut(&InboundMessage) + Send + 'static,
    ) {
        self.routes.insert(
            id,
            Route {
                destination: destination.to_owned(),
                slot: Arc::new(CallbackSlot::new(handler)),
            },
        );
    }

    /// Remove and close a route. Returns its destination if it existed.
    ///
    /// When this returns, the route's callback is not running and never
    /// will again (unless called from inside that callback).
    pub(crate) fn remove(&self, id: SubscriptionId) -> Option<String> {
        let (_, route) = self.routes.remove(&id)?;
        route.slot.close();
        Some(route.destination)
    }

    /// Close every route.
    pub(crate) fn close_all(&self) {
        let ids: Vec<SubscriptionId> = self.routes.iter().map(|r| *r.key()).collect();
        for id in ids {
            self.remove(id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn destination(&self, id: SubscriptionId) -> Option<String> {
        self.routes.get(&id).map(|r| r.destination.clone())
    }

    /// Deliver a transport frame to its subscription's callback.
    pub(crate) fn dispatch(&self, frame: InboundFrame) {
        let Some(id) = SubscriptionId::from_wire(&frame.subscription) else {
            warn!(
                subscription = %frame.subscription,
                destination = %frame.destination,
                "message for a subscription id we never issued"
            );
            return;
        };

        // Clone the slot out so the shard guard is released before the call.
        let slot = match self.routes.get(&id) {
            Some(route) => Arc::clone(&route.slot),
            None => {
                debug!(subscription = %id, "dropping message for a closed subscription");
                return;
            }
        };

        let message = InboundMessage {
            subscription: id,
            destination: frame.destination,
            message_id: frame.message_id,
            body: frame.body,
            received_at: Utc::now(),
        };
        slot.invoke(&message);
    }
}
