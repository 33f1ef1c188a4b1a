// ── Live sync session ──
//
// Wires the connection manager, the subscription registry, the domain
// stores, the REST snapshot loader and the fallback poller together.
// One `LiveSync` per dashboard session; nothing here is global.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetwatch_api::{AgentDto, ContainerDetailDto, ContainerDto, RestClient};

use crate::auth::decode_current_user;
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState, ListenerId};
use crate::error::CoreError;
use crate::fallback::{self, SnapshotSummary};
use crate::model::{AgentUpdate, ContainerDetail, ContainerUpdate, CurrentUser, EntityId};
use crate::store::DataStore;
use crate::subscription::{InboundMessage, SubscriptionHook, SubscriptionRegistry, destination};

/// Domains whose feeds the session attaches and requests.
const FEED_DOMAINS: [&str; 2] = [destination::DASHBOARD, destination::AGENTS];

/// A running (or startable) sync session.
///
/// Cheaply cloneable via `Arc<Inner>`.
#[derive(Clone)]
pub struct LiveSync {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    connection: ConnectionManager,
    registry: SubscriptionRegistry,
    feeds: SubscriptionHook,
    store: Arc<DataStore>,
    rest: RestClient,
    current_user: Option<CurrentUser>,
    fallback_active: watch::Sender<bool>,
    detail_destination: Mutex<Option<String>>,
    status_listener: Mutex<Option<ListenerId>>,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LiveSync {
    /// Build a session. Does not connect: call [`start()`](Self::start).
    pub fn new(config: SyncConfig) -> Result<Self, CoreError> {
        let rest = RestClient::new(
            config.api_base.clone(),
            config.token.as_ref(),
            &config.transport(),
        )?;
        Ok(Self::with_rest(config, rest))
    }

    /// Build a session around a pre-built REST client.
    pub fn with_rest(config: SyncConfig, rest: RestClient) -> Self {
        let connection = ConnectionManager::new(config.stomp(), config.max_retry);
        let registry = SubscriptionRegistry::new(connection.clone());
        let feeds = registry.hook();
        let current_user = decode_current_user(config.token.as_ref());
        let (fallback_active, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                connection,
                registry,
                feeds,
                store: Arc::new(DataStore::new()),
                rest,
                current_user,
                fallback_active,
                detail_destination: Mutex::new(None),
                status_listener: Mutex::new(None),
                poller: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect, load the REST snapshot, attach the live feeds and start
    /// the fallback poller. Safe to call again; already-running parts are
    /// left alone.
    ///
    /// A failed snapshot load is logged and tolerated (the stream or the
    /// poller fills the stores later) unless the token was rejected, in
    /// which case the connection is torn down again.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.inner.connection.connect()?;
        self.install_feed_requests();

        match self.load_snapshot().await {
            Ok(summary) => info!(
                containers = summary.containers,
                agents = summary.agents,
                "initial snapshot loaded"
            ),
            Err(e) if e.is_auth() => {
                self.inner.connection.disconnect();
                return Err(e);
            }
            Err(e) => warn!(error = %e, "initial snapshot failed; waiting for live data"),
        }

        self.attach_feeds()?;
        self.spawn_poller();
        Ok(())
    }

    /// Detach every feed, stop the poller and disconnect.
    pub async fn shutdown(&self) {
        let poller = self.inner.lock_poller().take();
        if let Some(poller) = poller {
            poller.cancel.cancel();
            if let Err(e) = poller.handle.await {
                warn!(error = %e, "fallback poller ended abnormally");
            }
        }

        if let Some(id) = self.inner.lock_listener().take() {
            self.inner.connection.remove_listener(id);
        }
        self.inner.lock_detail().take();
        self.inner.store.selected.clear();
        self.inner.feeds.teardown();
        info!("live sync stopped");
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Bulk-replace both lists from REST.
    pub async fn load_snapshot(&self) -> Result<SnapshotSummary, CoreError> {
        fallback::load_snapshot(&self.inner.rest, &self.inner.store).await
    }

    /// Merge a REST snapshot into the lists, keeping favorites.
    pub async fn refresh(&self) -> Result<SnapshotSummary, CoreError> {
        fallback::refresh_snapshot(&self.inner.rest, &self.inner.store).await
    }

    // ── Selected container ───────────────────────────────────────────

    /// Track one container's detail: subscribe to its topic and load the
    /// current detail over REST. Replaces any previous selection.
    ///
    /// If the REST load fails the container is deselected again.
    pub async fn select_container(&self, id: EntityId) -> Result<(), CoreError> {
        let topic = destination::container_detail(&id);
        self.inner.store.selected.select(id.clone());

        let store = Arc::clone(&self.inner.store);
        let subscribed = self
            .inner
            .feeds
            .subscribe(&topic, move |message| apply_detail(&store, message));
        if let Err(e) = subscribed {
            self.inner.store.selected.clear();
            return Err(e.into());
        }

        let previous = self.inner.lock_detail().replace(topic.clone());
        if let Some(previous) = previous.filter(|p| *p != topic) {
            self.inner.feeds.unsubscribe(&previous);
        }

        if let Err(e) = fallback::load_container_detail(&self.inner.rest, &self.inner.store, &id).await {
            warn!(container = %id, error = %e, "detail load failed; deselecting");
            self.deselect_container();
            return Err(e);
        }
        Ok(())
    }

    /// Drop the selection and its subscription.
    pub fn deselect_container(&self) {
        if let Some(topic) = self.inner.lock_detail().take() {
            self.inner.feeds.unsubscribe(&topic);
        }
        self.inner.store.selected.clear();
    }

    // ── Pause ────────────────────────────────────────────────────────

    pub fn pause(&self) -> bool {
        self.inner.store.containers.pause()
    }

    pub fn resume(&self) -> bool {
        self.inner.store.containers.resume()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Identity decoded from the configured token, if any.
    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.inner.current_user.as_ref()
    }

    /// Whether REST polling is currently standing in for the stream.
    pub fn fallback_active(&self) -> bool {
        *self.inner.fallback_active.borrow()
    }

    pub fn subscribe_fallback(&self) -> watch::Receiver<bool> {
        self.inner.fallback_active.subscribe()
    }

    /// Destinations the session's feeds currently hold.
    pub fn feed_destinations(&self) -> Vec<String> {
        self.inner.feeds.destinations()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn attach_feeds(&self) -> Result<(), CoreError> {
        let store = Arc::clone(&self.inner.store);
        self.inner
            .feeds
            .subscribe(&destination::topic(destination::DASHBOARD), move |message| {
                apply_containers(&store, message);
            })?;

        let store = Arc::clone(&self.inner.store);
        self.inner
            .feeds
            .subscribe(&destination::topic(destination::AGENTS), move |message| {
                apply_agents(&store, message);
            })?;
        Ok(())
    }

    /// Ask the backend for its feeds each time the session (re)connects.
    fn install_feed_requests(&self) {
        let mut listener = self.inner.lock_listener();
        if listener.is_some() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut was_connected = false;
        let id = self.inner.connection.on_status(move |state| {
            let connected = state.is_connected();
            if connected && !was_connected {
                if let Some(inner) = weak.upgrade() {
                    inner.request_feeds();
                }
            }
            was_connected = connected;
        });
        *listener = Some(id);
    }

    fn spawn_poller(&self) {
        let mut poller = self.inner.lock_poller();
        if poller.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(fallback::fallback_task(
            self.inner.rest.clone(),
            Arc::clone(&self.inner.store),
            self.inner.connection.watch(),
            self.inner.fallback_active.clone(),
            self.inner.config.polling_interval,
            cancel.clone(),
        ));
        *poller = Some(Poller { cancel, handle });
    }
}

impl std::fmt::Debug for LiveSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSync")
            .field("connection", &self.inner.connection)
            .field("feeds", &self.inner.feeds.destinations())
            .field("fallback_active", &*self.inner.fallback_active.borrow())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn request_feeds(&self) {
        for domain in FEED_DOMAINS {
            if let Err(e) = self.registry.request_feed(domain) {
                warn!(domain, error = %e, "feed request not sent");
            }
        }
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> std::sync::MutexGuard<'_, Option<ListenerId>> {
        self.status_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_detail(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.detail_destination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let poller = self.poller.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(poller) = poller.take() {
            poller.cancel.cancel();
        }
    }
}

// ── Feed handlers ────────────────────────────────────────────────────
//
// Malformed payloads are logged and dropped; the subscription stays up.

fn decode_batch<D, U>(message: &InboundMessage) -> Option<Vec<U>>
where
    D: serde::de::DeserializeOwned,
    U: TryFrom<D, Error = CoreError>,
{
    let dtos = match message.json_batch::<D>() {
        Ok(dtos) => dtos,
        Err(e) => {
            warn!(destination = %message.destination, error = %e, "dropping malformed message");
            return None;
        }
    };
    let updates = dtos
        .into_iter()
        .filter_map(|dto| {
            U::try_from(dto)
                .inspect_err(|e| {
                    warn!(destination = %message.destination, error = %e, "dropping record");
                })
                .ok()
        })
        .collect();
    Some(updates)
}

fn apply_containers(store: &DataStore, message: &InboundMessage) {
    let Some(updates) = decode_batch::<ContainerDto, ContainerUpdate>(message) else {
        return;
    };
    let added = store.containers.upsert_many(updates);
    store.mark_message(message.received_at);
    debug!(destination = %message.destination, added, "containers updated");
}

fn apply_agents(store: &DataStore, message: &InboundMessage) {
    let Some(updates) = decode_batch::<AgentDto, AgentUpdate>(message) else {
        return;
    };
    let added = store.agents.upsert_many(updates);
    store.mark_message(message.received_at);
    debug!(destination = %message.destination, added, "agents updated");
}

fn apply_detail(store: &DataStore, message: &InboundMessage) {
    let detail = message
        .json::<ContainerDetailDto>()
        .and_then(ContainerDetail::try_from);
    match detail {
        Ok(detail) => {
            if store.selected.replace(detail) {
                store.mark_message(message.received_at);
            }
        }
        Err(e) => {
            warn!(destination = %message.destination, error = %e, "dropping malformed detail");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionId;
    use chrono::Utc;

    fn message(destination: &str, body: &str) -> InboundMessage {
        InboundMessage {
            subscription: SubscriptionId::new(),
            destination: destination.into(),
            message_id: None,
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    fn session() -> LiveSync {
        let config = SyncConfig::new(
            "ws://127.0.0.1:9/ws".parse().unwrap(),
            "http://127.0.0.1:9/api/".parse().unwrap(),
        );
        LiveSync::new(config).unwrap()
    }

    #[test]
    fn container_feed_merges_batches() {
        let store = DataStore::new();
        apply_containers(
            &store,
            &message(
                "/topic/dashboard",
                r#"[{"containerId":7,"containerName":"db-1","cpuPercent":10}]"#,
            ),
        );
        apply_containers(
            &store,
            &message("/topic/dashboard", r#"{"containerId":7,"cpuPercent":55}"#),
        );

        let db = store.containers.get(&EntityId::from(7)).unwrap();
        assert_eq!(db.name, "db-1");
        assert!((db.cpu_percent - 55.0).abs() < f64::EPSILON);
        assert!(store.last_message().is_some());
    }

    #[test]
    fn malformed_feed_message_is_dropped() {
        let store = DataStore::new();
        apply_containers(&store, &message("/topic/dashboard", "{oops"));
        apply_agents(&store, &message("/topic/agents", r#"[{"agentName":"no-id"}]"#));
        assert!(store.containers.is_empty());
        assert!(store.agents.is_empty());
        assert!(store.last_message().is_none());
    }

    #[test]
    fn detail_feed_replaces_selected() {
        let store = DataStore::new();
        store.selected.select(EntityId::from(3));
        apply_detail(
            &store,
            &message(
                "/topic/containers/3",
                r#"{"containerId":3,"containerName":"api","image":"api:2"}"#,
            ),
        );
        assert_eq!(store.selected.current().unwrap().image, "api:2");
    }

    #[test]
    fn session_without_token_has_no_user() {
        let sync = session();
        assert!(sync.current_user().is_none());
        assert!(!sync.fallback_active());
        assert!(sync.feed_destinations().is_empty());
    }

    #[tokio::test]
    async fn select_before_start_is_a_subscription_error() {
        let sync = session();
        let err = sync.select_container(EntityId::from(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::Subscription(_)));
        sync.deselect_container();
        assert!(sync.store().selected.selected_id().is_none());
    }

    #[tokio::test]
    async fn pause_and_resume_delegate_to_container_store() {
        let sync = session();
        assert!(sync.pause());
        assert!(sync.store().containers.is_paused());
        assert!(sync.resume());
        assert!(!sync.resume());
    }
}
