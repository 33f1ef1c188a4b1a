// ── Fallback policy and REST snapshot loading ──
//
// When the broker has failed `max_retry` times in a row the stream is
// considered dead and the stores are refreshed by polling REST instead.
// Polling stops as soon as a connection succeeds again.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetwatch_api::RestClient;

use crate::connection::ConnectionState;
use crate::error::CoreError;
use crate::model::{
    AgentRecord, AgentUpdate, ContainerDetail, ContainerRecord, ContainerUpdate, EntityId,
};
use crate::store::DataStore;

/// Whether consumers should switch from streaming to REST polling.
pub fn should_use_fallback(state: &ConnectionState) -> bool {
    state.connection_failed
}

/// Counts from one applied REST snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub containers: usize,
    pub agents: usize,
    /// DTOs dropped because they could not be mapped (e.g. no id).
    pub skipped: usize,
    /// Records removed because the snapshot no longer lists them.
    pub pruned: usize,
}

// ── Snapshot fetch ───────────────────────────────────────────────────

struct Fetched {
    containers: Vec<ContainerUpdate>,
    agents: Vec<AgentUpdate>,
    skipped: usize,
}

async fn fetch(rest: &RestClient) -> Result<Fetched, CoreError> {
    let (containers, agents) = tokio::join!(rest.list_containers(), rest.list_agents());
    let mut skipped = 0;

    let containers = map_all(containers?, &mut skipped);
    let agents = map_all(agents?, &mut skipped);

    Ok(Fetched {
        containers,
        agents,
        skipped,
    })
}

fn map_all<D, U>(dtos: Vec<D>, skipped: &mut usize) -> Vec<U>
where
    U: TryFrom<D, Error = CoreError>,
{
    dtos.into_iter()
        .filter_map(|dto| match U::try_from(dto) {
            Ok(update) => Some(update),
            Err(e) => {
                warn!(error = %e, "skipping unmappable snapshot record");
                *skipped += 1;
                None
            }
        })
        .collect()
}

/// Initial load: bulk-replace both lists with the REST snapshot.
pub async fn load_snapshot(
    rest: &RestClient,
    store: &DataStore,
) -> Result<SnapshotSummary, CoreError> {
    let fetched = fetch(rest).await?;
    let summary = SnapshotSummary {
        containers: fetched.containers.len(),
        agents: fetched.agents.len(),
        skipped: fetched.skipped,
        pruned: 0,
    };

    store.containers.set_all(
        fetched
            .containers
            .into_iter()
            .map(ContainerRecord::from_update)
            .collect(),
    );
    store.agents.set_all(
        fetched
            .agents
            .into_iter()
            .map(AgentRecord::from_update)
            .collect(),
    );
    store.mark_snapshot(Utc::now());

    debug!(
        containers = summary.containers,
        agents = summary.agents,
        skipped = summary.skipped,
        "snapshot loaded"
    );
    Ok(summary)
}

/// Poll refresh: merge into the existing lists and prune what disappeared,
/// so client-local flags survive.
pub async fn refresh_snapshot(
    rest: &RestClient,
    store: &DataStore,
) -> Result<SnapshotSummary, CoreError> {
    let fetched = fetch(rest).await?;
    let mut summary = SnapshotSummary {
        containers: fetched.containers.len(),
        agents: fetched.agents.len(),
        skipped: fetched.skipped,
        pruned: 0,
    };

    summary.pruned += store.containers.apply_snapshot(fetched.containers);
    summary.pruned += store.agents.apply_snapshot(fetched.agents);
    store.mark_snapshot(Utc::now());

    debug!(
        containers = summary.containers,
        agents = summary.agents,
        pruned = summary.pruned,
        "snapshot refreshed"
    );
    Ok(summary)
}

/// Fetch the detail for one container and hand it to the selection store,
/// unless the live topic already delivered one.
pub async fn load_container_detail(
    rest: &RestClient,
    store: &DataStore,
    id: &EntityId,
) -> Result<bool, CoreError> {
    let dto = rest.container_detail(&id.to_string()).await?;
    let detail = ContainerDetail::try_from(dto)?;
    Ok(store.selected.fill(detail))
}

// ── Poller task ──────────────────────────────────────────────────────

/// Watch the connection state and poll REST while the fallback policy
/// says so. `active` mirrors whether polling is currently engaged.
pub(crate) async fn fallback_task(
    rest: RestClient,
    store: std::sync::Arc<DataStore>,
    mut state: watch::Receiver<ConnectionState>,
    active: watch::Sender<bool>,
    polling_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker: Option<tokio::time::Interval> = None;

    loop {
        let engaged = should_use_fallback(&state.borrow_and_update());

        match (engaged, ticker.is_some()) {
            (true, false) => {
                let retry_count = state.borrow().retry_count;
                warn!(retry_count, "streaming unavailable; switching to REST polling");
                let mut interval = tokio::time::interval(polling_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker = Some(interval);
                active.send_replace(true);
            }
            (false, true) => {
                info!("stream recovered; stopping REST polling");
                ticker = None;
                active.send_replace(false);
            }
            _ => {}
        }

        match ticker.as_mut() {
            Some(interval) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = refresh_snapshot(&rest, &store).await {
                            warn!(error = %e, "fallback poll failed");
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    active.send_replace(false);
    debug!("fallback poller stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionStatus, DEFAULT_MAX_RETRY};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn failed_state() -> ConnectionState {
        ConnectionState {
            status: ConnectionStatus::Error,
            retry_count: DEFAULT_MAX_RETRY,
            connection_failed: true,
            ..ConnectionState::default()
        }
    }

    async fn backend(containers: serde_json::Value) -> (MockServer, RestClient) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/containers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(containers))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"agentId": 1, "agentName": "edge-1", "status": "ON"}
            ])))
            .mount(&server)
            .await;
        let rest = client(&server);
        (server, rest)
    }

    fn client(server: &MockServer) -> RestClient {
        let base = format!("{}/api", server.uri()).parse().unwrap();
        RestClient::new(base, None, &fleetwatch_api::TransportConfig::default()).unwrap()
    }

    #[test]
    fn policy_follows_failed_flag() {
        let mut state = ConnectionState::default();
        assert!(!should_use_fallback(&state));
        state.connection_failed = true;
        assert!(should_use_fallback(&state));
    }

    #[tokio::test]
    async fn load_snapshot_replaces_and_skips_unmappable() {
        let (_server, rest) = backend(serde_json::json!([
            {"containerId": 1, "containerName": "web"},
            {"containerName": "ghost"},
            {"containerId": 2, "containerName": "db"}
        ]))
        .await;
        let store = DataStore::new();
        store.containers.upsert(ContainerUpdate::new(99));

        let summary = load_snapshot(&rest, &store).await.unwrap();

        assert_eq!(summary.containers, 2);
        assert_eq!(summary.agents, 1);
        assert_eq!(summary.skipped, 1);
        assert!(store.containers.get(&EntityId::from(99)).is_none());
        assert_eq!(store.containers.len(), 2);
        assert!(store.last_snapshot().is_some());
    }

    #[tokio::test]
    async fn refresh_keeps_favorites_and_prunes() {
        let (_server, rest) = backend(serde_json::json!([
            {"containerId": 1, "containerName": "web"}
        ]))
        .await;
        let store = DataStore::new();
        store.containers.upsert(ContainerUpdate::new(1));
        store.containers.upsert(ContainerUpdate::new(2));
        store.containers.set_favorite(&EntityId::from(1), true);

        let summary = refresh_snapshot(&rest, &store).await.unwrap();

        assert_eq!(summary.pruned, 1);
        let web = store.containers.get(&EntityId::from(1)).unwrap();
        assert_eq!(web.name, "web");
        assert!(web.is_favorite);
        assert!(store.containers.get(&EntityId::from(2)).is_none());
    }

    #[tokio::test]
    async fn poller_engages_on_failure_and_stops_on_recovery() {
        let (_server, rest) = backend(serde_json::json!([
            {"containerId": 5, "containerName": "cache"}
        ]))
        .await;
        let store = Arc::new(DataStore::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (active_tx, mut active_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(fallback_task(
            rest,
            Arc::clone(&store),
            state_rx,
            active_tx,
            Duration::from_millis(20),
            cancel.clone(),
        ));

        state_tx.send_replace(failed_state());
        active_rx.wait_for(|on| *on).await.unwrap();

        let mut snapshots = store.subscribe_last_snapshot();
        snapshots.wait_for(Option::is_some).await.unwrap();
        assert!(store.containers.get(&EntityId::from(5)).is_some());

        let mut recovered = failed_state();
        recovered.status = ConnectionStatus::Connected;
        recovered.retry_count = 0;
        recovered.connection_failed = false;
        state_tx.send_replace(recovered);
        active_rx.wait_for(|on| !*on).await.unwrap();

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn poller_failure_is_logged_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let rest = client(&server);

        let store = Arc::new(DataStore::new());
        let (_state_tx, state_rx) = watch::channel(failed_state());
        let (active_tx, mut active_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(fallback_task(
            rest,
            Arc::clone(&store),
            state_rx,
            active_tx,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        active_rx.wait_for(|on| *on).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert!(store.last_snapshot().is_none());

        cancel.cancel();
        task.await.unwrap();
        assert!(!*active_rx.borrow());
    }
}
