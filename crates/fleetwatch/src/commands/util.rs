//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use fleetwatch_core::{ConnectionState, EntityStream};

use crate::error::CliError;

/// How a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    Interrupted,
    LimitReached,
    Closed,
}

/// Render the current snapshot, then every change, until Ctrl-C, the
/// update limit, or the store going away.
pub async fn watch_loop<T>(
    mut stream: EntityStream<T>,
    limit: Option<usize>,
    mut render: impl FnMut(&[Arc<T>]) -> Result<(), CliError>,
) -> Result<WatchEnd, CliError>
where
    T: Clone + Send + Sync + 'static,
{
    render(stream.current().as_slice())?;

    let mut seen = 0usize;
    loop {
        if limit.is_some_and(|limit| seen >= limit) {
            return Ok(WatchEnd::LimitReached);
        }
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                return Ok(WatchEnd::Interrupted);
            }
            changed = stream.changed() => match changed {
                Some(snapshot) => {
                    seen += 1;
                    render(snapshot.as_slice())?;
                }
                None => return Ok(WatchEnd::Closed),
            },
        }
    }
}

/// Wait until the connection settles (connected, or failed for good).
pub async fn wait_settled(
    mut state: watch::Receiver<ConnectionState>,
    limit: Duration,
) -> Option<ConnectionState> {
    let settled = tokio::time::timeout(
        limit,
        state.wait_for(|s| s.is_connected() || s.connection_failed),
    )
    .await;
    match settled {
        Ok(Ok(state)) => Some(state.clone()),
        _ => None,
    }
}

/// "3s ago"-style age for timestamps.
pub fn age(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".into(),
        |at| {
            let elapsed = (Utc::now() - at).to_std().unwrap_or_default();
            let secs = Duration::from_secs(elapsed.as_secs());
            format!("{} ago", humantime::format_duration(secs))
        },
    )
}

pub fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".into()
    } else {
        value.to_owned()
    }
}
