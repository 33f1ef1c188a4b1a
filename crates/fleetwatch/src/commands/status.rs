//! `fleetwatch status`: connect, let the connection settle, report.

use serde::Serialize;

use fleetwatch_core::{ConnectionState, ErrorKind, LiveSync, should_use_fallback};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct StatusReport {
    endpoint: String,
    api_base: String,
    connection: ConnectionState,
    fallback: bool,
    containers: usize,
    agents: usize,
    last_snapshot: Option<chrono::DateTime<chrono::Utc>>,
    last_message: Option<chrono::DateTime<chrono::Utc>>,
    feeds: Vec<String>,
}

fn detail(report: &StatusReport, color: bool) -> String {
    let state = &report.connection;
    let mut lines = vec![
        format!("Endpoint:    {}", report.endpoint),
        format!("REST API:    {}", report.api_base),
        format!(
            "Connection:  {}",
            output::paint_connection(state.status, color)
        ),
        format!("Retries:     {}/{}", state.retry_count, state.max_retry),
        format!(
            "Mode:        {}",
            if report.fallback {
                "REST polling"
            } else {
                "streaming"
            }
        ),
        format!("Containers:  {}", report.containers),
        format!("Agents:      {}", report.agents),
        format!("Snapshot:    {}", util::age(report.last_snapshot)),
        format!("Last push:   {}", util::age(report.last_message)),
    ];
    if !report.feeds.is_empty() {
        lines.push(format!("Feeds:       {}", report.feeds.join(", ")));
    }
    if let Some(ref err) = state.last_error {
        lines.push(format!("Last error:  [{}] {}", err.kind, err.message));
    }
    lines.join("\n")
}

pub async fn handle(sync: &LiveSync, args: &StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    sync.start().await?;

    let settled = util::wait_settled(sync.connection().watch(), args.wait).await;
    let state = settled.unwrap_or_else(|| sync.connection_state());
    let store = sync.store();

    let report = StatusReport {
        endpoint: sync.config().endpoint.to_string(),
        api_base: sync.config().api_base.to_string(),
        fallback: should_use_fallback(&state),
        containers: store.containers.live_len(),
        agents: store.agents.len(),
        last_snapshot: store.last_snapshot(),
        last_message: store.last_message(),
        feeds: sync.feed_destinations(),
        connection: state,
    };

    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| detail(r, color),
        |r| r.connection.status.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    let state = &report.connection;
    if state.is_connected() {
        return Ok(());
    }
    if state
        .last_error
        .as_ref()
        .is_some_and(|e| e.kind == ErrorKind::Auth)
    {
        return Err(CliError::AuthFailed {
            profile: "current".into(),
        });
    }
    if report.fallback {
        return Err(CliError::StreamUnavailable {
            attempts: state.retry_count,
        });
    }
    Err(CliError::Timeout {
        seconds: args.wait.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_core::{ConnectionStatus, ErrorRecord};

    #[test]
    fn report_shows_last_error_and_mode() {
        let connection = ConnectionState {
            status: ConnectionStatus::Error,
            retry_count: 5,
            connection_failed: true,
            last_error: Some(ErrorRecord::new(ErrorKind::Connection, "refused")),
            ..ConnectionState::default()
        };

        let report = StatusReport {
            endpoint: "ws://localhost:8080/ws".into(),
            api_base: "http://localhost:8080/api/".into(),
            fallback: true,
            containers: 3,
            agents: 1,
            last_snapshot: None,
            last_message: None,
            feeds: vec!["/topic/agents".into()],
            connection,
        };
        let text = detail(&report, false);
        assert!(text.contains("5/5"));
        assert!(text.contains("REST polling"));
        assert!(text.contains("[connection] refused"));
        assert!(text.contains("never"));
    }
}
