//! Agent command handlers.

use std::sync::Arc;

use tabled::Tabled;

use fleetwatch_core::{AgentFilter, AgentRecord, LiveSync};

use crate::cli::{AgentFilterArgs, AgentWatchArgs, AgentsArgs, AgentsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct AgentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Registered")]
    created: String,
}

fn row(a: &Arc<AgentRecord>, color: bool) -> AgentRow {
    AgentRow {
        id: a.agent_id.to_string(),
        name: util::or_dash(&a.name),
        status: output::paint_agent_status(a.status, color),
        description: util::or_dash(&a.description),
        created: a
            .created_at
            .map_or_else(|| "-".into(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
    }
}

fn render(
    global: &GlobalOpts,
    snapshot: &[Arc<AgentRecord>],
    filter: &AgentFilter,
) -> Result<String, CliError> {
    let color = output::should_color(global.color);
    let data: Vec<Arc<AgentRecord>> = snapshot
        .iter()
        .filter(|a| filter.matches(a))
        .cloned()
        .collect();
    output::render_list(
        global.output,
        &data,
        |a| row(a, color),
        |a| a.agent_id.to_string(),
    )
}

pub async fn handle(sync: &LiveSync, args: AgentsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        AgentsCommand::List(filter) => list(sync, &filter, global).await,
        AgentsCommand::Watch(args) => watch(sync, &args, global).await,
    }
}

async fn list(sync: &LiveSync, filter: &AgentFilterArgs, global: &GlobalOpts) -> Result<(), CliError> {
    sync.load_snapshot().await?;
    let out = render(global, &sync.store().agents.agents(), &filter.filter())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn watch(sync: &LiveSync, args: &AgentWatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    sync.start().await?;

    let filter = args.filter.filter();
    let end = util::watch_loop(sync.store().agents.subscribe(), args.updates, |snapshot| {
        let out = render(global, snapshot, &filter)?;
        output::print_output(&out, global.quiet);
        Ok(())
    })
    .await?;

    tracing::debug!(?end, "agent watch finished");
    Ok(())
}
