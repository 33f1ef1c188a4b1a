//! Container command handlers.

use std::sync::Arc;

use tabled::Tabled;

use fleetwatch_core::{ContainerDetail, ContainerFilter, ContainerRecord, EntityId, LiveSync};

use crate::cli::{
    ContainerFilterArgs, ContainerShowArgs, ContainerWatchArgs, ContainersArgs, ContainersCommand,
    GlobalOpts, OutputFormat,
};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "")]
    favorite: &'static str,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "CPU %")]
    cpu: String,
    #[tabled(rename = "Memory MB")]
    memory: String,
    #[tabled(rename = "Net kbps (rx/tx)")]
    network: String,
}

fn row(c: &Arc<ContainerRecord>, color: bool) -> ContainerRow {
    ContainerRow {
        favorite: if c.is_favorite { "*" } else { "" },
        id: c.container_id.to_string(),
        name: util::or_dash(&c.name),
        agent: util::or_dash(&c.agent_name),
        state: output::paint_state(c.state, color),
        health: output::paint_health(c.health, color),
        cpu: format!("{:.1}", c.cpu_percent),
        memory: format!("{:.0}/{:.0}", c.memory_used_mb, c.memory_limit_mb),
        network: format!("{:.1}/{:.1}", c.network_rx_kbps, c.network_tx_kbps),
    }
}

fn detail(d: &Arc<ContainerDetail>, color: bool) -> String {
    let c = &d.summary;
    let mut lines = vec![
        format!("ID:        {}", c.container_id),
        format!("Name:      {}", util::or_dash(&c.name)),
        format!("Agent:     {}", util::or_dash(&c.agent_name)),
        format!("Image:     {}", util::or_dash(&d.image)),
        format!("Command:   {}", util::or_dash(&d.command)),
        format!("State:     {}", output::paint_state(c.state, color)),
        format!("Health:    {}", output::paint_health(c.health, color)),
        format!("Restarts:  {}", d.restart_count),
        format!("CPU:       {:.1}%", c.cpu_percent),
        format!(
            "Memory:    {:.0} / {:.0} MB ({:.1}%)",
            c.memory_used_mb, c.memory_limit_mb, c.memory_percent
        ),
        format!(
            "Storage:   {:.2} / {:.2} GB",
            c.storage_used_gb, c.storage_limit_gb
        ),
        format!(
            "Network:   rx {:.1} kbps, tx {:.1} kbps",
            c.network_rx_kbps, c.network_tx_kbps
        ),
    ];
    if let Some(created) = d.created_at {
        lines.push(format!("Created:   {}", created.to_rfc3339()));
    }
    if !d.ports.is_empty() {
        lines.push(format!("Ports:     {}", d.ports.join(", ")));
    }
    for (key, value) in &d.labels {
        lines.push(format!("Label:     {key}={value}"));
    }
    lines.push(format!("Updated:   {}", util::age(c.last_updated)));
    lines.join("\n")
}

// ── Filtering ───────────────────────────────────────────────────────

fn select(
    snapshot: &[Arc<ContainerRecord>],
    filters: &[ContainerFilter],
) -> Vec<Arc<ContainerRecord>> {
    let mut selected: Vec<Arc<ContainerRecord>> = snapshot
        .iter()
        .filter(|c| filters.iter().all(|f| f.matches(c)))
        .cloned()
        .collect();
    // Favorites first, otherwise store order.
    selected.sort_by_key(|c| !c.is_favorite);
    selected
}

fn render(
    global: &GlobalOpts,
    snapshot: &[Arc<ContainerRecord>],
    filters: &[ContainerFilter],
) -> Result<String, CliError> {
    let color = output::should_color(global.color);
    let data = select(snapshot, filters);
    output::render_list(
        global.output,
        &data,
        |c| row(c, color),
        |c| c.container_id.to_string(),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    sync: &LiveSync,
    args: ContainersArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ContainersCommand::List(filter) => list(sync, &filter, global).await,
        ContainersCommand::Watch(args) => watch(sync, args, global).await,
        ContainersCommand::Show(args) => show(sync, args, global).await,
    }
}

async fn list(
    sync: &LiveSync,
    filter: &ContainerFilterArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let summary = sync.load_snapshot().await?;
    tracing::debug!(skipped = summary.skipped, "snapshot fetched");

    let snapshot = sync.store().containers.containers();
    let out = render(global, &snapshot, &filter.filters())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn watch(
    sync: &LiveSync,
    args: ContainerWatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    sync.start().await?;

    let containers = &sync.store().containers;
    for raw in &args.favorites {
        let id = EntityId::from(raw.as_str());
        if !containers.set_favorite(&id, true) {
            tracing::warn!(container = %id, "cannot pin unknown container");
        }
    }

    let filters = args.filter.filters();
    let end = util::watch_loop(containers.subscribe(), args.updates, |snapshot| {
        if global.output == OutputFormat::Table && !global.quiet {
            let state = sync.connection_state();
            let mode = if sync.fallback_active() {
                "polling"
            } else {
                "live"
            };
            println!(
                "\n{} containers · {} · {} · last update {}",
                snapshot.len(),
                output::paint_connection(state.status, output::should_color(global.color)),
                mode,
                util::age(
                    sync.store()
                        .last_message()
                        .or_else(|| sync.store().last_snapshot())
                ),
            );
        }
        let out = render(global, snapshot, &filters)?;
        output::print_output(&out, global.quiet);
        Ok(())
    })
    .await?;

    tracing::debug!(?end, "container watch finished");
    Ok(())
}

async fn show(
    sync: &LiveSync,
    args: ContainerShowArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = EntityId::from(args.id.as_str());
    sync.start().await?;
    sync.select_container(id.clone()).await?;

    let selected = &sync.store().selected;
    let color = output::should_color(global.color);
    let print = |d: &Arc<ContainerDetail>| -> Result<(), CliError> {
        let out = output::render_single(
            global.output,
            d,
            |d| detail(d, color),
            |d| d.id().to_string(),
        )?;
        output::print_output(&out, global.quiet);
        Ok(())
    };

    let Some(current) = selected.current() else {
        return Err(CliError::NotFound {
            resource_type: "container".into(),
            identifier: id.to_string(),
            list_command: "containers list".into(),
        });
    };
    print(&current)?;
    if !args.follow {
        return Ok(());
    }

    let mut updates = selected.subscribe();
    drop(updates.borrow_and_update());
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                match latest {
                    Some(d) => print(&d)?,
                    None => break,
                }
            }
        }
    }
    sync.deselect_container();
    Ok(())
}
