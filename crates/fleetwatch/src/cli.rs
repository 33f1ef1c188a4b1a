//! Clap derive structures for the `fleetwatch` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fleetwatch_core::{AgentFilter, ContainerFilter, ContainerState, HealthStatus};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetwatch -- live container and agent monitoring from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "fleetwatch",
    version,
    about = "Watch containers and agents of a fleetwatch deployment",
    long_about = "Streams container and agent state over the deployment's STOMP\n\
        WebSocket feed, falling back to REST polling when the stream is down.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Deployment profile to use
    #[arg(long, short = 'p', env = "FLEETWATCH_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "FLEETWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Broker WebSocket URL (overrides profile)
    #[arg(long, short = 'e', env = "FLEETWATCH_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// REST API base URL (overrides profile)
    #[arg(long, env = "FLEETWATCH_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// Bearer token
    #[arg(long, env = "FLEETWATCH_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETWATCH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates on the REST API
    #[arg(long, short = 'k', env = "FLEETWATCH_INSECURE", global = true)]
    pub insecure: bool,

    /// REST request timeout in seconds
    #[arg(long, env = "FLEETWATCH_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one document per update when watching)
    JsonCompact,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List, watch and inspect containers
    #[command(alias = "ct", alias = "c")]
    Containers(ContainersArgs),

    /// List and watch monitoring agents
    #[command(alias = "ag", alias = "a")]
    Agents(AgentsArgs),

    /// Connect to the broker and report connection health
    Status(StatusArgs),

    /// Show the identity carried by the configured token
    Whoami,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Containers ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ContainersArgs {
    #[command(subcommand)]
    pub command: ContainersCommand,
}

#[derive(Debug, Subcommand)]
pub enum ContainersCommand {
    /// One-shot REST snapshot
    #[command(alias = "ls")]
    List(ContainerFilterArgs),

    /// Stream live updates until interrupted
    Watch(ContainerWatchArgs),

    /// Show one container's detail
    Show(ContainerShowArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateArg {
    Running,
    Created,
    Restarting,
    Paused,
    Exited,
    Dead,
    Removing,
    Unknown,
}

impl From<StateArg> for ContainerState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Running => Self::Running,
            StateArg::Created => Self::Created,
            StateArg::Restarting => Self::Restarting,
            StateArg::Paused => Self::Paused,
            StateArg::Exited => Self::Exited,
            StateArg::Dead => Self::Dead,
            StateArg::Removing => Self::Removing,
            StateArg::Unknown => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HealthArg {
    Healthy,
    Unhealthy,
    Starting,
    None,
    Unknown,
}

impl From<HealthArg> for HealthStatus {
    fn from(arg: HealthArg) -> Self {
        match arg {
            HealthArg::Healthy => Self::Healthy,
            HealthArg::Unhealthy => Self::Unhealthy,
            HealthArg::Starting => Self::Starting,
            HealthArg::None => Self::Unchecked,
            HealthArg::Unknown => Self::Unknown,
        }
    }
}

/// Narrowing flags shared by `containers list` and `containers watch`.
#[derive(Debug, Clone, Default, Args)]
pub struct ContainerFilterArgs {
    /// Only containers in this lifecycle state
    #[arg(long, short = 's')]
    pub state: Option<StateArg>,

    /// Only containers with this health
    #[arg(long)]
    pub health: Option<HealthArg>,

    /// Only containers on this agent (by name)
    #[arg(long)]
    pub agent: Option<String>,

    /// Case-insensitive name substring
    #[arg(long, short = 'n')]
    pub name: Option<String>,
}

impl ContainerFilterArgs {
    /// Every set flag must match.
    pub fn filters(&self) -> Vec<ContainerFilter> {
        let mut filters = Vec::new();
        if let Some(state) = self.state {
            filters.push(ContainerFilter::ByState(state.into()));
        }
        if let Some(health) = self.health {
            filters.push(ContainerFilter::ByHealth(health.into()));
        }
        if let Some(ref agent) = self.agent {
            filters.push(ContainerFilter::ByAgent(agent.clone()));
        }
        if let Some(ref name) = self.name {
            filters.push(ContainerFilter::NameContains(name.clone()));
        }
        filters
    }
}

#[derive(Debug, Args)]
pub struct ContainerWatchArgs {
    #[command(flatten)]
    pub filter: ContainerFilterArgs,

    /// Containers to pin as favorites (listed first)
    #[arg(long = "favorite", value_name = "ID")]
    pub favorites: Vec<String>,

    /// Exit after this many updates
    #[arg(long, value_name = "N")]
    pub updates: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ContainerShowArgs {
    /// Container id
    pub id: String,

    /// Keep printing the detail as it changes
    #[arg(long, short = 'f')]
    pub follow: bool,
}

// ── Agents ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AgentsArgs {
    #[command(subcommand)]
    pub command: AgentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AgentsCommand {
    /// One-shot REST snapshot
    #[command(alias = "ls")]
    List(AgentFilterArgs),

    /// Stream live updates until interrupted
    Watch(AgentWatchArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AgentStatusArg {
    Online,
    Offline,
}

#[derive(Debug, Clone, Default, Args)]
pub struct AgentFilterArgs {
    /// Only agents with this status
    #[arg(long)]
    pub status: Option<AgentStatusArg>,
}

impl AgentFilterArgs {
    pub fn filter(&self) -> AgentFilter {
        match self.status {
            Some(AgentStatusArg::Online) => AgentFilter::Online,
            Some(AgentStatusArg::Offline) => AgentFilter::Offline,
            None => AgentFilter::All,
        }
    }
}

#[derive(Debug, Args)]
pub struct AgentWatchArgs {
    #[command(flatten)]
    pub filter: AgentFilterArgs,

    /// Exit after this many updates
    #[arg(long, value_name = "N")]
    pub updates: Option<usize>,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// How long to wait for the connection to settle (e.g. "5s", "1m")
    #[arg(long, short = 'w', default_value = "5s", value_parser = humantime::parse_duration)]
    pub wait: Duration,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective config (tokens masked)
    Show,

    /// List profile names
    Profiles,

    /// Add or replace a profile
    Add(ConfigAddArgs),

    /// Delete a profile
    Remove {
        /// Profile name
        name: String,
    },

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },

    /// Store a token in the system keyring for the active profile
    SetToken {
        /// Token value (read from stdin when omitted)
        #[arg(long)]
        value: Option<String>,
    },

    /// Remove the active profile's token from the system keyring
    ClearToken,
}

#[derive(Debug, Args)]
pub struct ConfigAddArgs {
    /// Profile name
    pub name: String,

    /// Broker WebSocket URL (ws:// or wss://)
    #[arg(long = "url", value_name = "URL")]
    pub endpoint: String,

    /// REST API base URL (derived from the broker URL when omitted)
    #[arg(long = "api", value_name = "URL")]
    pub api_base: Option<String>,

    /// Env var holding the token
    #[arg(long)]
    pub token_env: Option<String>,

    /// Failed connects before falling back to polling
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Fallback polling interval in seconds
    #[arg(long)]
    pub polling_interval: Option<u64>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
