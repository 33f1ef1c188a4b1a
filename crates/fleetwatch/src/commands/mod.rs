//! Command dispatch: bridges CLI args -> live sync session -> output.

pub mod agents;
pub mod config_cmd;
pub mod containers;
pub mod status;
pub mod util;
pub mod whoami;

use fleetwatch_core::LiveSync;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, sync: &LiveSync, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Containers(args) => containers::handle(sync, args, global).await,
        Command::Agents(args) => agents::handle(sync, args, global).await,
        Command::Status(args) => status::handle(sync, &args, global).await,
        Command::Config(_) | Command::Whoami | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "handled before a session is opened".into(),
        }),
    }
}
