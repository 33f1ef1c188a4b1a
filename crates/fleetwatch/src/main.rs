mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleetwatch_core::LiveSync;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries rendered data; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config and identity commands never touch the network
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),
        Command::Whoami => commands::whoami::handle(&cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fleetwatch", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let (sync_config, profile) = config::build_sync_config(&cli.global)?;
            tracing::debug!(
                profile = %profile,
                endpoint = %sync_config.endpoint,
                api_base = %sync_config.api_base,
                "resolved deployment"
            );
            let sync = LiveSync::new(sync_config)?;

            let result = commands::dispatch(cmd, &sync, &cli.global).await;
            sync.shutdown().await;
            result.map_err(|e| match e {
                CliError::AuthFailed { .. } => CliError::AuthFailed { profile },
                other => other,
            })
        }
    }
}
