//! Config subcommand handlers.

use std::fmt::Write as _;
use std::io::BufRead;

use fleetwatch_config::{self as cfg, Config, Profile};

use crate::cli::{ConfigAddArgs, ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking tokens.
fn format_config_redacted(config: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = config.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let d = &config.defaults;
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", d.output);
    let _ = writeln!(out, "color = \"{}\"", d.color);
    let _ = writeln!(out, "insecure = {}", d.insecure);
    let _ = writeln!(out, "timeout = {}", d.timeout);
    let _ = writeln!(out, "max_retry = {}", d.max_retry);
    let _ = writeln!(out, "polling_interval = {}", d.polling_interval);

    for name in config.profile_names() {
        let Some(p) = config.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "endpoint = \"{}\"", p.endpoint);
        if let Some(ref api) = p.api_base {
            let _ = writeln!(out, "api_base = \"{api}\"");
        }
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(max_retry) = p.max_retry {
            let _ = writeln!(out, "max_retry = {max_retry}");
        }
        if let Some(polling) = p.polling_interval {
            let _ = writeln!(out, "polling_interval = {polling}");
        }
        if let Some(heartbeat) = p.heartbeat {
            let _ = writeln!(out, "heartbeat = {heartbeat}");
        }
    }

    out
}

fn read_token_from_stdin() -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let token = line.trim().to_owned();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "empty token on stdin".into(),
        });
    }
    Ok(token)
}

fn add_profile(config: &mut Config, args: ConfigAddArgs) -> Result<(), CliError> {
    let endpoint = cfg::parse_endpoint(&args.endpoint)?;
    if let Some(ref api) = args.api_base {
        cfg::parse_api_base(api)?;
    }

    let profile = Profile {
        endpoint: endpoint.to_string(),
        api_base: args.api_base,
        token_env: args.token_env,
        max_retry: args.max_retry,
        polling_interval: args.polling_interval,
        ..Profile::default()
    };
    let first = config.profiles.is_empty();
    config.profiles.insert(args.name.clone(), profile);
    if args.default || first {
        config.default_profile = Some(args.name);
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let config = config::load(global)?;
            output::print_output(&format_config_redacted(&config), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let config = config::load(global)?;
            let active = config::active_profile_name(global, &config);
            let lines: Vec<String> = config
                .profile_names()
                .into_iter()
                .map(|name| {
                    if name == active {
                        format!("* {name}")
                    } else {
                        format!("  {name}")
                    }
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Add(args) => {
            let mut config = config::load(global)?;
            let name = args.name.clone();
            add_profile(&mut config, args)?;
            config::save(global, &config)?;
            eprintln!("Profile '{name}' saved to {}", config::config_path(global).display());
            Ok(())
        }

        ConfigCommand::Remove { name } => {
            let mut config = config::load(global)?;
            if config.profiles.remove(&name).is_none() {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: config.profile_names().join(", "),
                });
            }
            if config.default_profile.as_deref() == Some(name.as_str()) {
                let next = config.profile_names().first().map(|n| (*n).to_owned());
                config.default_profile = next;
            }
            config::save(global, &config)?;
            eprintln!("Profile '{name}' removed");
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut config = config::load(global)?;
            if !config.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: config.profile_names().join(", "),
                });
            }
            config.default_profile = Some(name.clone());
            config::save(global, &config)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetToken { value } => {
            let config = config::load(global)?;
            let name = config::active_profile_name(global, &config);
            let token = match value {
                Some(token) => token,
                None => read_token_from_stdin()?,
            };
            cfg::store_token(&name, &token)?;
            eprintln!("Token for '{name}' stored in system keyring");
            Ok(())
        }

        ConfigCommand::ClearToken => {
            let config = config::load(global)?;
            let name = config::active_profile_name(global, &config);
            if cfg::clear_token(&name)? {
                eprintln!("Token for '{name}' removed from system keyring");
            } else {
                eprintln!("No stored token for '{name}'");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn add_args(name: &str, url: &str) -> ConfigAddArgs {
        ConfigAddArgs {
            name: name.into(),
            endpoint: url.into(),
            api_base: None,
            token_env: None,
            max_retry: None,
            polling_interval: None,
            default: false,
        }
    }

    #[test]
    fn first_profile_becomes_default() {
        let mut config = Config {
            default_profile: None,
            ..Config::default()
        };
        add_profile(&mut config, add_args("lab", "ws://10.0.0.5/ws")).unwrap();
        add_profile(&mut config, add_args("prod", "wss://monitor.example/ws")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("lab"));
        assert_eq!(config.profile_names(), vec!["lab", "prod"]);
    }

    #[test]
    fn add_rejects_http_endpoint() {
        let mut config = Config::default();
        let err = add_profile(&mut config, add_args("lab", "http://10.0.0.5/ws")).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn redacted_output_masks_token() {
        let mut config = Config::default();
        config.profiles.insert(
            "prod".into(),
            Profile {
                endpoint: "wss://monitor.example/ws".into(),
                token: Some("secret-value".into()),
                ..Profile::default()
            },
        );
        let text = format_config_redacted(&config);
        assert!(text.contains("[profiles.prod]"));
        assert!(text.contains("token = \"****\""));
        assert!(!text.contains("secret-value"));
    }
}
