//! Flag-aware wrappers over `fleetwatch-config`.
//!
//! The single boundary where CLI flags, profiles and environment are folded
//! into a core `SyncConfig`.

use secrecy::SecretString;

use fleetwatch_config::{self as cfg, Config, Profile};
use fleetwatch_core::SyncConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file honoring `--config`.
pub fn config_path(global: &GlobalOpts) -> std::path::PathBuf {
    global.config.clone().unwrap_or_else(cfg::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(cfg::load_config_from(&config_path(global))?)
}

pub fn save(global: &GlobalOpts, config: &Config) -> Result<(), CliError> {
    cfg::save_config_to(config, &config_path(global))?;
    Ok(())
}

/// Resolve the active profile name from flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// The profile to use, with endpoint/TLS/timeout flags laid over it.
///
/// With no matching profile, `--endpoint` alone is enough.
pub fn effective_profile(global: &GlobalOpts, config: &Config) -> Result<Profile, CliError> {
    let name = active_profile_name(global, config);

    let mut profile = match (config.profiles.get(&name), global.endpoint.as_ref()) {
        (Some(profile), _) => profile.clone(),
        (None, Some(_)) => Profile::default(),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available(config),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path(global).display().to_string(),
            });
        }
    };

    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if global.api_base.is_some() {
        profile.api_base.clone_from(&global.api_base);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
    Ok(profile)
}

/// Build the core `SyncConfig`: flag > env > keyring > profile.
pub fn build_sync_config(global: &GlobalOpts) -> Result<(SyncConfig, String), CliError> {
    let config = load(global)?;
    let name = active_profile_name(global, &config);
    let profile = effective_profile(global, &config)?;

    let mut sync = cfg::profile_to_sync_config(&profile, &name, &config.defaults)?;
    if let Some(ref token) = global.token {
        sync.token = Some(SecretString::from(token.clone()));
    }
    Ok((sync, name))
}

/// Resolve just the token, for commands that never connect.
pub fn resolve_token(global: &GlobalOpts) -> Result<(Option<SecretString>, String), CliError> {
    if let Some(ref token) = global.token {
        let name = global.profile.clone().unwrap_or_else(|| "default".into());
        return Ok((Some(SecretString::from(token.clone())), name));
    }
    let config = load(global)?;
    let name = active_profile_name(global, &config);
    let token = config
        .profiles
        .get(&name)
        .map_or_else(
            || cfg::resolve_token(&Profile::default(), &name),
            |profile| cfg::resolve_token(profile, &name),
        );
    Ok((token, name))
}

fn available(config: &Config) -> String {
    let names = config.profile_names();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}
