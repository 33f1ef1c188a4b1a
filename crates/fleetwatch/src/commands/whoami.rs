//! `fleetwatch whoami`: decode the configured token without contacting
//! the deployment.

use fleetwatch_core::{CurrentUser, decode_current_user};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

fn detail(user: &CurrentUser) -> String {
    let expiry = match user.expires_at {
        Some(at) if user.is_expired() => format!("{} (expired)", at.to_rfc3339()),
        Some(at) => at.to_rfc3339(),
        None => "-".into(),
    };
    [
        format!("ID:        {}", user.id),
        format!("Username:  {}", user.username),
        format!(
            "Role:      {}{}",
            if user.role.is_empty() { "-" } else { &user.role },
            if user.is_admin() { " (admin)" } else { "" }
        ),
        format!("Expires:   {expiry}"),
    ]
    .join("\n")
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (token, profile) = config::resolve_token(global)?;
    if token.is_none() {
        return Err(CliError::NoToken { profile });
    }
    let Some(user) = decode_current_user(token.as_ref()) else {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "not a decodable JWT".into(),
        });
    };

    let out = output::render_single(global.output, &user, detail, |u| u.username.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
