//! Authentication commands.

use super::{display_name, prompt, prompt_password, with_session, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use pulse_session::{SessionPhase, SessionSnapshot};
use serde_json::json;

fn summary(snapshot: &SessionSnapshot) -> serde_json::Value {
    let identity = snapshot.identity.as_ref();
    let email = match &snapshot.user {
        Some(user) => Some(user.email.clone()),
        None => identity.and_then(|i| i.email.clone()),
    };

    json!({
        "phase": snapshot.phase,
        "logged_in": identity.is_some(),
        "uid": identity.map(|i| i.uid.clone()),
        "email": email,
        "name": snapshot.user.as_ref().map(|u| u.name.clone()),
        "role": snapshot.role(),
        "dashboard": snapshot.dashboard_path(),
        "unread_count": snapshot.unread_count,
        "realtime_connected": snapshot.channel_open,
        "degraded_reason": snapshot.degraded_reason,
        "last_sync_error": snapshot.last_sync_error,
    })
}

/// Login with email and password.
pub async fn login(ctx: &Context, format: &OutputFormat) -> Result<()> {
    with_session(ctx, |session| async move {
        let snapshot = session.wait_settled().await?;

        if let Some(reason) = snapshot.degraded_reason.as_deref() {
            output::print_error(reason, format);
            return Ok(());
        }
        if snapshot.identity.is_some() {
            output::print_success(
                &format!("Already logged in as {}", display_name(&snapshot)),
                format,
            );
            return Ok(());
        }

        let email = prompt("Email")?;
        if email.is_empty() {
            output::print_error("Email is required", format);
            return Ok(());
        }

        let password = prompt_password("Password")?;
        if password.is_empty() {
            output::print_error("Password is required", format);
            return Ok(());
        }

        if *format == OutputFormat::Text {
            println!("Logging in...");
        }

        match session.login(&email, &password).await {
            Ok(snapshot) => match format {
                OutputFormat::Text => {
                    println!("Logged in as {}", display_name(&snapshot));
                    if let Some(path) = snapshot.dashboard_path() {
                        output::print_row("Dashboard", path);
                    }
                    output::print_row("Unread", &snapshot.unread_count.to_string());
                }
                OutputFormat::Json => output::print_json(&summary(&snapshot)),
            },
            Err(e) => output::print_error(&format!("Login failed: {}", e), format),
        }
        Ok(())
    })
    .await
}

/// Logout and clear the persisted session.
pub async fn logout(ctx: &Context, format: &OutputFormat) -> Result<()> {
    with_session(ctx, |session| async move {
        let snapshot = session.wait_settled().await?;
        if snapshot.phase != SessionPhase::Degraded && snapshot.identity.is_none() {
            output::print_success("Not logged in", format);
            return Ok(());
        }

        match session.logout().await {
            Ok(_) => output::print_success("Logged out successfully", format),
            Err(e) => output::print_error(&e.to_string(), format),
        }
        Ok(())
    })
    .await
}

/// Show session status.
pub async fn status(ctx: &Context, format: &OutputFormat) -> Result<()> {
    with_session(ctx, |session| async move {
        let snapshot = session.wait_settled().await?;

        match format {
            OutputFormat::Json => output::print_json(&summary(&snapshot)),
            OutputFormat::Text => {
                output::print_row("Session", &snapshot.phase.to_string());
                if let Some(reason) = &snapshot.degraded_reason {
                    output::print_row("Reason", reason);
                }
                if snapshot.identity.is_some() {
                    output::print_row("User", &display_name(&snapshot));
                    if let Some(role) = snapshot.role() {
                        let dashboard = role.dashboard_path().unwrap_or("-");
                        output::print_row("Role", &format!("{} ({})", role, dashboard));
                    }
                    output::print_row("Unread", &snapshot.unread_count.to_string());
                    let realtime = if snapshot.channel_open {
                        "connected"
                    } else {
                        "disconnected"
                    };
                    output::print_row("Realtime", realtime);
                }
                if let Some(error) = &snapshot.last_sync_error {
                    output::print_row("Last error", error);
                }
            }
        }
        Ok(())
    })
    .await
}
