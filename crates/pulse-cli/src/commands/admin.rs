//! Backend health and first-run administrator bootstrap.

use super::{prompt, prompt_password, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use pulse_gateway::BootstrapAdminRequest;
use serde_json::{json, Value};

/// Probe the backend's health endpoint.
pub async fn health(ctx: &Context, format: &OutputFormat) -> Result<()> {
    let client = ctx.api_client();

    match client.health().await {
        Ok(body) => match format {
            OutputFormat::Text => {
                output::print_row("Backend", "ok");
                output::print_row("URL", client.host_url());
                if let Some(status) = body.get("status").and_then(Value::as_str) {
                    output::print_row("Status", status);
                }
            }
            OutputFormat::Json => output::print_json(&json!({
                "healthy": true,
                "url": client.host_url(),
                "response": body,
            })),
        },
        Err(e) => match format {
            OutputFormat::Text => {
                output::print_row("Backend", "unreachable");
                output::print_row("URL", client.host_url());
                output::print_row("Error", &e.to_string());
            }
            OutputFormat::Json => output::print_json(&json!({
                "healthy": false,
                "url": client.host_url(),
                "error": e.to_string(),
            })),
        },
    }
    Ok(())
}

/// Create the first administrator account.
pub async fn bootstrap_admin(ctx: &Context, format: &OutputFormat) -> Result<()> {
    let client = ctx.api_client();

    let status = client.governance_status().await?;
    if status.initialized {
        output::print_error("An administrator already exists", format);
        return Ok(());
    }

    let request = BootstrapAdminRequest {
        name: prompt("Name")?,
        email: prompt("Email")?,
        password: prompt_password("Password")?,
        confirm_password: prompt_password("Confirm password")?,
    };
    if let Err(e) = request.validate() {
        output::print_error(&e.to_string(), format);
        return Ok(());
    }

    match client.bootstrap_admin(&request).await {
        Ok(response) => output::print_success(
            &format!(
                "Administrator {} created. Sign in with 'quality-pulse login'.",
                response.user.email
            ),
            format,
        ),
        Err(e) => output::print_error(&format!("Bootstrap failed: {}", e), format),
    }
    Ok(())
}
