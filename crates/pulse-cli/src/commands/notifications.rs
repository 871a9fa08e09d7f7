//! Notification commands.

use super::{require_signed_in, with_session, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use pulse_protocol_types::NotificationRecord;
use serde_json::json;

/// List notifications for the signed-in user.
pub async fn notifications_list(
    ctx: &Context,
    unread_only: bool,
    format: &OutputFormat,
) -> Result<()> {
    with_session(ctx, |session| async move {
        let Some(snapshot) = require_signed_in(&session, format).await? else {
            return Ok(());
        };

        let records: Vec<&NotificationRecord> = snapshot
            .notifications
            .iter()
            .filter(|n| !unread_only || !n.is_read)
            .collect();

        match format {
            OutputFormat::Json => output::print_json(&json!({
                "unread_count": snapshot.unread_count,
                "notifications": records,
            })),
            OutputFormat::Text => {
                output::print_heading(&format!(
                    "Notifications ({} unread)",
                    snapshot.unread_count
                ));
                if records.is_empty() {
                    println!("  No notifications");
                }
                for record in records {
                    println!("{}", output::notification_line(record));
                }
            }
        }
        Ok(())
    })
    .await
}

/// Mark one notification read, or all of them.
pub async fn notifications_read(
    ctx: &Context,
    id: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    with_session(ctx, |session| async move {
        if require_signed_in(&session, format).await?.is_none() {
            return Ok(());
        }

        match session.mark_notifications_read(id.as_deref()).await {
            Ok(snapshot) => {
                let message = match &id {
                    Some(id) => format!("Marked {} as read", id),
                    None => "Marked all notifications as read".to_string(),
                };
                output::print_success(
                    &format!("{} ({} unread)", message, snapshot.unread_count),
                    format,
                );
            }
            Err(e) => output::print_error(&format!("Failed to mark read: {}", e), format),
        }
        Ok(())
    })
    .await
}
