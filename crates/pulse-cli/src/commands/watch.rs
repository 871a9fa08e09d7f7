//! Stream realtime notifications until interrupted.

use super::{display_name, require_signed_in, with_session, Context};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

/// Print notifications as they arrive until Ctrl-C or sign-out.
pub async fn watch(ctx: &Context, format: &OutputFormat) -> Result<()> {
    with_session(ctx, |session| async move {
        let Some(snapshot) = require_signed_in(&session, format).await? else {
            return Ok(());
        };

        let mut seen: HashSet<String> = snapshot
            .notifications
            .iter()
            .map(|n| n.id.clone())
            .collect();
        if *format == OutputFormat::Text {
            println!(
                "Watching notifications for {} ({} unread). Press Ctrl-C to stop.",
                display_name(&snapshot),
                snapshot.unread_count
            );
        }

        let mut updates = session.subscribe();
        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);

        loop {
            tokio::select! {
                _ = &mut interrupted => {
                    debug!("Watch interrupted");
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if snapshot.identity.is_none() {
                        output::print_error("Signed out", format);
                        break;
                    }

                    // Newest first in the list; print oldest new arrival first.
                    for record in snapshot.notifications.iter().rev() {
                        if !seen.insert(record.id.clone()) {
                            continue;
                        }
                        match format {
                            OutputFormat::Text => {
                                println!("{}", output::notification_line(record))
                            }
                            OutputFormat::Json => println!("{}", serde_json::to_string(record)?),
                        }
                    }
                }
            }
        }
        Ok(())
    })
    .await
}
