//! CLI command implementations.

mod admin;
mod auth;
mod notifications;
mod watch;

pub use admin::{bootstrap_admin, health};
pub use auth::{login, logout, status};
pub use notifications::{notifications_list, notifications_read};
pub use watch::watch;

use crate::output::{self, OutputFormat};
use anyhow::Result;
use pulse_config::{Config, Paths};
use pulse_gateway::ApiClient;
use pulse_identity::{FileSessionStore, FirebaseIdentityClient};
use pulse_realtime::{RealtimeConfig, SocketIoConnector};
use pulse_session::{SessionManager, SessionOptions, SessionPhase, SessionSnapshot};
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

/// Configuration and paths shared by every command.
pub struct Context {
    pub config: Config,
    pub paths: Paths,
}

impl Context {
    pub fn load() -> Result<Self> {
        let paths = Paths::new()?;
        let config = Config::load(&paths)?;
        Ok(Self { config, paths })
    }

    pub fn api_client(&self) -> ApiClient {
        ApiClient::new(self.config.api_base_url(), self.config.realtime_base_url())
    }

    /// Session wired to Firebase, the backend API and the Socket.IO server.
    pub fn session_manager(&self) -> SessionManager {
        let store = Arc::new(FileSessionStore::new(self.paths.identity_session_file()));
        let identity = Arc::new(FirebaseIdentityClient::new(&self.config.identity, store));
        let realtime = Arc::new(SocketIoConnector::new(RealtimeConfig::from_settings(
            self.config.realtime_base_url(),
            &self.config.realtime,
        )));

        SessionManager::with_options(
            identity,
            Arc::new(self.api_client()),
            realtime,
            SessionOptions::from(&self.config.session),
        )
    }
}

/// Initialize a session, run `command` against it, then shut it down.
async fn with_session<F, Fut>(ctx: &Context, command: F) -> Result<()>
where
    F: FnOnce(SessionManager) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let session = ctx.session_manager();
    session.init().await;

    let result = command(session.clone()).await;
    session.shutdown().await;
    result
}

/// Wait for the session to settle and report why it is unusable, if it is.
async fn require_signed_in(
    session: &SessionManager,
    format: &OutputFormat,
) -> Result<Option<SessionSnapshot>> {
    let snapshot = session.wait_settled().await?;

    match snapshot.phase {
        SessionPhase::Authenticated => Ok(Some(snapshot)),
        SessionPhase::Degraded => {
            let reason = snapshot.degraded_reason.as_deref().unwrap_or("Unavailable");
            output::print_error(reason, format);
            Ok(None)
        }
        _ => {
            output::print_error("Not logged in. Run 'quality-pulse login' first.", format);
            Ok(None)
        }
    }
}

/// Best display name for the signed-in user.
fn display_name(snapshot: &SessionSnapshot) -> String {
    if let Some(user) = snapshot.user.as_ref().filter(|u| !u.name.is_empty()) {
        return format!("{} <{}>", user.name, user.email);
    }
    snapshot
        .identity
        .as_ref()
        .map(|identity| identity.email.clone().unwrap_or_else(|| identity.uid.clone()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}
