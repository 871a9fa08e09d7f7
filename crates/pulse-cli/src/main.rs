//! Quality Pulse CLI - sign in, read notifications and watch realtime pushes.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use pulse_config::{init_logging, parse_level};
use tracing::debug;

/// Quality Pulse CLI - Dashboard session and notifications from the terminal.
#[derive(Parser)]
#[command(name = "quality-pulse")]
#[command(about = "Quality Pulse CLI for authentication and notifications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "PULSE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login,

    /// Logout and clear the persisted session
    Logout,

    /// Show session status
    Status,

    /// Read and acknowledge notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Stream realtime notifications until Ctrl-C
    Watch,

    /// Check backend health
    Health,

    /// Create the first administrator account
    BootstrapAdmin,
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// List notifications
    List {
        /// Only show unread notifications
        #[arg(short, long)]
        unread: bool,
    },
    /// Mark a notification read, or all of them when no ID is given
    Read {
        /// Notification ID
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ctx = match commands::Context::load() {
        Ok(ctx) => ctx,
        Err(e) => {
            output::print_error(&format!("Failed to load configuration: {}", e), &cli.format);
            std::process::exit(1);
        }
    };

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(ctx.config.log_level.as_str());
    let level = match parse_level(level) {
        Ok(level) => level,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };
    init_logging("cli", level, &ctx.paths, false);
    debug!(api_url = %ctx.config.api_base_url(), "CLI started");

    let format = &cli.format;
    let result = match cli.command {
        Commands::Login => commands::login(&ctx, format).await,
        Commands::Logout => commands::logout(&ctx, format).await,
        Commands::Status => commands::status(&ctx, format).await,
        Commands::Notifications { command } => match command {
            NotificationCommands::List { unread } => {
                commands::notifications_list(&ctx, unread, format).await
            }
            NotificationCommands::Read { id } => {
                commands::notifications_read(&ctx, id, format).await
            }
        },
        Commands::Watch => commands::watch(&ctx, format).await,
        Commands::Health => commands::health(&ctx, format).await,
        Commands::BootstrapAdmin => commands::bootstrap_admin(&ctx, format).await,
    };

    if let Err(e) = result {
        output::print_error(&e.to_string(), format);
        std::process::exit(1);
    }
}
