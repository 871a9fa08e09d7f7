//! Terminal and JSON rendering for command results.

use chrono::Local;
use clap::ValueEnum;
use pulse_protocol_types::NotificationRecord;
use serde::Serialize;
use serde_json::json;

const MESSAGE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => print_json(&json!({"status": "success", "message": message})),
    }
}

/// Errors go to stderr in both formats so stdout stays parseable.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => eprintln!("{}", json!({"status": "error", "message": message})),
    }
}

pub fn print_row(label: &str, value: &str) {
    println!("  {:<12} {}", format!("{}:", label), value);
}

/// Heading underlined to its own width.
pub fn print_heading(text: &str) {
    println!("\n{}\n{}", text, "-".repeat(text.chars().count()));
}

/// One notification per line: unread marker, local time, id, message.
pub fn notification_line(record: &NotificationRecord) -> String {
    let marker = if record.is_read { ' ' } else { '*' };
    let when = record
        .created_at
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| format!("{:<16}", "-"));
    let message = record
        .message()
        .map(|m| truncate(m, MESSAGE_WIDTH))
        .unwrap_or_else(|| "(no message)".to_string());
    format!("{} {}  {:<24}  {}", marker, when, record.id, message)
}

fn truncate(text: &str, width: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= width {
        return single_line;
    }
    let kept: String = single_line.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}
