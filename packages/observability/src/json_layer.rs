//! JSONL layer.
//!
//! One object per event:
//!
//! ```text
//! {"ts":"2024-03-12T10:00:00.000000Z","level":"INFO","service":"cli","pid":4242,
//!  "target":"pulse_session::manager","scope":"login","msg":"Signed in","fields":{"uid":"u1"}}
//! ```
//!
//! Credential-bearing fields are replaced with [`REDACTED`] before the line is
//! written, whatever the caller passed.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Replacement value for sensitive fields.
pub const REDACTED: &str = "[redacted]";

/// Field names whose values never reach the log file.
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "id_token",
    "refresh_token",
    "authorization",
    "api_key",
];

fn is_sensitive(name: &str) -> bool {
    SENSITIVE_FIELDS.contains(&name) || name.ends_with("_token")
}

/// A single structured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    /// Span names from the root to the innermost span, joined with `>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub msg: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

#[derive(Default)]
struct FieldVisitor {
    msg: String,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.msg = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else if is_sensitive(name) {
            self.fields.insert(name.to_string(), Value::from(REDACTED));
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Layer that writes one [`LogEntry`] per event to `make_writer`.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let scope = ctx.event_scope(event).map(|scope| {
            scope
                .from_root()
                .map(|span| span.name())
                .collect::<Vec<_>>()
                .join(">")
        });

        let metadata = event.metadata();
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: self.service.clone(),
            pid: self.pid,
            target: metadata.target().to_string(),
            scope,
            msg: visitor.msg,
            fields: visitor.fields,
        };

        if let Ok(mut line) = serde_json::to_string(&entry) {
            line.push('\n');
            let mut writer = self.make_writer.make_writer();
            let _ = writer.write_all(line.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn lines(&self) -> Vec<Value> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let sink = Capture::default();
        let subscriber =
            tracing_subscriber::registry().with(JsonLayer::new("test", sink.clone()));
        tracing::subscriber::with_default(subscriber, f);
        sink.lines()
    }

    #[test]
    fn test_event_is_written_as_one_json_line() {
        let lines = capture(|| {
            tracing::info!(uid = "uid-ada", unread = 3u64, open = true, "Session synchronized");
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["service"], "test");
        assert_eq!(line["msg"], "Session synchronized");
        assert_eq!(line["fields"]["uid"], "uid-ada");
        assert_eq!(line["fields"]["unread"], 3);
        assert_eq!(line["fields"]["open"], true);
        assert!(line.get("scope").is_none());
    }

    #[test]
    fn test_credentials_are_redacted() {
        let lines = capture(|| {
            tracing::warn!(
                password = "hunter2",
                refresh_token = "1//refresh",
                session_token = "abc",
                email = "ada@example.com",
                "Sign-in rejected"
            );
        });

        let fields = &lines[0]["fields"];
        assert_eq!(fields["password"], REDACTED);
        assert_eq!(fields["refresh_token"], REDACTED);
        assert_eq!(fields["session_token"], REDACTED);
        assert_eq!(fields["email"], "ada@example.com");
    }

    #[test]
    fn test_scope_lists_spans_from_root() {
        let lines = capture(|| {
            let outer = tracing::info_span!("login");
            let _outer = outer.enter();
            let inner = tracing::info_span!("entry");
            let _inner = inner.enter();
            tracing::debug!("Profile loaded");
        });

        assert_eq!(lines[0]["scope"], "login>entry");
        assert_eq!(lines[0]["level"], "DEBUG");
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let entry = LogEntry {
            ts: "2024-03-12T10:00:00.000000Z".to_string(),
            level: "INFO",
            service: "cli".to_string(),
            pid: 1,
            target: "pulse_cli".to_string(),
            scope: None,
            msg: "CLI started".to_string(),
            fields: Map::new(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"fields\""));
        assert!(!json.contains("\"scope\""));
    }
}
