//! Tracing setup and live log fan-out for `/ws/logs` subscribers

use std::fmt::Write as _;

use tokio::sync::broadcast;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Fans formatted log lines out to every connected log viewer.
///
/// Lagging viewers lose the oldest lines; the broker never waits on them.
#[derive(Clone)]
pub struct LogBroadcaster {
    tx: broadcast::Sender<String>,
}

impl LogBroadcaster {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Publish a line; returns how many viewers received it
    pub fn publish(&self, line: String) -> usize {
        self.tx.send(line).unwrap_or(0)
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Tracing layer feeding this broadcaster
    pub fn layer(&self) -> LogBroadcastLayer {
        LogBroadcastLayer {
            logs: self.clone(),
        }
    }
}

/// Tracing layer that renders each event as one line and broadcasts it
pub struct LogBroadcastLayer {
    logs: LogBroadcaster,
}

impl LogBroadcastLayer {
    fn level_to_str(level: &Level) -> &'static str {
        match *level {
            Level::TRACE => "TRACE",
            Level::DEBUG => "DEBUG",
            Level::INFO => "INFO",
            Level::WARN => "WARN",
            Level::ERROR => "ERROR",
        }
    }
}

impl<S> Layer<S> for LogBroadcastLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if self.logs.viewer_count() == 0 {
            return;
        }

        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut line = format!(
            "{} {}: {}",
            Self::level_to_str(metadata.level()),
            metadata.target(),
            visitor.message
        );
        if !visitor.fields.is_empty() {
            line.push(' ');
            line.push_str(&visitor.fields);
        }

        self.logs.publish(line);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: &str) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered;
            if self.message.starts_with('"') && self.message.ends_with('"') && self.message.len() >= 2 {
                self.message = self.message[1..self.message.len() - 1].to_string();
            }
        } else {
            self.push_field(field.name(), &rendered);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), value);
        }
    }
}

/// Install the global subscriber: stdout formatting plus the live log stream.
///
/// `RUST_LOG` refines the filter; the default level is INFO.
pub fn init_tracing(logs: &LogBroadcaster) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(logs.layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
}
