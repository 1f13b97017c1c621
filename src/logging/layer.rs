//! `tracing` layer that writes events through the logger registry

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::registry::LoggerRegistry;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formats each event once and hands the line to every sink the registry
/// routes it to
pub struct RoutingLayer {
    registry: Arc<LoggerRegistry>,
}

impl RoutingLayer {
    pub fn new(registry: Arc<LoggerRegistry>) -> Self {
        Self { registry }
    }
}

impl<S: Subscriber> Layer<S> for RoutingLayer {
    fn register_callsite(
        &self,
        _metadata: &'static Metadata<'static>,
    ) -> tracing::subscriber::Interest {
        // Levels change at runtime, so every callsite is re-evaluated
        tracing::subscriber::Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        !metadata.is_event() || self.registry.enabled(metadata.target(), metadata.level())
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let sinks = self.registry.route(metadata.target(), metadata.level());
        if sinks.is_empty() {
            return;
        }

        let line = format_line(event);
        for sink in sinks {
            // Nowhere left to report a failing log sink
            let _ = sink.write_line(&line);
        }
    }
}

/// `<time> - <target> - <LEVEL> - <message> <key=value ...>`
pub fn format_line(event: &Event<'_>) -> String {
    let metadata = event.metadata();
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);

    let mut line = format!(
        "{} - {} - {} - {}",
        Local::now().format(TIME_FORMAT),
        metadata.target(),
        metadata.level(),
        visitor.message
    );
    if !visitor.fields.is_empty() {
        line.push(' ');
        line.push_str(&visitor.fields);
    }
    line
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}
