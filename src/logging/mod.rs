//! Logging
//!
//! Events are emitted with `tracing` and routed by a [`LoggerRegistry`]
//! installed as a `tracing_subscriber` layer. The registry models named
//! loggers with levels, sinks and propagation, which is what the
//! [`LoggingBridge`] temporarily rewires while the delegated agent runs.

pub mod bridge;
pub mod layer;
pub mod layout;
pub mod registry;
pub mod sink;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use bridge::{BridgeGuard, LoggingBridge, LoggingSnapshot};
pub use layer::RoutingLayer;
pub use layout::{AGENT_TARGETS, LogLayout};
pub use registry::{LoggerConfig, LoggerRegistry, ROOT};
pub use sink::{CaptureSink, ConsoleSink, FileSink, LogSink, RotatingFileSink, SinkDestination};

/// Create the log layout under `dir` and install the routing layer as the
/// global subscriber
pub fn init(dir: impl AsRef<Path>, debug: bool) -> Result<(Arc<LoggerRegistry>, LogLayout)> {
    let registry = Arc::new(LoggerRegistry::new());
    let layout = LogLayout::new(dir, Local::now());
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    layout.configure(&registry, level, layout::console())?;

    tracing_subscriber::registry()
        .with(RoutingLayer::new(registry.clone()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok((registry, layout))
}
