//! Logging isolation bridge
//!
//! Lets the delegated agent's loggers reach the host's outputs for the
//! duration of one tool invocation. Engaging overlays the named loggers
//! (level raised to at least INFO, propagation on, root sinks attached) and
//! disengaging removes exactly that overlay.
//!
//! File sinks are never shared with the host: each engagement opens its own
//! append handle to the same path and closes it on disengage.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::registry::{Attachment, LoggerConfig, LoggerRegistry};

/// Prior configuration of the engaged loggers plus the engagement it belongs to
#[derive(Debug)]
pub struct LoggingSnapshot {
    engagement: u64,
    captured: BTreeMap<String, LoggerConfig>,
}

impl LoggingSnapshot {
    pub fn engagement(&self) -> u64 {
        self.engagement
    }

    /// Configuration each logger had right before `engage`
    pub fn captured(&self) -> &BTreeMap<String, LoggerConfig> {
        &self.captured
    }

    pub fn logger_names(&self) -> impl Iterator<Item = &str> {
        self.captured.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingBridge {
    registry: Arc<LoggerRegistry>,
}

impl LoggingBridge {
    pub fn new(registry: Arc<LoggerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<LoggerRegistry> {
        &self.registry
    }

    /// Route `names` into the root logger's sinks until `disengage`
    pub fn engage<I, S>(&self, names: I) -> LoggingSnapshot
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();

        // Open independent file handles before touching the registry lock
        let mut attachments = Vec::new();
        let mut failures = Vec::new();
        for (id, sink) in self.registry.root_handlers() {
            match sink.independent_handle() {
                Ok(Some(handle)) => attachments.push(Attachment::Owned(handle)),
                Ok(None) => attachments.push(Attachment::Shared(id)),
                Err(e) => failures.push((sink.destination().to_string(), e)),
            }
        }

        let (engagement, captured) = self.registry.begin_engagement(names, attachments);

        for (destination, e) in failures {
            warn!(%destination, error = %e, "Could not open log handle for delegated loggers");
        }
        debug!(engagement, loggers = captured.len(), "Logging bridge engaged");

        LoggingSnapshot {
            engagement,
            captured,
        }
    }

    /// Remove the overlay recorded in `snapshot`
    ///
    /// Calling it again, or after handlers were removed elsewhere, is a no-op.
    pub fn disengage(&self, snapshot: &LoggingSnapshot) {
        let Some(owned) = self.registry.end_engagement(snapshot.engagement) else {
            return;
        };

        for sink in owned {
            if let Err(e) = sink.flush() {
                warn!(destination = %sink.destination(), error = %e, "Failed to flush delegated log handle");
            }
        }
        debug!(engagement = snapshot.engagement, "Logging bridge disengaged");
    }

    /// Engage and return a guard that disengages when dropped
    pub fn scoped<I, S>(&self, names: I) -> BridgeGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let snapshot = self.engage(names);
        BridgeGuard {
            bridge: self.clone(),
            snapshot,
        }
    }
}

/// Keeps an engagement alive for its own lifetime
#[derive(Debug)]
pub struct BridgeGuard {
    bridge: LoggingBridge,
    snapshot: LoggingSnapshot,
}

impl BridgeGuard {
    pub fn snapshot(&self) -> &LoggingSnapshot {
        &self.snapshot
    }
}

impl Drop for BridgeGuard {
    fn drop(&mut self) {
        self.bridge.disengage(&self.snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::registry::ROOT;
    use crate::logging::sink::{CaptureSink, LogSink, RotatingFileSink};
    use tracing::Level;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_engage_attaches_root_sinks_and_restores() {
        let registry = Arc::new(LoggerRegistry::new());
        let console = Arc::new(CaptureSink::new("console"));
        let id = registry.add_handler(console.clone());
        registry.attach(ROOT, id);
        registry.set_level("open_manus", Some(LevelFilter::WARN));
        registry.set_propagate("open_manus", false);
        let before = registry.config("open_manus");

        let bridge = LoggingBridge::new(registry.clone());
        let snapshot = bridge.engage(["open_manus"]);

        assert_eq!(snapshot.captured()["open_manus"], before);
        assert!(registry.enabled("open_manus::agent", &Level::INFO));
        assert_eq!(registry.route("open_manus::agent", &Level::INFO).len(), 1);

        bridge.disengage(&snapshot);
        bridge.disengage(&snapshot);
        assert_eq!(registry.config("open_manus"), before);
        assert_eq!(registry.active_engagements(), 0);
    }

    #[test]
    fn test_file_sinks_get_independent_handles() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(LoggerRegistry::new());
        let main = Arc::new(RotatingFileSink::open(dir.path().join("main.log"), 1 << 20, 5).unwrap());
        let main_id = registry.add_handler(main.clone());
        registry.attach(ROOT, main_id);

        let bridge = LoggingBridge::new(registry.clone());
        let snapshot = bridge.engage(["browser_use"]);

        let during = registry.config("browser_use");
        assert_eq!(during.handlers.len(), 1);
        assert!(!during.handlers.contains(&main_id));

        let sinks = registry.route("browser_use", &Level::INFO);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].destination(), main.destination());

        bridge.disengage(&snapshot);
        assert!(registry.config("browser_use").handlers.is_empty());
    }

    #[test]
    fn test_guard_disengages_on_drop() {
        let registry = Arc::new(LoggerRegistry::new());
        let bridge = LoggingBridge::new(registry.clone());
        {
            let guard = bridge.scoped(["open_manus::tool"]);
            assert_eq!(guard.snapshot().logger_names().count(), 1);
            assert_eq!(registry.active_engagements(), 1);
        }
        assert_eq!(registry.active_engagements(), 0);
    }

    #[test]
    fn test_overlapping_engagements_restore_independently() {
        let registry = Arc::new(LoggerRegistry::new());
        registry.set_level("open_manus", Some(LevelFilter::ERROR));
        let before = registry.config("open_manus");
        let bridge = LoggingBridge::new(registry.clone());

        let first = bridge.engage(["open_manus"]);
        let second = bridge.engage(["open_manus"]);
        bridge.disengage(&first);
        assert_eq!(registry.config("open_manus").level, Some(LevelFilter::INFO));
        bridge.disengage(&second);
        assert_eq!(registry.config("open_manus"), before);
    }

    #[test]
    fn test_disengage_tolerates_removed_handler() {
        let registry = Arc::new(LoggerRegistry::new());
        let sink = Arc::new(CaptureSink::new("console"));
        let id = registry.add_handler(sink);
        registry.attach(ROOT, id);

        let bridge = LoggingBridge::new(registry.clone());
        let snapshot = bridge.engage(["open_manus"]);
        registry.remove_handler(id);
        bridge.disengage(&snapshot);
        assert_eq!(registry.config("open_manus"), LoggerConfig::default());
    }
}
