//! Named logger registry
//!
//! Loggers are `tracing` target namespaces (`open_manus::agent`, `reqwest`,
//! ...) arranged in a `::`-separated hierarchy with the root named `""`.
//! Each logger carries a level, a set of handlers and a propagate flag.
//!
//! Configuration is split in two layers:
//! - **base**: permanent settings made at startup or by anyone at runtime
//! - **engagements**: temporary overlays added by the isolation bridge
//!
//! The effective configuration is the base with every active overlay applied.
//! Overlays never write into the base, so removing one restores exactly what
//! the other parties see, regardless of how engagements interleave.
//!
//! No tracing macros may be called while a registry lock is held; the
//! routing layer takes the read lock for every event.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::Level;
use tracing::level_filters::LevelFilter;

use super::sink::LogSink;

/// Name of the root logger
pub const ROOT: &str = "";

/// Lowest level an engaged logger is raised to
pub const ENGAGED_LEVEL: LevelFilter = LevelFilter::INFO;

pub type HandlerId = u64;

/// Level, handlers and propagation of one logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// `None` inherits the parent's effective level
    pub level: Option<LevelFilter>,
    pub handlers: BTreeSet<HandlerId>,
    pub propagate: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: None,
            handlers: BTreeSet::new(),
            propagate: true,
        }
    }
}

/// Handler handed to an engagement
#[derive(Debug)]
pub(crate) enum Attachment {
    /// Existing handler attached by reference
    Shared(HandlerId),
    /// Handler created for this engagement; removed when it ends
    Owned(Arc<dyn LogSink>),
}

#[derive(Debug)]
struct Engagement {
    id: u64,
    names: BTreeSet<String>,
    attached: BTreeSet<HandlerId>,
    owned: Vec<HandlerId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_handler: HandlerId,
    next_engagement: u64,
    handlers: HashMap<HandlerId, Arc<dyn LogSink>>,
    loggers: BTreeMap<String, LoggerConfig>,
    engagements: Vec<Engagement>,
}

impl RegistryState {
    fn is_known(&self, name: &str) -> bool {
        name == ROOT
            || self.loggers.contains_key(name)
            || self.engagements.iter().any(|e| e.names.contains(name))
    }

    /// Closest configured logger for a target, falling back to root
    fn nearest<'a>(&self, target: &'a str) -> &'a str {
        let mut name = target;
        while !self.is_known(name) {
            name = parent(name).unwrap_or(ROOT);
        }
        name
    }

    fn effective(&self, name: &str) -> LoggerConfig {
        let mut config = self.loggers.get(name).cloned().unwrap_or_default();

        let overlays: Vec<&Engagement> = self
            .engagements
            .iter()
            .filter(|e| e.names.contains(name))
            .collect();

        if !overlays.is_empty() {
            let inherited = match config.level {
                Some(level) => level,
                None => self.parent_level(name),
            };
            config.level = Some(inherited.max(ENGAGED_LEVEL));
            config.propagate = true;
            for overlay in overlays {
                config.handlers.extend(overlay.attached.iter().copied());
            }
        }

        config.handlers.retain(|id| self.handlers.contains_key(id));
        config
    }

    fn effective_level(&self, name: &str) -> LevelFilter {
        match self.effective(name).level {
            Some(level) => level,
            None => self.parent_level(name),
        }
    }

    fn parent_level(&self, name: &str) -> LevelFilter {
        match parent(name) {
            Some(p) => self.effective_level(self.nearest(p)),
            None => LevelFilter::INFO,
        }
    }

    fn base_mut(&mut self, name: &str) -> &mut LoggerConfig {
        self.loggers.entry(name.to_string()).or_default()
    }

    fn insert_handler(&mut self, sink: Arc<dyn LogSink>) -> HandlerId {
        self.next_handler += 1;
        let id = self.next_handler;
        self.handlers.insert(id, sink);
        id
    }
}

/// Parent logger name, `None` for root
pub fn parent(name: &str) -> Option<&str> {
    if name == ROOT {
        return None;
    }
    Some(name.rsplit_once("::").map(|(p, _)| p).unwrap_or(ROOT))
}

/// Process-wide logger configuration shared by the routing layer and the
/// isolation bridge
#[derive(Debug)]
pub struct LoggerRegistry {
    state: RwLock<RegistryState>,
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerRegistry {
    /// Registry with a root logger at INFO and no handlers
    pub fn new() -> Self {
        let mut state = RegistryState::default();
        state.loggers.insert(
            ROOT.to_string(),
            LoggerConfig {
                level: Some(LevelFilter::INFO),
                handlers: BTreeSet::new(),
                propagate: false,
            },
        );
        Self {
            state: RwLock::new(state),
        }
    }

    // A panic while holding the lock leaves plain data behind; keep using it.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Permanent configuration
    // ========================================================================

    pub fn add_handler(&self, sink: Arc<dyn LogSink>) -> HandlerId {
        self.write().insert_handler(sink)
    }

    /// Remove a handler everywhere it is attached
    pub fn remove_handler(&self, id: HandlerId) -> Option<Arc<dyn LogSink>> {
        let mut state = self.write();
        for config in state.loggers.values_mut() {
            config.handlers.remove(&id);
        }
        for engagement in state.engagements.iter_mut() {
            engagement.attached.remove(&id);
        }
        state.handlers.remove(&id)
    }

    pub fn handler(&self, id: HandlerId) -> Option<Arc<dyn LogSink>> {
        self.read().handlers.get(&id).cloned()
    }

    pub fn set_level(&self, name: &str, level: Option<LevelFilter>) {
        self.write().base_mut(name).level = level;
    }

    pub fn set_propagate(&self, name: &str, propagate: bool) {
        self.write().base_mut(name).propagate = propagate;
    }

    pub fn attach(&self, name: &str, id: HandlerId) {
        self.write().base_mut(name).handlers.insert(id);
    }

    pub fn detach(&self, name: &str, id: HandlerId) {
        self.write().base_mut(name).handlers.remove(&id);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Effective configuration of a logger, engagements included
    pub fn config(&self, name: &str) -> LoggerConfig {
        self.read().effective(name)
    }

    pub fn effective_level(&self, name: &str) -> LevelFilter {
        let state = self.read();
        state.effective_level(state.nearest(name))
    }

    pub fn active_engagements(&self) -> usize {
        self.read().engagements.len()
    }

    /// Whether an event at `level` from `target` would be emitted anywhere
    pub fn enabled(&self, target: &str, level: &Level) -> bool {
        let state = self.read();
        *level <= state.effective_level(state.nearest(target))
    }

    /// Sinks an event from `target` at `level` must be written to
    ///
    /// The level is checked once at the originating logger. Handlers are then
    /// collected walking towards root while `propagate` holds; a destination
    /// reached twice is written once, through the most specific logger.
    pub fn route(&self, target: &str, level: &Level) -> Vec<Arc<dyn LogSink>> {
        let state = self.read();
        let origin = state.nearest(target);
        if *level > state.effective_level(origin) {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut sinks = Vec::new();
        let mut current = Some(origin);

        while let Some(name) = current {
            let config = state.effective(name);
            for id in &config.handlers {
                if let Some(sink) = state.handlers.get(id) {
                    if seen.insert(sink.destination().clone()) {
                        sinks.push(sink.clone());
                    }
                }
            }
            if !config.propagate {
                break;
            }
            current = parent(name).map(|p| state.nearest(p));
        }

        sinks
    }

    // ========================================================================
    // Engagements (driven by the isolation bridge)
    // ========================================================================

    /// Handlers attached directly to the root logger
    pub(crate) fn root_handlers(&self) -> Vec<(HandlerId, Arc<dyn LogSink>)> {
        let state = self.read();
        let Some(root) = state.loggers.get(ROOT) else {
            return Vec::new();
        };
        root.handlers
            .iter()
            .filter_map(|id| state.handlers.get(id).map(|s| (*id, s.clone())))
            .collect()
    }

    /// Capture the current view of `names`, then overlay them
    pub(crate) fn begin_engagement(
        &self,
        names: BTreeSet<String>,
        attachments: Vec<Attachment>,
    ) -> (u64, BTreeMap<String, LoggerConfig>) {
        let mut state = self.write();

        let captured = names
            .iter()
            .map(|name| (name.clone(), state.effective(name)))
            .collect();

        let mut attached = BTreeSet::new();
        let mut owned = Vec::new();
        for attachment in attachments {
            match attachment {
                Attachment::Shared(id) => {
                    attached.insert(id);
                }
                Attachment::Owned(sink) => {
                    let id = state.insert_handler(sink);
                    attached.insert(id);
                    owned.push(id);
                }
            }
        }

        state.next_engagement += 1;
        let id = state.next_engagement;
        state.engagements.push(Engagement {
            id,
            names,
            attached,
            owned,
        });

        (id, captured)
    }

    /// Drop an overlay; returns the handlers it owned, or `None` if it was
    /// already gone
    pub(crate) fn end_engagement(&self, id: u64) -> Option<Vec<Arc<dyn LogSink>>> {
        let mut state = self.write();
        let index = state.engagements.iter().position(|e| e.id == id)?;
        let engagement = state.engagements.remove(index);

        let owned = engagement
            .owned
            .iter()
            .filter_map(|hid| state.handlers.remove(hid))
            .collect();
        Some(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::sink::CaptureSink;

    fn capture(registry: &LoggerRegistry, name: &str) -> (HandlerId, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new(name));
        let id = registry.add_handler(sink.clone());
        (id, sink)
    }

    #[test]
    fn test_parent_names() {
        assert_eq!(parent("open_manus::agent::manus"), Some("open_manus::agent"));
        assert_eq!(parent("open_manus"), Some(ROOT));
        assert_eq!(parent(ROOT), None);
    }

    #[test]
    fn test_unconfigured_target_routes_to_root() {
        let registry = LoggerRegistry::new();
        let (id, _) = capture(&registry, "console");
        registry.attach(ROOT, id);

        let sinks = registry.route("askcfo::chat", &Level::INFO);
        assert_eq!(sinks.len(), 1);
        assert!(registry.route("askcfo::chat", &Level::DEBUG).is_empty());
    }

    #[test]
    fn test_level_inherited_from_parent() {
        let registry = LoggerRegistry::new();
        registry.set_level("open_manus", Some(LevelFilter::WARN));
        assert_eq!(registry.effective_level("open_manus::tool"), LevelFilter::WARN);
        assert!(!registry.enabled("open_manus::tool", &Level::INFO));
        assert!(registry.enabled("open_manus::tool", &Level::ERROR));
    }

    #[test]
    fn test_propagation_stops_when_disabled() {
        let registry = LoggerRegistry::new();
        let (root_id, root_sink) = capture(&registry, "root");
        let (agent_id, agent_sink) = capture(&registry, "agent");
        registry.attach(ROOT, root_id);
        registry.attach("open_manus", agent_id);
        registry.set_propagate("open_manus", false);

        let sinks = registry.route("open_manus::llm", &Level::INFO);
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].destination(), agent_sink.destination());
        assert_ne!(sinks[0].destination(), root_sink.destination());
    }

    #[test]
    fn test_same_destination_written_once() {
        let registry = LoggerRegistry::new();
        let (id, _) = capture(&registry, "console");
        registry.attach(ROOT, id);
        registry.attach("reqwest", id);

        assert_eq!(registry.route("reqwest::connect", &Level::WARN).len(), 1);
    }

    #[test]
    fn test_engagement_overlays_and_restores() {
        let registry = LoggerRegistry::new();
        let (id, _) = capture(&registry, "root");
        registry.attach(ROOT, id);
        registry.set_level("browser_use", Some(LevelFilter::ERROR));
        registry.set_propagate("browser_use", false);

        let before = registry.config("browser_use");
        let names = BTreeSet::from(["browser_use".to_string()]);
        let (eid, captured) = registry.begin_engagement(names, vec![Attachment::Shared(id)]);

        assert_eq!(captured["browser_use"], before);
        let during = registry.config("browser_use");
        assert_eq!(during.level, Some(LevelFilter::INFO));
        assert!(during.propagate);
        assert!(during.handlers.contains(&id));

        assert!(registry.end_engagement(eid).is_some());
        assert_eq!(registry.config("browser_use"), before);
        assert!(registry.end_engagement(eid).is_none());
    }

    #[test]
    fn test_removed_handler_disappears_from_views() {
        let registry = LoggerRegistry::new();
        let (id, _) = capture(&registry, "gone");
        registry.attach("open_manus", id);
        registry.remove_handler(id);
        assert!(registry.config("open_manus").handlers.is_empty());
    }
}
