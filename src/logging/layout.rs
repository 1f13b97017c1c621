//! Startup log layout
//!
//! One main file per process start plus a secondary file for the delegated
//! agent's namespaces, both under the log directory and named after the
//! startup time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::level_filters::LevelFilter;

use super::registry::{LoggerRegistry, ROOT};
use super::sink::{ConsoleSink, LogSink, RotatingFileSink};

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_BACKUPS: usize = 5;

/// Library namespaces kept at INFO so their debug output stays quiet
pub const THIRD_PARTY_TARGETS: &[&str] = &["reqwest", "hyper", "tokio"];

/// Namespaces the delegated agent logs under
pub const AGENT_TARGETS: &[&str] = &[
    "open_manus",
    "open_manus::agent",
    "open_manus::tool",
    "open_manus::llm",
    "browser_use",
];

/// File names derived from one startup timestamp
#[derive(Debug, Clone)]
pub struct LogLayout {
    pub dir: PathBuf,
    pub main_file: PathBuf,
    pub agent_file: PathBuf,
}

impl LogLayout {
    pub fn new(dir: impl AsRef<Path>, started: DateTime<Local>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let stamp = started.format("%Y-%m-%d_%H-%M-%S").to_string();
        Self {
            main_file: dir.join(format!("{}.log", stamp)),
            agent_file: dir.join(format!("manus_{}.log", stamp)),
            dir,
        }
    }

    /// Build the logger tree for this layout
    ///
    /// Root gets console + main file at `root_level`; agent namespaces get
    /// the agent file + console and do not propagate.
    pub fn configure(
        &self,
        registry: &LoggerRegistry,
        root_level: LevelFilter,
        console: Arc<dyn LogSink>,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {}", self.dir.display()))?;

        let main = RotatingFileSink::open(&self.main_file, MAX_LOG_BYTES, LOG_BACKUPS)
            .with_context(|| format!("Failed to open {}", self.main_file.display()))?;
        let agent = RotatingFileSink::open(&self.agent_file, MAX_LOG_BYTES, LOG_BACKUPS)
            .with_context(|| format!("Failed to open {}", self.agent_file.display()))?;

        let console_id = registry.add_handler(console);
        let main_id = registry.add_handler(Arc::new(main));
        let agent_id = registry.add_handler(Arc::new(agent));

        registry.set_level(ROOT, Some(root_level));
        registry.attach(ROOT, console_id);
        registry.attach(ROOT, main_id);

        for target in THIRD_PARTY_TARGETS {
            registry.set_level(target, Some(LevelFilter::INFO));
            registry.set_propagate(target, true);
        }

        for target in AGENT_TARGETS {
            registry.set_level(target, Some(LevelFilter::INFO));
            registry.attach(target, agent_id);
            registry.attach(target, console_id);
            registry.set_propagate(target, false);
        }

        Ok(())
    }
}

/// Default console sink
pub fn console() -> Arc<dyn LogSink> {
    Arc::new(ConsoleSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::sink::CaptureSink;
    use chrono::TimeZone;
    use tracing::Level;

    #[test]
    fn test_file_names_follow_start_time() {
        let started = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let layout = LogLayout::new("log", started);
        assert_eq!(layout.main_file, PathBuf::from("log/2025-03-09_14-05-07.log"));
        assert_eq!(layout.agent_file, PathBuf::from("log/manus_2025-03-09_14-05-07.log"));
    }

    #[test]
    fn test_agent_namespaces_stay_out_of_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path(), Local::now());
        let registry = LoggerRegistry::new();
        let console = Arc::new(CaptureSink::new("console"));
        layout.configure(&registry, LevelFilter::INFO, console).unwrap();

        let agent_dests: Vec<_> = registry
            .route("open_manus::agent::manus", &Level::INFO)
            .iter()
            .map(|s| s.destination().clone())
            .collect();
        assert_eq!(agent_dests.len(), 2);
        assert!(agent_dests.iter().all(|d| d.to_string() != format!("file:{}", layout.main_file.display())));

        let host = registry.route("askcfo::chat", &Level::INFO);
        assert_eq!(host.len(), 2);
        assert!(registry.route("reqwest::connect", &Level::DEBUG).is_empty());
    }

    #[test]
    fn test_debug_root_level() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path(), Local::now());
        let registry = LoggerRegistry::new();
        layout
            .configure(&registry, LevelFilter::DEBUG, Arc::new(CaptureSink::new("c")))
            .unwrap();
        assert!(registry.enabled("askcfo", &Level::DEBUG));
        assert!(!registry.enabled("hyper::proto", &Level::DEBUG));
    }
}
