// src/config/mod.rs
// Runtime configuration: .env file, then environment variables, then defaults

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How tool directives are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Spawn the configured agent program per request
    Process,
    /// In-process stand-in that only logs the request
    Simulated,
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "simulated" | "mock" => Ok(Self::Simulated),
            other => Err(format!("unknown agent mode '{}'", other)),
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // ── Completion API
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,

    // ── Chat
    pub hide_tools: bool,
    pub stream_pacing_ms: u64,

    // ── Tool gateway
    pub tool_timeout_secs: u64,
    pub agent_mode: AgentMode,
    pub agent_program: String,
    pub agent_args: Vec<String>,
    pub agent_workdir: Option<PathBuf>,

    // ── Logging
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            eprintln!("Warning: .env file not found. Using environment variables and defaults.");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let agent_args: String = env_var_or(&lookup, "ASKCFO_AGENT_ARGS", "-m open_manus.run_prompt".to_string());
        let agent_workdir: String = env_var_or(&lookup, "ASKCFO_AGENT_WORKDIR", String::new());

        Self {
            api_key: env_var_or(&lookup, "DEEPSEEK_API_KEY", String::new()),
            base_url: env_var_or(&lookup, "ASKCFO_BASE_URL", "https://api.deepseek.com".to_string()),
            model: env_var_or(&lookup, "ASKCFO_MODEL", "deepseek-chat".to_string()),
            max_tokens: env_var_or(&lookup, "ASKCFO_MAX_TOKENS", 512),
            request_timeout_secs: env_var_or(&lookup, "ASKCFO_REQUEST_TIMEOUT", 30),
            hide_tools: env_var_or(&lookup, "ASKCFO_HIDE_TOOLS", false),
            stream_pacing_ms: env_var_or(&lookup, "ASKCFO_STREAM_PACING_MS", 50),
            tool_timeout_secs: env_var_or(&lookup, "ASKCFO_TOOL_TIMEOUT", 300),
            agent_mode: env_var_or(&lookup, "ASKCFO_AGENT_MODE", AgentMode::Process),
            agent_program: env_var_or(&lookup, "ASKCFO_AGENT_PROGRAM", "python".to_string()),
            agent_args: agent_args.split_whitespace().map(String::from).collect(),
            agent_workdir: (!agent_workdir.is_empty()).then(|| PathBuf::from(agent_workdir)),
            log_dir: PathBuf::from(env_var_or(&lookup, "ASKCFO_LOG_DIR", "log".to_string())),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.stream_pacing_ms)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

fn env_var_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => {
            // Trim whitespace and remove comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.tool_timeout(), Duration::from_secs(300));
        assert_eq!(config.stream_pacing(), Duration::from_millis(50));
        assert!(!config.hide_tools);
        assert_eq!(config.agent_mode, AgentMode::Process);
        assert_eq!(config.agent_args, vec!["-m", "open_manus.run_prompt"]);
        assert!(config.agent_workdir.is_none());
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_overrides_and_comments() {
        let config = config_from(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("ASKCFO_HIDE_TOOLS", "true  # strip tags"),
            ("ASKCFO_TOOL_TIMEOUT", "45"),
            ("ASKCFO_AGENT_MODE", "simulated"),
            ("ASKCFO_AGENT_WORKDIR", "/opt/manus"),
        ]);
        assert!(config.has_api_key());
        assert!(config.hide_tools);
        assert_eq!(config.tool_timeout_secs, 45);
        assert_eq!(config.agent_mode, AgentMode::Simulated);
        assert_eq!(config.agent_workdir, Some(PathBuf::from("/opt/manus")));
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        let config = config_from(&[("ASKCFO_MAX_TOKENS", "lots")]);
        assert_eq!(config.max_tokens, 512);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = config_from(&[("DEEPSEEK_API_KEY", "sk-secret")]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
