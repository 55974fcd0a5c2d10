use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_INGEST_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_ingest_secret_env")]
    pub ingest_secret_env: String,
    #[serde(default)]
    pub ingest_secret: Option<String>,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_report_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            interval_secs: default_report_interval_secs(),
            agent_id: None,
            max_processes: default_max_processes(),
            max_events: default_max_events(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.ingest_secret_env.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ingest_secret_env must not be empty".to_string(),
            ));
        }

        validate_agent(&self.agent)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_agent(cfg: &AgentConfig) -> Result<(), ConfigError> {
    if cfg.server_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.server_url must not be empty".to_string(),
        ));
    }
    if cfg.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "agent.interval_secs must be >= 1".to_string(),
        ));
    }
    if cfg.max_processes < 1 {
        return Err(ConfigError::Validation(
            "agent.max_processes must be >= 1".to_string(),
        ));
    }
    if cfg.max_events < 1 {
        return Err(ConfigError::Validation(
            "agent.max_events must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn default_ingest_secret_env() -> String {
    "INGEST_SECRET".to_string()
}

fn default_server_url() -> String {
    "http://127.0.0.1:3000/api/ingest".to_string()
}

const fn default_report_interval_secs() -> u64 {
    30
}

const fn default_max_processes() -> usize {
    15
}

const fn default_max_events() -> usize {
    20
}
