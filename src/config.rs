use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::ReconnectPolicy;
use crate::types::StaleFieldPolicy;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "PC_FLEET_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            path: "/ws/admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectPolicy,
    pub web_port: u16,
    pub stale_field_policy: StaleFieldPolicy,

    pub ingress_capacity: usize,
    pub command_capacity: usize,
    pub activity_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            reconnect: ReconnectPolicy::default(),
            web_port: 8080,
            stale_field_policy: StaleFieldPolicy::default(),

            ingress_capacity: 1024,
            command_capacity: 32,
            activity_limit: 10,
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is missing
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = match fs::read_to_string(path) {
            Ok(config_str) => config_str,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using default configuration");
                return Ok(AppConfig::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };

        let config: AppConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Path from `PC_FLEET_CONFIG`, or `config.json`
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/', got {:?}", self.server.path);
        }
        if self.reconnect.initial_delay_ms == 0 {
            bail!("reconnect.initial_delay_ms must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            bail!("reconnect.jitter must be within 0.0..=1.0, got {}", self.reconnect.jitter);
        }
        if self.reconnect.multiplier < 1.0 {
            bail!("reconnect.multiplier must be at least 1.0, got {}", self.reconnect.multiplier);
        }
        Ok(())
    }

    /// Admin WebSocket endpoint, e.g. `ws://localhost:8000/ws/admin`
    pub fn endpoint_url(&self) -> String {
        format!("ws://{}:{}{}", self.server.host, self.server.port, self.server.path)
    }
}
