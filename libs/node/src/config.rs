use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings of a hosted node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the endpoint listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Route envelopes are POSTed to
    #[serde(default = "default_path")]
    pub path: String,

    /// Where database files live; in memory when absent
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deadline for one call into the engine
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_path() -> String {
    "/api/sqlite".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_call_timeout_ms() -> u64 {
    5000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
            data_dir: None,
            log_level: default_log_level(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: NodeConfig =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::Config(format!(
                "path must start with '/': {:?}",
                self.path
            )));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::Config(
                "call_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = NodeConfig::from_toml_str("data_dir = \"/var/lib/sheetwire\"").unwrap();
        assert_eq!(config.bind, "127.0.0.1:7878");
        assert_eq!(config.path, "/api/sqlite");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/sheetwire")));
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn relative_path_is_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("path = \"api\""),
            Err(Error::Config(_))
        ));
    }
}
