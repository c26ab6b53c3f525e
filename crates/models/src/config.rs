use serde::{Deserialize, Serialize};

use crate::error::SkiffError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub docker: DockerConfig,
    pub build: BuildConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub max_context_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub wait_timeout_ms: u64,
    pub stop_grace_secs: u64,
    pub remove_after_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker: DockerConfig {
                host: "".to_string(),
            },
            build: BuildConfig { max_context_mb: 512 },
            run: RunConfig {
                wait_timeout_ms: 300_000,
                stop_grace_secs: 10,
                remove_after_exit: true,
            },
        }
    }
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, SkiffError> {
        let raw = std::fs::read_to_string(config_path).map_err(|e| SkiffError::ConfigError {
            reason: format!("{config_path}: {e}"),
        })?;
        let config: Config = toml::from_str(&raw).map_err(|e| SkiffError::ConfigError {
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    pub fn max_context_bytes(&self) -> u64 {
        self.build.max_context_mb * 1024 * 1024
    }
}
