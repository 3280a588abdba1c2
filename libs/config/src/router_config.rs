//! Router Configuration Module
//!
//! Loads the router topology (workers, their producers and consumers,
//! channels) and logging setup from TOML with environment-specific
//! overrides.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::settings::{BrokerSettings, ChannelSettings, LoggingSettings, WorkerSettings};

/// Environment variable prefix, e.g. `SWITCHYARD_BROKER__WARN_NO_RECEIVERS`
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Complete router configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub broker: BrokerSettings,
    pub workers: Vec<WorkerSettings>,
    pub channels: Vec<ChannelSettings>,
    pub logging: LoggingSettings,
}

impl RouterConfig {
    /// Load configuration from files with environment overrides.
    ///
    /// `environments/<env>.toml` next to the base file is layered on top
    /// when present, then `SWITCHYARD_*` variables.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/router.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        if let Some(env) = environment {
            let env_file = base
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join("environments")
                .join(format!("{env}.toml"));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut router: RouterConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        router.expand_env_vars()?;
        router.validate()?;
        debug!(workers = router.workers.len(), channels = router.channels.len(), "Configuration loaded");
        Ok(router)
    }

    /// Parse an inline TOML document. No environment layering.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let router: RouterConfig = toml::from_str(text)?;
        router.validate()?;
        Ok(router)
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerSettings> {
        self.workers.iter().find(|w| w.name == name)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSettings> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Reject topologies that could never be wired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (index, worker) in self.workers.iter().enumerate() {
            if worker.name.trim().is_empty() {
                return Err(ConfigError::EmptyWorkerName { index });
            }
            if !names.insert(worker.name.as_str()) {
                return Err(ConfigError::DuplicateWorker(worker.name.clone()));
            }
        }

        for worker in &self.workers {
            let refs = worker
                .producers
                .iter()
                .map(|r| (r, "producer"))
                .chain(worker.consumers.iter().map(|r| (r, "consumer")));
            for (reference, role) in refs {
                if *reference == worker.name && !self.broker.allow_self_connect {
                    return Err(ConfigError::SelfReference { worker: worker.name.clone(), role });
                }
                if !names.contains(reference.as_str()) && !self.broker.allow_external_refs {
                    return Err(ConfigError::UnknownReference {
                        worker: worker.name.clone(),
                        reference: reference.clone(),
                        role,
                    });
                }
            }
        }

        let mut channels = HashSet::new();
        for channel in &self.channels {
            if !channels.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
        }
        Ok(())
    }

    /// Expand environment variables in journal paths.
    pub fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        for worker in &mut self.workers {
            if let Some(journal) = &mut worker.journal {
                journal.path = expand_path(&journal.path)?;
            }
        }
        Ok(())
    }

    /// `EnvFilter` directives giving each worker span its own level.
    pub fn logging_directives(&self) -> Vec<String> {
        let mut directives = self.logging.directives.clone();
        directives.extend(
            self.workers
                .iter()
                .map(|w| format!("[worker{{name={}}}]={}", w.name, w.log_level)),
        );
        directives
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::env(&raw).map_err(|e| ConfigError::Expand {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Convenience function to load configuration with defaults
pub fn load_config(environment: Option<&str>) -> Result<RouterConfig> {
    RouterConfig::load(None, environment)
}
