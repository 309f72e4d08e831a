//! Node configuration management

use crate::usb::{RecoveryPolicy, SessionOptions, WorkerSettings};
use anyhow::{Context, Result, anyhow};
use protocol::ScaleCatalog;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub scale: ScaleSettings,
    #[serde(default)]
    pub publish: PublishSettings,
    /// Re-locating the scale after repeated transfer failures
    #[serde(default)]
    pub recovery: RecoverySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "NodeSettings::default_log_level")]
    pub log_level: String,
    /// Log raw and ignored reports, whatever `log_level` is
    #[serde(default)]
    pub verbose: bool,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            verbose: false,
        }
    }
}

impl NodeSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleSettings {
    /// 1-based ordinal among the distinct scales on the bus
    #[serde(default = "ScaleSettings::default_index")]
    pub index: usize,
    #[serde(default = "ScaleSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "ScaleSettings::default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
    /// Supported models as "0xVVVV:0xPPPP"
    #[serde(default)]
    pub catalog: ScaleCatalog,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            index: Self::default_index(),
            poll_interval_ms: Self::default_poll_interval(),
            transfer_timeout_ms: Self::default_transfer_timeout(),
            catalog: ScaleCatalog::default(),
        }
    }
}

impl ScaleSettings {
    fn default_index() -> usize {
        1
    }

    fn default_poll_interval() -> u64 {
        250
    }

    fn default_transfer_timeout() -> u64 {
        1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    #[serde(default = "PublishSettings::default_topic")]
    pub topic: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            topic: Self::default_topic(),
        }
    }
}

impl PublishSettings {
    fn default_topic() -> String {
        "/scale/weight".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "RecoverySettings::default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "RecoverySettings::default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "RecoverySettings::default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: Self::default_failure_threshold(),
            initial_backoff_ms: Self::default_initial_backoff(),
            max_backoff_ms: Self::default_max_backoff(),
        }
    }
}

impl RecoverySettings {
    fn default_failure_threshold() -> u32 {
        5
    }

    fn default_initial_backoff() -> u64 {
        1000
    }

    fn default_max_backoff() -> u64 {
        30_000
    }
}

impl NodeConfig {
    /// Load configuration from the specified path
    ///
    /// Without a path, the first existing file among the standard locations
    /// is loaded; it is an error if there is none.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => expand_path(&p),
            None => Self::find_existing(&Self::search_paths())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load the first existing standard config file, or the defaults if
    /// there is none
    ///
    /// A file that exists but does not parse or validate is an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load_first_or_default(&Self::search_paths())
    }

    fn load_first_or_default(candidates: &[PathBuf]) -> Result<Self> {
        match Self::find_existing(candidates) {
            Some(path) => Self::load(Some(path)),
            None => Ok(Self::default()),
        }
    }

    /// Standard config locations, in search order
    fn search_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/usbscale-node/node.toml"),
        ]
    }

    fn find_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = expand_path(path);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbscale-node").join("node.toml")
        } else {
            PathBuf::from(".config/usbscale-node/node.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.node.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.node.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.scale.index == 0 {
            return Err(anyhow!("Invalid scale index 0, scales are numbered from 1"));
        }
        if self.scale.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }
        if self.scale.transfer_timeout_ms == 0 {
            return Err(anyhow!("transfer_timeout_ms must be greater than 0"));
        }
        if self.scale.catalog.is_empty() {
            return Err(anyhow!("Scale catalog is empty, no device could ever match"));
        }

        if self.publish.topic.trim().is_empty() {
            return Err(anyhow!("Publish topic must not be empty"));
        }

        let recovery = &self.recovery;
        if recovery.failure_threshold == 0 {
            return Err(anyhow!("recovery.failure_threshold must be at least 1"));
        }
        if recovery.initial_backoff_ms > recovery.max_backoff_ms {
            return Err(anyhow!(
                "recovery.initial_backoff_ms ({}) exceeds recovery.max_backoff_ms ({})",
                recovery.initial_backoff_ms,
                recovery.max_backoff_ms
            ));
        }

        Ok(())
    }

    /// Tracing filter directive for this configuration
    ///
    /// `verbose` raises the session module to debug so ignored reports show
    /// up even at the default level.
    pub fn log_filter(&self) -> String {
        let level = self.node.log_level.as_str();
        if self.node.verbose && !matches!(level, "debug" | "trace") {
            format!("{},{}::usb::session=debug", level, env!("CARGO_CRATE_NAME"))
        } else {
            level.to_string()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            transfer_timeout: Duration::from_millis(self.scale.transfer_timeout_ms),
            verbose: self.node.verbose,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        let recovery = self.recovery.enabled.then(|| RecoveryPolicy {
            failure_threshold: self.recovery.failure_threshold,
            initial_backoff: Duration::from_millis(self.recovery.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.recovery.max_backoff_ms),
        });

        WorkerSettings {
            poll_interval: Duration::from_millis(self.scale.poll_interval_ms),
            session: self.session_options(),
            catalog: self.scale.catalog.clone(),
            index: self.scale.index,
            recovery,
        }
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
