use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SatchelConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub shell: ShellConfig,
}

/// Which blob backend to use. `Auto` probes the database first and falls
/// back to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackendKind {
    Auto,
    Database,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the database, metadata sidecar and blob files.
    /// Platform default when unset.
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_backend")]
    pub backend: BlobBackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Whole-transfer timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How often the flush worker polls the queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum replay attempts before an item is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Base delay for exponential backoff.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,

    /// Maximum backoff delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Synced queue rows older than this are deleted.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_after_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Probe interval for the connectivity monitor.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Named cache version; bumping it on deploy invalidates old caches.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Shell assets pre-populated at install time.
    #[serde(default)]
    pub shell_assets: Vec<String>,

    /// Cached fallback for failed navigations.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// URL prefixes identifying backend API calls (never cached).
    #[serde(default)]
    pub api_prefixes: Vec<String>,
}

impl SatchelConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            debug!("Loading config from {:?}", config_path);
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: SatchelConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            info!("Config loaded successfully");
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = SatchelConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("satchel").join("config.toml"))
    }

    /// Resolve the data directory, using the platform default when unset.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage.data_dir {
            Ok(dir.clone())
        } else {
            let data_dir = dirs::data_dir().context("Failed to get data directory")?;
            Ok(data_dir.join("satchel"))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(anyhow::anyhow!(
                "max_concurrent_downloads must be greater than 0"
            ));
        }

        if self.download.timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeout_secs must be greater than 0"));
        }

        if self.sync.max_attempts <= 0 {
            return Err(anyhow::anyhow!("max_attempts must be greater than 0"));
        }

        if self.sync.base_backoff_secs > self.sync.max_backoff_secs {
            return Err(anyhow::anyhow!(
                "base_backoff_secs must not exceed max_backoff_secs"
            ));
        }

        if self.remote.probe_interval_secs == 0 {
            return Err(anyhow::anyhow!("probe_interval_secs must be greater than 0"));
        }

        if self.shell.cache_name.is_empty() {
            return Err(anyhow::anyhow!("cache_name must not be empty"));
        }

        Ok(())
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            backend: default_backend(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
            max_concurrent_downloads: default_max_concurrent(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            cleanup_after_days: default_cleanup_days(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            shell_assets: Vec::new(),
            entry_point: default_entry_point(),
            api_prefixes: Vec::new(),
        }
    }
}

// Default value functions
fn default_backend() -> BlobBackendKind {
    BlobBackendKind::Auto
}
fn default_download_timeout() -> u64 {
    300
}
fn default_max_concurrent() -> u32 {
    3
}
fn default_poll_interval() -> u64 {
    30
}
fn default_max_attempts() -> i32 {
    5
}
fn default_base_backoff() -> u64 {
    1
}
fn default_max_backoff() -> u64 {
    60
}
fn default_cleanup_days() -> i64 {
    7
}
fn default_cache_name() -> String {
    "satchel-shell-v1".to_string()
}
fn default_entry_point() -> String {
    "/index.html".to_string()
}
fn default_probe_interval() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SatchelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.download.max_concurrent_downloads, 3);
        assert_eq!(config.sync.max_attempts, 5);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = SatchelConfig::default();
        config.download.max_concurrent_downloads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = SatchelConfig::default();
        config.sync.base_backoff_secs = 120;
        config.sync.max_backoff_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SatchelConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: SatchelConfig = toml::from_str(&toml).unwrap();
        assert_eq!(
            parsed.download.timeout_secs,
            config.download.timeout_secs
        );
        assert_eq!(parsed.shell.cache_name, config.shell.cache_name);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: SatchelConfig = toml::from_str("[sync]\nmax_attempts = 3\n").unwrap();
        assert_eq!(parsed.sync.max_attempts, 3);
        assert_eq!(parsed.sync.poll_interval_secs, default_poll_interval());
        assert_eq!(parsed.storage.backend, BlobBackendKind::Auto);
    }
}
