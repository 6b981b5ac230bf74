use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::profile::Role;

/// Environment variable that overrides the configuration directory
pub const HOME_ENV: &str = "DB_CLONE_SYNC_HOME";

const APP_DIR: &str = "db-clone-sync";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - `$DB_CLONE_SYNC_HOME` when set
    /// - Linux: $XDG_CONFIG_HOME/db-clone-sync or ~/.config/db-clone-sync
    /// - macOS: ~/Library/Application Support/db-clone-sync
    /// - Windows: %APPDATA%\db-clone-sync
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.is_empty() {
                return Ok(PathBuf::from(home));
            }
        }

        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join(APP_DIR))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join(APP_DIR))
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            Ok(dirs::config_dir()
                .context("Failed to get platform config directory")?
                .join(APP_DIR))
        }
    }

    /// Get the settings file path (config.toml)
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the persisted profile path for a role
    pub fn profile_path(role: Role) -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(format!("{}-connection.toml", role.as_str())))
    }

    /// Get the operation log path
    pub fn operation_log_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("operations.log"))
    }

    /// Get the bidirectional sync baseline path
    pub fn sync_state_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("sync-state.json"))
    }

    /// Default directory for pre-operation backups
    pub fn default_backup_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("backups"))
    }

    /// Default staging directory for export artifacts
    pub fn default_artifact_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("artifacts"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }
}

/// Tunables read from `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Where backups are written (default: `<config>/backups`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Where export artifacts are staged (default: `<config>/artifacts`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Extra attempts for a failed export before giving up
    #[serde(default = "default_export_retries")]
    pub export_retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_mysql_bin")]
    pub mysql_bin: String,

    #[serde(default = "default_mysqldump_bin")]
    pub mysqldump_bin: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_export_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_mysql_bin() -> String {
    "mysql".to_string()
}

fn default_mysqldump_bin() -> String {
    "mysqldump".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backup_dir: None,
            artifact_dir: None,
            connect_timeout_secs: default_connect_timeout(),
            export_retries: default_export_retries(),
            retry_delay_secs: default_retry_delay(),
            mysql_bin: default_mysql_bin(),
            mysqldump_bin: default_mysqldump_bin(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = ConfigManager::settings_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let path = ConfigManager::settings_path()?;
        ConfigManager::ensure_config_dir()?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup_dir {
            Some(dir) => Ok(dir.clone()),
            None => ConfigManager::default_backup_dir(),
        }
    }

    pub fn artifact_dir(&self) -> Result<PathBuf> {
        match &self.artifact_dir {
            Some(dir) => Ok(dir.clone()),
            None => ConfigManager::default_artifact_dir(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
