use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::ConfigManager;
use crate::profile::Role;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize console logging
///
/// Console output can be controlled via the `RUST_LOG` environment variable:
/// - `RUST_LOG=error` - Only errors
/// - `RUST_LOG=warn` - Warnings and errors
/// - `RUST_LOG=info` - Info, warnings, and errors (default)
/// - `RUST_LOG=debug` - Debug and above, including every statement sent
///
/// Statements, dumps, loads and failures are additionally written to the
/// operation log (see [`OperationLog`]) regardless of the console level.
///
/// ```bash
/// RUST_LOG=debug db-clone-sync clone-database orders
/// ```
pub fn init_logger() -> Result<()> {
    ConfigManager::ensure_config_dir()?;

    let default_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(default_level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // Ignore error if logger is already initialized

    Ok(())
}

/// Replace every known secret in `message` with `****`
pub fn redact(message: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(message.to_string(), |acc, secret| acc.replace(secret.as_str(), "****"))
}

/// Append-only, timestamped log of everything one run did to a server.
///
/// Every line carries the operation id of the run so interleaved runs can be
/// told apart. Credentials registered with [`OperationLog::register_secret`]
/// are redacted before anything reaches the file or the console.
#[derive(Debug, Clone)]
pub struct OperationLog {
    path: Option<PathBuf>,
    operation_id: String,
    secrets: Vec<String>,
}

impl OperationLog {
    /// Log to a file, creating parent directories on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            operation_id: new_operation_id(),
            secrets: Vec::new(),
        }
    }

    /// Log to the default location in the config directory
    pub fn open_default() -> Result<Self> {
        let path = ConfigManager::operation_log_path()?;
        if let Err(e) = rotate_log_if_needed(&path) {
            log::warn!("Failed to rotate operation log: {}", e);
        }
        Ok(Self::new(path))
    }

    /// Console-only log, for tests and dry runs
    pub fn console_only() -> Self {
        Self {
            path: None,
            operation_id: new_operation_id(),
            secrets: Vec::new(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn register_secret(&mut self, secret: &str) {
        if !secret.is_empty() && !self.secrets.iter().any(|s| s == secret) {
            self.secrets.push(secret.to_string());
        }
    }

    /// Record one event. A failed write is reported on the console, never fatal.
    pub fn record(&self, role: Option<Role>, message: &str) {
        let message = redact(message, &self.secrets);
        let scope = role.map(|r| r.as_str()).unwrap_or("-");

        log::debug!("[{}] {}", scope, message);

        if let Some(path) = &self.path {
            if let Err(e) = self.append(path, scope, &message) {
                log::warn!("Failed to write operation log {}: {}", path.display(), e);
            }
        }
    }

    fn append(&self, path: &Path, scope: &str, message: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        writeln!(
            file,
            "[{}] [op {}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.operation_id,
            scope,
            message
        )?;

        Ok(())
    }
}

fn new_operation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Rotate the log file if it exceeds 10MB
pub fn rotate_log_if_needed(log_path: &Path) -> Result<()> {
    if log_path.exists() {
        let metadata = fs::metadata(log_path)?;

        if metadata.len() > MAX_LOG_SIZE {
            let old_log_path = log_path.with_extension("log.old");

            if old_log_path.exists() {
                fs::remove_file(&old_log_path)?;
            }

            fs::rename(log_path, &old_log_path)?;

            log::info!("Log file rotated to {}", old_log_path.display());
        }
    }

    Ok(())
}
