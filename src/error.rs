use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::profile::Role;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for connection, precondition, backup and transfer failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when the operator declined an overwrite.
///
/// Automation should not treat this as an error.
pub const EXIT_DECLINED: i32 = 3;

/// Result alias used by every engine component.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Which half of a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Export,
    Import,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Export => write!(f, "export"),
            TransferStage::Import => write!(f, "import"),
        }
    }
}

/// Failure taxonomy of the clone/sync engine.
///
/// Connection and precondition failures always happen before anything is
/// mutated. A `BackupFailure` aborts before the target is touched. A
/// `TransferFailure` may leave the target in a mixed state and carries the
/// artifact and backup paths needed for manual recovery.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection to {role} server failed: {reason}")]
    ConnectionFailure { role: Role, reason: String },

    #[error("precondition failed: {0}")]
    PreconditionFailure(String),

    #[error("{role} server rejected statement: {reason}")]
    QueryFailure { role: Role, reason: String },

    #[error("backup of `{database}` on {role} server failed: {reason}")]
    BackupFailure {
        role: Role,
        database: String,
        reason: String,
    },

    #[error("{stage} failed: {reason}{}", recovery_hint(.artifact, .backup))]
    TransferFailure {
        stage: TransferStage,
        reason: String,
        artifact: Option<PathBuf>,
        backup: Option<PathBuf>,
    },

    #[error("operation declined by user")]
    UserAborted,
}

fn recovery_hint(artifact: &Option<PathBuf>, backup: &Option<PathBuf>) -> String {
    let mut hint = String::new();
    if let Some(path) = artifact {
        hint.push_str(&format!("\n  artifact retained at {}", path.display()));
    }
    if let Some(path) = backup {
        hint.push_str(&format!(
            "\n  target may be inconsistent; most recent backup of it at {}",
            path.display()
        ));
    }
    hint
}

impl SyncError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::UserAborted => EXIT_DECLINED,
            _ => EXIT_FAILURE,
        }
    }

    /// Attach the most recent backup of the target to a transfer failure.
    pub fn with_backup(self, backup_path: Option<PathBuf>) -> Self {
        match self {
            SyncError::TransferFailure {
                stage,
                reason,
                artifact,
                backup: None,
            } => SyncError::TransferFailure {
                stage,
                reason,
                artifact,
                backup: backup_path,
            },
            other => other,
        }
    }
}
