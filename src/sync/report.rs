use chrono::{DateTime, Local, Utc};
use colored::Colorize;

use crate::backup::Backup;
use crate::profile::Role;

use super::operation::Direction;

/// Why a bidirectional sync moved nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSyncReason {
    /// Both modification times compare equal (including both unknown)
    EqualTimestamps,
    /// Both sides still match the baseline recorded after the last sync
    UnchangedSinceLastSync,
}

/// Direction resolved for a bidirectional sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionDecision {
    Transfer {
        direction: Direction,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    },
    InSync {
        reason: InSyncReason,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    },
}

/// What a completed transfer did
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub direction: Direction,
    pub source_endpoint: String,
    pub source_database: String,
    pub target_endpoint: String,
    pub target_database: String,
    pub bytes_transferred: u64,
    pub backup: Option<Backup>,
    pub target_created: bool,
    pub completed_at: DateTime<Local>,
}

impl TransferReport {
    pub fn source_role(&self) -> Role {
        self.direction.source()
    }

    pub fn target_role(&self) -> Role {
        self.direction.target()
    }

    pub fn display(&self) {
        println!("\n{}", "=== Transfer Summary ===".bold().cyan());
        println!(
            "  {} {} `{}` ({})",
            "From:".bold(),
            self.source_role(),
            self.source_database.cyan(),
            self.source_endpoint
        );
        println!(
            "  {}   {} `{}` ({}){}",
            "To:".bold(),
            self.target_role(),
            self.target_database.cyan(),
            self.target_endpoint,
            if self.target_created {
                " [created]".green().to_string()
            } else {
                String::new()
            }
        );
        println!("  {} {}", "Size:".bold(), format_bytes(self.bytes_transferred));

        match &self.backup {
            Some(backup) => println!(
                "  {} {} ({})",
                "Backup:".bold(),
                backup.path.display(),
                format_bytes(backup.size_bytes)
            ),
            None => println!("  {} {}", "Backup:".bold(), "not needed".dimmed()),
        }

        println!("\n{}", format!("{} complete!", capitalize(self.direction.as_str())).green().bold());
    }
}

/// Result of one sync invocation
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Transferred(TransferReport),
    InSync {
        reason: InSyncReason,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    },
}

impl SyncOutcome {
    pub fn transferred(&self) -> bool {
        matches!(self, SyncOutcome::Transferred(_))
    }

    pub fn display(&self) {
        match self {
            SyncOutcome::Transferred(report) => report.display(),
            SyncOutcome::InSync {
                reason,
                local_modified,
                remote_modified,
            } => {
                println!("\n{}", "=== Already In Sync ===".bold().cyan());
                println!("  {} {}", "Local modified: ".bold(), format_timestamp(*local_modified));
                println!("  {} {}", "Remote modified:".bold(), format_timestamp(*remote_modified));
                let why = match reason {
                    InSyncReason::EqualTimestamps => "modification times are equal",
                    InSyncReason::UnchangedSinceLastSync => "neither side changed since the last sync",
                };
                println!("  {} No transfer: {}", "Note:".yellow(), why);
            }
        }
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
