//! Clone, push and bidirectional sync.
//!
//! Every transfer follows the same skeleton: verify both servers and the
//! source, protect an existing target with a backup, export then import,
//! and finally remove the artifact and report. The first unrecovered
//! failure ends the operation.

mod confirm;
mod operation;
mod report;
mod state;

pub use confirm::{is_interactive, policy, AssumeYes, Confirmation, NonInteractive, TerminalPrompt};
pub use operation::{Direction, SyncMode, SyncOperation};
pub use report::{
    format_bytes, format_timestamp, DirectionDecision, InSyncReason, SyncOutcome, TransferReport,
};
pub use state::{PairBaseline, SyncState};

use chrono::{DateTime, Local, Utc};

use crate::backup::{latest_backup, BackupService};
use crate::connection::ConnectionManager;
use crate::error::{SyncError, SyncResult};
use crate::profile::Role;
use crate::schema::SchemaInspector;
use crate::transfer::{ImportOptions, TransferPipeline};

/// Pick a direction from two modification times.
///
/// Unknown sorts before any known time, so a side with no detectable
/// modification never wins. Equal times (including both unknown) mean no
/// transfer.
pub fn decide_direction(
    local_modified: Option<DateTime<Utc>>,
    remote_modified: Option<DateTime<Utc>>,
) -> Option<Direction> {
    match local_modified.cmp(&remote_modified) {
        std::cmp::Ordering::Greater => Some(Direction::Push),
        std::cmp::Ordering::Less => Some(Direction::Pull),
        std::cmp::Ordering::Equal => None,
    }
}

/// Runs one [`SyncOperation`] to completion.
///
/// One orchestrator is built per process run; operations never overlap.
pub struct SyncOrchestrator<'a> {
    connections: &'a ConnectionManager,
    backups: BackupService<'a>,
    pipeline: TransferPipeline<'a>,
    confirmation: &'a dyn Confirmation,
    state: SyncState,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        connections: &'a ConnectionManager,
        backups: BackupService<'a>,
        pipeline: TransferPipeline<'a>,
        confirmation: &'a dyn Confirmation,
    ) -> Self {
        Self {
            connections,
            backups,
            pipeline,
            confirmation,
            state: SyncState::ephemeral(),
        }
    }

    /// Use persisted bidirectional baselines
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Run an operation. Every failure is written to the operation log.
    pub fn run(&mut self, operation: &SyncOperation) -> SyncResult<SyncOutcome> {
        let connections = self.connections;
        let log = connections.log();
        log.record(
            None,
            &format!("start {} {}", operation.mode, operation.pair_key()),
        );

        let result = match operation.fixed_direction() {
            Some(direction) => self
                .transfer(operation, direction)
                .map(SyncOutcome::Transferred),
            None => self.synchronize(operation),
        };

        match &result {
            Ok(outcome) => log.record(
                None,
                &format!(
                    "finished {} {}: {}",
                    operation.mode,
                    operation.pair_key(),
                    if outcome.transferred() { "transferred" } else { "in sync" }
                ),
            ),
            Err(e) => log.record(
                None,
                &format!("{} {} failed: {}", operation.mode, operation.pair_key(), e),
            ),
        }

        result
    }

    /// Work out which way a bidirectional sync would go, without moving data
    pub fn resolve_direction(&self, operation: &SyncOperation) -> SyncResult<DirectionDecision> {
        self.verify_connections()?;

        let inspector = SchemaInspector::new(self.connections);
        let local_modified = inspector.last_modified(Role::Local, operation.database(Role::Local))?;
        let remote_modified =
            inspector.last_modified(Role::Remote, operation.database(Role::Remote))?;

        log::info!(
            "Last modified: local {}, remote {}",
            format_timestamp(local_modified),
            format_timestamp(remote_modified)
        );

        if let Some(baseline) = self.state.baseline(&operation.pair_key()) {
            if baseline.matches(local_modified, remote_modified) {
                return Ok(DirectionDecision::InSync {
                    reason: InSyncReason::UnchangedSinceLastSync,
                    local_modified,
                    remote_modified,
                });
            }
        }

        Ok(match decide_direction(local_modified, remote_modified) {
            Some(direction) => DirectionDecision::Transfer {
                direction,
                local_modified,
                remote_modified,
            },
            None => DirectionDecision::InSync {
                reason: InSyncReason::EqualTimestamps,
                local_modified,
                remote_modified,
            },
        })
    }

    fn synchronize(&mut self, operation: &SyncOperation) -> SyncResult<SyncOutcome> {
        let direction = match self.resolve_direction(operation)? {
            DirectionDecision::InSync {
                reason,
                local_modified,
                remote_modified,
            } => {
                return Ok(SyncOutcome::InSync {
                    reason,
                    local_modified,
                    remote_modified,
                })
            }
            DirectionDecision::Transfer { direction, .. } => direction,
        };

        log::info!("Bidirectional sync resolved to {}", direction);
        let report = self.transfer(operation, direction)?;

        // Remember what both sides look like now so an immediate rerun is a no-op
        let inspector = SchemaInspector::new(self.connections);
        let baseline = PairBaseline {
            local_modified: inspector.last_modified(Role::Local, operation.database(Role::Local))?,
            remote_modified: inspector
                .last_modified(Role::Remote, operation.database(Role::Remote))?,
            synced_at: Utc::now(),
        };
        if let Err(e) = self.state.record(&operation.pair_key(), baseline) {
            log::warn!("Transfer succeeded but the sync baseline was not saved: {}", e);
        }

        Ok(SyncOutcome::Transferred(report))
    }

    fn verify_connections(&self) -> SyncResult<()> {
        for role in [Role::Local, Role::Remote] {
            self.connections.test_connection(role).into_result()?;
        }
        Ok(())
    }

    /// Verify both servers and the source, then report whether the target
    /// already exists. Nothing is mutated.
    pub fn preflight(&self, operation: &SyncOperation, direction: Direction) -> SyncResult<bool> {
        let source = direction.source();
        let target = direction.target();
        let source_db = operation.database(source);

        self.verify_connections()?;
        let inspector = SchemaInspector::new(self.connections);
        if !inspector.database_exists(source, source_db)? {
            return Err(SyncError::PreconditionFailure(format!(
                "source database `{source_db}` does not exist on the {source} server"
            )));
        }

        inspector.database_exists(target, operation.database(target))
    }

    fn transfer(&self, operation: &SyncOperation, direction: Direction) -> SyncResult<TransferReport> {
        let source = direction.source();
        let target = direction.target();
        let source_db = operation.database(source);
        let target_db = operation.database(target);

        // Verify
        let target_exists = self.preflight(operation, direction)?;

        // Decide target disposition
        let backup = if target_exists {
            if !self.confirmation.confirm_overwrite(target, target_db)? {
                return Err(SyncError::UserAborted);
            }
            // The target was just seen; a backup that finds nothing is a failure
            match self.backups.protect(target, target_db)? {
                Some(backup) => Some(backup),
                None => {
                    return Err(SyncError::BackupFailure {
                        role: target,
                        database: target_db.to_string(),
                        reason: "database exists but could not be confirmed for backup; \
                                 refusing to overwrite it"
                            .to_string(),
                    })
                }
            }
        } else {
            None
        };
        let backup_path = backup.as_ref().map(|b| b.path.clone()).or_else(|| {
            latest_backup(self.backups.backup_dir(), target, target_db.as_str())
                .map(|b| b.path)
        });

        // Transfer
        let artifact = self
            .pipeline
            .export(source, source_db)
            .map_err(|e| e.with_backup(backup_path.clone()))?;

        self.pipeline
            .import(
                target,
                target_db,
                &artifact,
                ImportOptions {
                    create_if_missing: true,
                    replace_existing: target_exists,
                },
            )
            .map_err(|e| e.with_backup(backup_path.clone()))?;

        // Confirm
        if let Err(e) = self.pipeline.discard(&artifact) {
            log::warn!("{}", e);
        }

        let report = TransferReport {
            direction,
            source_endpoint: self.connections.profile(source)?.endpoint(),
            source_database: source_db.to_string(),
            target_endpoint: self.connections.profile(target)?.endpoint(),
            target_database: target_db.to_string(),
            bytes_transferred: artifact.size_bytes,
            backup,
            target_created: !target_exists,
            completed_at: Local::now(),
        };

        self.connections.log().record(
            None,
            &format!(
                "{} `{}` ({} {}) -> `{}` ({} {}): {} bytes",
                direction,
                report.source_database,
                source,
                report.source_endpoint,
                report.target_database,
                target,
                report.target_endpoint,
                report.bytes_transferred
            ),
        );

        Ok(report)
    }
}
