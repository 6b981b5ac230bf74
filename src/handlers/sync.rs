//! Clone, push and synchronize handlers
//!
//! Wires settings, profiles, the confirmation policy and the orchestrator
//! together for one command, then prints the outcome.

use anyhow::Result;
use colored::Colorize;

use crate::backup::{self, BackupService};
use crate::config::{ConfigManager, Settings};
use crate::connection::ConnectionManager;
use crate::identifier::DatabaseName;
use crate::logger::OperationLog;
use crate::profile::Role;
use crate::schema::SchemaInspector;
use crate::sync::{
    self, format_timestamp, DirectionDecision, SyncMode, SyncOperation,
    SyncOrchestrator, SyncOutcome, SyncState,
};
use crate::transfer::TransferPipeline;

use super::connection::build_manager;

/// Flags shared by every command that may overwrite data
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Overwrite existing targets without asking (a backup is still taken)
    pub force: bool,
    /// Never prompt; fail instead
    pub non_interactive: bool,
}

impl RunOptions {
    pub fn interactive(&self) -> bool {
        !self.non_interactive && sync::is_interactive()
    }
}

/// `clone-database <remote_db> [local_db]`
pub fn handle_clone(remote_db: &str, local_db: Option<&str>, options: RunOptions) -> Result<()> {
    let remote = DatabaseName::parse(remote_db)?;
    let local = DatabaseName::parse(local_db.unwrap_or(remote_db))?;

    println!(
        "{}",
        format!("Cloning remote `{remote}` into local `{local}`...").cyan().bold()
    );
    run_operation(&SyncOperation::pull(remote, local), options)
}

/// `push-database <local_db> [remote_db]`
pub fn handle_push(local_db: &str, remote_db: Option<&str>, options: RunOptions) -> Result<()> {
    let local = DatabaseName::parse(local_db)?;
    let remote = DatabaseName::parse(remote_db.unwrap_or(local_db))?;

    println!(
        "{}",
        format!("Pushing local `{local}` to remote `{remote}`...").cyan().bold()
    );
    run_operation(&SyncOperation::push(local, remote), options)
}

/// `synchronize-databases <local_db> <remote_db> <pull|push|bidirectional>`
pub fn handle_synchronize(
    local_db: &str,
    remote_db: &str,
    mode: &str,
    dry_run: bool,
    options: RunOptions,
) -> Result<()> {
    let mode: SyncMode = mode.parse()?;
    let operation = SyncOperation::new(
        mode,
        DatabaseName::parse(local_db)?,
        DatabaseName::parse(remote_db)?,
    );

    println!(
        "{}",
        format!(
            "Synchronizing local `{}` with remote `{}` ({})...",
            operation.local_database, operation.remote_database, mode
        )
        .cyan()
        .bold()
    );

    if dry_run {
        return plan_operation(&operation, options);
    }

    run_operation(&operation, options)
}

fn run_operation(operation: &SyncOperation, options: RunOptions) -> Result<()> {
    let settings = Settings::load()?;
    let manager = build_manager(
        &settings,
        &[Role::Local, Role::Remote],
        options.interactive(),
        OperationLog::open_default()?,
    )?;
    let confirmation = sync::policy(options.force, options.non_interactive);

    let backups = BackupService::new(&manager, settings.backup_dir()?);
    let pipeline = TransferPipeline::new(&manager, settings.artifact_dir()?)
        .with_retries(settings.export_retries, settings.retry_delay());
    let state = SyncState::load(&ConfigManager::sync_state_path()?)?;

    let mut orchestrator =
        SyncOrchestrator::new(&manager, backups, pipeline, confirmation.as_ref()).with_state(state);

    let outcome = orchestrator.run(operation)?;
    outcome.display();

    Ok(())
}

fn plan_operation(operation: &SyncOperation, options: RunOptions) -> Result<()> {
    let settings = Settings::load()?;
    // A dry run changes nothing, so it stays out of the operation log
    let manager = build_manager(
        &settings,
        &[Role::Local, Role::Remote],
        options.interactive(),
        OperationLog::console_only(),
    )?;

    let backups = BackupService::new(&manager, settings.backup_dir()?);
    let pipeline = TransferPipeline::new(&manager, settings.artifact_dir()?);
    let state = SyncState::load(&ConfigManager::sync_state_path()?)?;
    let orchestrator =
        SyncOrchestrator::new(&manager, backups, pipeline, &sync::AssumeYes).with_state(state);

    let direction = match operation.fixed_direction() {
        Some(direction) => direction,
        None => match orchestrator.resolve_direction(operation)? {
            DirectionDecision::Transfer {
                direction,
                local_modified,
                remote_modified,
            } => {
                println!("  {} local {}", "Modified:".bold(), format_timestamp(local_modified));
                println!("  {} remote {}", "Modified:".bold(), format_timestamp(remote_modified));
                direction
            }
            DirectionDecision::InSync {
                reason,
                local_modified,
                remote_modified,
            } => {
                SyncOutcome::InSync {
                    reason,
                    local_modified,
                    remote_modified,
                }
                .display();
                return Ok(());
            }
        },
    };

    let target_exists = orchestrator.preflight(operation, direction)?;
    let source = direction.source();
    let target = direction.target();

    println!("\n{}", "=== Dry Run ===".bold().cyan());
    println!(
        "  Would {} `{}` ({}) -> `{}` ({})",
        direction,
        operation.database(source),
        source,
        operation.database(target),
        target
    );
    if target_exists {
        println!(
            "  {} `{}` exists on {} and would be backed up, then replaced",
            "Note:".yellow(),
            operation.database(target),
            target
        );
    }

    Ok(())
}

/// `list-databases [--remote]`
pub fn handle_list_databases(role: Role, options: RunOptions) -> Result<()> {
    let settings = Settings::load()?;
    let manager = build_manager(
        &settings,
        &[role],
        options.interactive(),
        OperationLog::open_default()?,
    )?;
    print_databases(&manager, role)
}

fn print_databases(manager: &ConnectionManager, role: Role) -> Result<()> {
    let names = SchemaInspector::new(manager).list_databases(role)?;

    println!(
        "{}",
        format!("Databases on {} ({}):", role, manager.profile(role)?.endpoint())
            .bold()
            .cyan()
    );
    if names.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for name in names {
        println!("  {name}");
    }

    Ok(())
}

/// `list-backups`
pub fn handle_list_backups() -> Result<()> {
    let settings = Settings::load()?;
    let dir = settings.backup_dir()?;
    let backups = backup::list_backups(&dir);

    println!("{}", format!("Backups in {}:", dir.display()).bold().cyan());
    if backups.is_empty() {
        println!("  {}", "(none)".dimmed());
        return Ok(());
    }

    for b in backups {
        println!(
            "  {}  {:<6} {:<24} {:>10}  {}",
            b.created_at.format("%Y-%m-%d %H:%M:%S"),
            b.role.as_str(),
            b.database,
            sync::format_bytes(b.size_bytes),
            b.path.display().to_string().dimmed()
        );
    }

    Ok(())
}
