use inquire::Confirm;

use crate::error::{SyncError, SyncResult};
use crate::identifier::DatabaseName;
use crate::profile::Role;

/// Decides whether an existing target database may be overwritten.
///
/// `Ok(false)` means the operator said no and the orchestrator stops with
/// [`SyncError::UserAborted`].
pub trait Confirmation {
    fn confirm_overwrite(&self, role: Role, database: &DatabaseName) -> SyncResult<bool>;
}

/// `--force`: always overwrite (a backup is still taken first)
pub struct AssumeYes;

impl Confirmation for AssumeYes {
    fn confirm_overwrite(&self, role: Role, database: &DatabaseName) -> SyncResult<bool> {
        log::info!("Overwriting `{}` on {} (forced)", database, role);
        Ok(true)
    }
}

/// No terminal and no `--force`: refuse instead of guessing
pub struct NonInteractive;

impl Confirmation for NonInteractive {
    fn confirm_overwrite(&self, role: Role, database: &DatabaseName) -> SyncResult<bool> {
        Err(SyncError::PreconditionFailure(format!(
            "`{database}` already exists on the {role} server; rerun with --force to overwrite it"
        )))
    }
}

/// Ask on the terminal
pub struct TerminalPrompt;

impl Confirmation for TerminalPrompt {
    fn confirm_overwrite(&self, role: Role, database: &DatabaseName) -> SyncResult<bool> {
        Confirm::new(&format!(
            "`{database}` already exists on the {role} server. Back it up and overwrite?"
        ))
        .with_default(false)
        .with_help_message("A backup is written before anything is dropped")
        .prompt()
        .map_err(|e| match e {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => SyncError::UserAborted,
            other => SyncError::PreconditionFailure(format!("failed to get confirmation: {other}")),
        })
    }
}

/// Whether stdin and stdout are both terminals
pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

/// Pick the confirmation policy for this run
pub fn policy(force: bool, non_interactive: bool) -> Box<dyn Confirmation> {
    if force {
        Box::new(AssumeYes)
    } else if non_interactive || !is_interactive() {
        Box::new(NonInteractive)
    } else {
        Box::new(TerminalPrompt)
    }
}
