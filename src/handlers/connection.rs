//! Connection setup and probe handlers
//!
//! Collects profiles from persisted files or terminal prompts and builds
//! the [`ConnectionManager`] every other command runs on.

use anyhow::{Context, Result};
use colored::Colorize;
use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Text};

use crate::config::{ConfigManager, Settings};
use crate::connection::{ConnectionManager, ConnectionStatus, MysqlCli};
use crate::error::SyncError;
use crate::logger::OperationLog;
use crate::profile::{ConnectionProfile, Credential, Role, DEFAULT_PORT};

/// Prompt for every field of a profile, offering `current` as defaults
pub fn prompt_profile(role: Role, current: Option<&ConnectionProfile>) -> Result<ConnectionProfile> {
    println!(
        "{}",
        format!("Configure the {role} database server").cyan().bold()
    );

    let default_host = current.map(|p| p.host().to_string()).unwrap_or_else(|| {
        match role {
            Role::Local => "localhost".to_string(),
            Role::Remote => String::new(),
        }
    });

    let host = Text::new("Host:")
        .with_default(&default_host)
        .with_help_message("Hostname or IP address of the MySQL server")
        .prompt()
        .context("Failed to get host")?;

    let port = CustomType::<u16>::new("Port:")
        .with_default(current.map(|p| p.port()).unwrap_or(DEFAULT_PORT))
        .with_error_message("Enter a port number between 1 and 65535")
        .prompt()
        .context("Failed to get port")?;

    let username = Text::new("Username:")
        .with_default(current.map(|p| p.username()).unwrap_or("root"))
        .prompt()
        .context("Failed to get username")?;

    let secret = Password::new("Password:")
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_help_message("Never written to logs or passed on the command line")
        .prompt()
        .context("Failed to get password")?;

    ConnectionProfile::new(role, host, port, username, Credential::new(secret))
}

/// Load the persisted profile for `role`, or prompt for one when allowed
pub fn load_or_prompt(role: Role, interactive: bool) -> Result<ConnectionProfile> {
    let path = ConfigManager::profile_path(role)?;
    if let Some(profile) = ConnectionProfile::load(role, &path)? {
        log::debug!("Using saved {} profile {}", role, profile.endpoint());
        return Ok(profile);
    }

    if !interactive {
        return Err(SyncError::PreconditionFailure(format!(
            "no saved {role} connection profile; run 'db-clone-sync setup-{role}-connection' first"
        ))
        .into());
    }

    prompt_profile(role, None)
}

/// Build a manager backed by the MySQL client utilities
pub fn build_manager(
    settings: &Settings,
    roles: &[Role],
    interactive: bool,
    log: OperationLog,
) -> Result<ConnectionManager> {
    let mut manager = ConnectionManager::new(Box::new(MysqlCli::new(settings)), log);

    for role in roles {
        manager.add_profile(load_or_prompt(*role, interactive)?);
    }

    Ok(manager)
}

fn print_status(role: Role, profile: &ConnectionProfile, status: &ConnectionStatus) {
    match status {
        ConnectionStatus::Connected => println!(
            "  {} {} server {} is reachable",
            "✓".green(),
            role,
            profile.endpoint().cyan()
        ),
        ConnectionStatus::Failed { reason, .. } => println!(
            "  {} {} server {}: {}",
            "✗".red(),
            role,
            profile.endpoint().cyan(),
            reason
        ),
    }
}

/// Probe one server and fail with a connection error if it is down
pub fn handle_test_connection(role: Role, interactive: bool) -> Result<()> {
    let settings = Settings::load()?;
    let manager = build_manager(&settings, &[role], interactive, OperationLog::open_default()?)?;
    let profile = manager.profile(role)?;

    println!("{}", format!("Testing {role} connection...").cyan());
    let status = manager.test_connection(role);
    print_status(role, profile, &status);

    status.into_result()?;
    Ok(())
}

/// Prompt, test and persist the local profile
pub fn handle_setup_local_connection() -> Result<()> {
    let path = ConfigManager::profile_path(Role::Local)?;
    let current = ConnectionProfile::load(Role::Local, &path)?;
    let profile = prompt_profile(Role::Local, current.as_ref())?;

    verify_new_profile(&profile)?;

    ConfigManager::ensure_config_dir()?;
    profile.save(&path)?;
    println!(
        "{} Saved local profile to {} (owner read/write only)",
        "✓".green().bold(),
        path.display()
    );

    Ok(())
}

/// Prompt and test the remote profile; persist it only if the operator opts in
pub fn handle_setup_remote_connection(save: bool) -> Result<()> {
    let path = ConfigManager::profile_path(Role::Remote)?;
    let current = ConnectionProfile::load(Role::Remote, &path)?;
    let profile = prompt_profile(Role::Remote, current.as_ref())?;

    verify_new_profile(&profile)?;

    let previously_saved = current.as_ref().is_some_and(|p| p.is_saved());
    let save = save
        || Confirm::new("Save the remote profile (including its password) to disk?")
            .with_default(previously_saved)
            .with_help_message("Otherwise you will be asked for it on every run")
            .prompt()
            .context("Failed to get confirmation")?;

    if save {
        ConfigManager::ensure_config_dir()?;
        profile.save(&path)?;
        println!(
            "{} Saved remote profile to {} (owner read/write only)",
            "✓".green().bold(),
            path.display()
        );
    } else {
        println!(
            "{} Remote profile not saved; it will be requested again next run",
            "Note:".yellow()
        );
    }

    Ok(())
}

fn verify_new_profile(profile: &ConnectionProfile) -> Result<()> {
    let settings = Settings::load()?;
    let manager = ConnectionManager::new(
        Box::new(MysqlCli::new(&settings)),
        OperationLog::open_default()?,
    )
    .with_profile(profile.clone());

    println!("{}", "Testing connection...".cyan());
    let status = manager.test_connection(profile.role());
    print_status(profile.role(), profile, &status);
    status.into_result()?;
    Ok(())
}
