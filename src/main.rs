use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use db_clone_sync::error::{EXIT_FAILURE, EXIT_SUCCESS};
use db_clone_sync::handlers::{self, RunOptions};
use db_clone_sync::logger;
use db_clone_sync::profile::Role;
use db_clone_sync::SyncError;

#[derive(Parser)]
#[command(name = "db-clone-sync")]
#[command(about = "Clone, push and synchronize MySQL databases between a local and a remote server", long_about = None)]
#[command(version)]
struct Cli {
    /// Overwrite existing target databases without asking (a backup is still taken)
    #[arg(short = 'y', long, global = true)]
    force: bool,

    /// Never prompt; fail when input would be needed
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a remote database to the local server (pull)
    CloneDatabase {
        /// Database on the remote server
        remote_db: String,

        /// Name on the local server (defaults to the remote name)
        local_db: Option<String>,
    },

    /// Copy a local database to the remote server (push)
    PushDatabase {
        /// Database on the local server
        local_db: String,

        /// Name on the remote server (defaults to the local name)
        remote_db: Option<String>,
    },

    /// Synchronize a database pair in a fixed or automatic direction
    SynchronizeDatabases {
        local_db: String,

        remote_db: String,

        /// pull, push or bidirectional
        direction: String,

        /// Show what would happen without transferring anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Configure the remote server for this session, optionally saving it
    SetupRemoteConnection {
        /// Save the profile without asking
        #[arg(long)]
        save: bool,
    },

    /// Configure and save the local server profile
    SetupLocalConnection,

    /// Check that the local server is reachable
    TestConnection,

    /// Check that the remote server is reachable
    TestRemoteConnection,

    /// List user databases on a server
    ListDatabases {
        /// List the remote server instead of the local one
        #[arg(long)]
        remote: bool,
    },

    /// List pre-operation backups, newest first
    ListBackups,
}

fn run(cli: Cli) -> Result<()> {
    let options = RunOptions {
        force: cli.force,
        non_interactive: cli.non_interactive,
    };

    match cli.command {
        Commands::CloneDatabase { remote_db, local_db } => {
            handlers::handle_clone(&remote_db, local_db.as_deref(), options)?;
        }
        Commands::PushDatabase { local_db, remote_db } => {
            handlers::handle_push(&local_db, remote_db.as_deref(), options)?;
        }
        Commands::SynchronizeDatabases {
            local_db,
            remote_db,
            direction,
            dry_run,
        } => {
            handlers::handle_synchronize(&local_db, &remote_db, &direction, dry_run, options)?;
        }
        Commands::SetupRemoteConnection { save } => {
            handlers::handle_setup_remote_connection(save)?;
        }
        Commands::SetupLocalConnection => {
            handlers::handle_setup_local_connection()?;
        }
        Commands::TestConnection => {
            handlers::handle_test_connection(Role::Local, options.interactive())?;
        }
        Commands::TestRemoteConnection => {
            handlers::handle_test_connection(Role::Remote, options.interactive())?;
        }
        Commands::ListDatabases { remote } => {
            let role = if remote { Role::Remote } else { Role::Local };
            handlers::handle_list_databases(role, options)?;
        }
        Commands::ListBackups => {
            handlers::handle_list_backups()?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logger() {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => match e.downcast_ref::<SyncError>() {
            Some(SyncError::UserAborted) => {
                println!("{}", "Operation declined; nothing was changed.".yellow());
                SyncError::UserAborted.exit_code()
            }
            Some(sync_error) => {
                log::error!("{e:#}");
                sync_error.exit_code()
            }
            None => {
                log::error!("{e:#}");
                EXIT_FAILURE
            }
        },
    };

    std::process::exit(code);
}
