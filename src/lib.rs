//! # db-clone-sync
//!
//! Clone, push and synchronize whole MySQL databases between a "local" and a
//! "remote" server.
//!
//! ## Overview
//!
//! Every operation follows the same safety skeleton: **verify** both servers
//! and the source database, **protect** an existing target with a backup,
//! **transfer** through a dump file, then **confirm** by removing the
//! transient artifact and reporting what moved. Bidirectional sync picks a
//! direction by comparing the newest table update time on each side.
//!
//! ## Architecture
//!
//! - Connection profiles and transport ([`profile`], [`connection`])
//! - Read-only introspection ([`schema`])
//! - Dump files, backups and transfers ([`artifact`], [`backup`], [`transfer`])
//! - The state machine tying it together ([`sync`])
//! - Configuration, logging and errors ([`config`], [`logger`], [`error`])
//! - Command glue for the binary ([`handlers`])

/// Dump file naming, uniqueness and durability shared by exports and backups.
pub mod artifact;

/// Pre-operation backups that make overwrites reversible.
///
/// A backup is written and fsynced before anything on the target is dropped.
/// Backups are never deleted automatically.
pub mod backup;

/// Platform configuration directory and `config.toml` settings.
pub mod config;

/// Profile registry and the client backend seam.
///
/// Executes statements verbatim against a named profile, logs them with
/// credentials redacted, and probes liveness. The production backend shells
/// out to the MySQL client utilities.
pub mod connection;

/// Error taxonomy and exit codes.
pub mod error;

/// Command handlers used by the binary.
pub mod handlers;

/// Validated database names and SQL quoting.
pub mod identifier;

/// Console logging and the persistent, redacted operation log.
pub mod logger;

/// Immutable connection profiles and their permission-restricted files.
pub mod profile;

/// Database existence, freshness and listing queries.
pub mod schema;

/// Pull, push and bidirectional sync orchestration.
pub mod sync;

/// Export to and import from portable dump artifacts.
pub mod transfer;

pub use error::{SyncError, SyncResult};
