//! Transport to the two database servers.
//!
//! [`ConnectionManager`] owns the local and remote profiles and one
//! [`DatabaseClient`] backend. Statements are passed through verbatim; the
//! manager's job is to log them, redact credentials, and fold transport
//! errors into [`SyncError::ConnectionFailure`].

mod mysql;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub use mysql::MysqlCli;

use crate::error::{SyncError, SyncResult};
use crate::identifier::DatabaseName;
use crate::logger::OperationLog;
use crate::profile::{ConnectionProfile, Role};

/// Broad class of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// Host unreachable, refused, or dropped the connection
    Connection,
    Timeout,
    Authentication,
    /// The server was reached but rejected the statement
    Statement,
    /// Local I/O: spawning the client, reading or writing a file
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error means the server could not be used at all
    pub fn is_connection(&self) -> bool {
        matches!(
            self.kind,
            ClientErrorKind::Connection | ClientErrorKind::Timeout | ClientErrorKind::Authentication
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClientError {}

/// Backend that actually talks to a server.
pub trait DatabaseClient: Send + Sync {
    /// Open a connection and run a no-op.
    fn ping(&self, profile: &ConnectionProfile) -> Result<(), ClientError>;

    /// Run one statement and return tab-separated rows without a header.
    fn query(&self, profile: &ConnectionProfile, statement: &str) -> Result<String, ClientError>;

    /// Write a self-contained dump of `database` to `destination`.
    fn dump(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        destination: &Path,
    ) -> Result<(), ClientError>;

    /// Execute the dump at `source` inside `database`.
    fn load(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        source: &Path,
    ) -> Result<(), ClientError>;
}

/// Raw tabular output of a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput(String);

impl QueryOutput {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    /// Non-empty lines split on tabs
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> {
        self.0
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split('\t').collect())
    }
}

/// Outcome of a liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Failed { role: Role, reason: String },
}

impl ConnectionStatus {
    pub fn into_result(self) -> SyncResult<()> {
        match self {
            ConnectionStatus::Connected => Ok(()),
            ConnectionStatus::Failed { role, reason } => {
                Err(SyncError::ConnectionFailure { role, reason })
            }
        }
    }
}

/// Owns the profiles for one run and routes every call to the right server.
pub struct ConnectionManager {
    profiles: HashMap<Role, ConnectionProfile>,
    client: Box<dyn DatabaseClient>,
    log: OperationLog,
}

impl ConnectionManager {
    pub fn new(client: Box<dyn DatabaseClient>, log: OperationLog) -> Self {
        Self {
            profiles: HashMap::new(),
            client,
            log,
        }
    }

    /// Register a profile, replacing any earlier one with the same role
    pub fn add_profile(&mut self, profile: ConnectionProfile) {
        self.log.register_secret(profile.credential().expose());
        self.profiles.insert(profile.role(), profile);
    }

    pub fn with_profile(mut self, profile: ConnectionProfile) -> Self {
        self.add_profile(profile);
        self
    }

    pub fn profile(&self, role: Role) -> SyncResult<&ConnectionProfile> {
        self.profiles.get(&role).ok_or_else(|| {
            SyncError::PreconditionFailure(format!("no {role} connection profile configured"))
        })
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    /// Probe a server. Expected failures come back as [`ConnectionStatus::Failed`].
    pub fn test_connection(&self, role: Role) -> ConnectionStatus {
        let profile = match self.profile(role) {
            Ok(p) => p,
            Err(e) => {
                return ConnectionStatus::Failed {
                    role,
                    reason: e.to_string(),
                }
            }
        };

        match self.client.ping(profile) {
            Ok(()) => {
                log::debug!("{} server {} is reachable", role, profile.endpoint());
                ConnectionStatus::Connected
            }
            Err(e) => {
                self.log.record(
                    Some(role),
                    &format!("connection test to {} failed: {}", profile.endpoint(), e),
                );
                ConnectionStatus::Failed {
                    role,
                    reason: e.message,
                }
            }
        }
    }

    /// Run a statement verbatim against one server
    pub fn execute(&self, role: Role, statement: &str) -> SyncResult<QueryOutput> {
        let profile = self.profile(role)?;
        self.log.record(Some(role), &format!("execute: {statement}"));

        self.client
            .query(profile, statement)
            .map(QueryOutput::new)
            .map_err(|e| {
                self.log
                    .record(Some(role), &format!("statement failed: {}", e.message));
                self.fold_error(role, e)
            })
    }

    /// Dump a database to a file. Errors are returned unfolded so callers can
    /// decide between retrying and reporting.
    pub fn dump(
        &self,
        role: Role,
        database: &DatabaseName,
        destination: &Path,
    ) -> SyncResult<Result<(), ClientError>> {
        let profile = self.profile(role)?;
        self.log.record(
            Some(role),
            &format!("dump `{}` to {}", database, destination.display()),
        );
        let result = self.client.dump(profile, database, destination);
        if let Err(e) = &result {
            self.log.record(Some(role), &format!("dump failed: {}", e.message));
        }
        Ok(result)
    }

    /// Load a dump file into a database
    pub fn load(
        &self,
        role: Role,
        database: &DatabaseName,
        source: &Path,
    ) -> SyncResult<Result<(), ClientError>> {
        let profile = self.profile(role)?;
        self.log.record(
            Some(role),
            &format!("load {} into `{}`", source.display(), database),
        );
        let result = self.client.load(profile, database, source);
        if let Err(e) = &result {
            self.log.record(Some(role), &format!("load failed: {}", e.message));
        }
        Ok(result)
    }

    fn fold_error(&self, role: Role, error: ClientError) -> SyncError {
        if error.is_connection() {
            SyncError::ConnectionFailure {
                role,
                reason: error.message,
            }
        } else {
            SyncError::QueryFailure {
                role,
                reason: error.message,
            }
        }
    }
}
