use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;
use crate::identifier::DatabaseName;
use crate::profile::Role;

/// Requested sync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Pull,
    Push,
    Bidirectional,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Pull => "pull",
            SyncMode::Push => "push",
            SyncMode::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pull" => Ok(SyncMode::Pull),
            "push" => Ok(SyncMode::Push),
            "bidirectional" | "both" => Ok(SyncMode::Bidirectional),
            other => Err(SyncError::PreconditionFailure(format!(
                "unknown sync direction '{other}' (expected pull, push or bidirectional)"
            ))),
        }
    }
}

/// A concrete transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote to local
    Pull,
    /// Local to remote
    Push,
}

impl Direction {
    pub fn source(&self) -> Role {
        match self {
            Direction::Pull => Role::Remote,
            Direction::Push => Role::Local,
        }
    }

    pub fn target(&self) -> Role {
        self.source().opposite()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
    pub mode: SyncMode,
    pub local_database: DatabaseName,
    pub remote_database: DatabaseName,
}

impl SyncOperation {
    pub fn new(mode: SyncMode, local_database: DatabaseName, remote_database: DatabaseName) -> Self {
        Self {
            mode,
            local_database,
            remote_database,
        }
    }

    /// Copy `remote_database` into `local_database`
    pub fn pull(remote_database: DatabaseName, local_database: DatabaseName) -> Self {
        Self::new(SyncMode::Pull, local_database, remote_database)
    }

    /// Copy `local_database` into `remote_database`
    pub fn push(local_database: DatabaseName, remote_database: DatabaseName) -> Self {
        Self::new(SyncMode::Push, local_database, remote_database)
    }

    pub fn bidirectional(local_database: DatabaseName, remote_database: DatabaseName) -> Self {
        Self::new(SyncMode::Bidirectional, local_database, remote_database)
    }

    /// The database name on a given side
    pub fn database(&self, role: Role) -> &DatabaseName {
        match role {
            Role::Local => &self.local_database,
            Role::Remote => &self.remote_database,
        }
    }

    /// Direction fixed by the mode, `None` for bidirectional
    pub fn fixed_direction(&self) -> Option<Direction> {
        match self.mode {
            SyncMode::Pull => Some(Direction::Pull),
            SyncMode::Push => Some(Direction::Push),
            SyncMode::Bidirectional => None,
        }
    }

    /// Key identifying the database pair across runs
    pub fn pair_key(&self) -> String {
        format!("{}<->{}", self.local_database, self.remote_database)
    }
}
