//! Read-only questions about what lives on a server.

use chrono::{DateTime, Utc};

use crate::connection::ConnectionManager;
use crate::error::{SyncError, SyncResult};
use crate::identifier::{is_system_database, DatabaseName};
use crate::profile::Role;

pub struct SchemaInspector<'a> {
    connections: &'a ConnectionManager,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(connections: &'a ConnectionManager) -> Self {
        Self { connections }
    }

    /// Whether `database` exists on the server.
    ///
    /// A connection failure is an error. Anything else that makes the answer
    /// unclear (a rejected metadata query, unexpected rows) counts as
    /// "does not exist".
    pub fn database_exists(&self, role: Role, database: &DatabaseName) -> SyncResult<bool> {
        let statement = format!(
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {}",
            database.literal()
        );

        let output = match self.connections.execute(role, &statement) {
            Ok(output) => output,
            Err(e @ SyncError::ConnectionFailure { .. }) => return Err(e),
            Err(e) => {
                log::warn!("Could not determine whether `{}` exists on {}: {}", database, role, e);
                return Ok(false);
            }
        };

        let rows: Vec<_> = output.rows().collect();
        match rows.as_slice() {
            [] => Ok(false),
            // The server's collation already matched the row; on case-folding
            // servers it may come back in a different case
            [row]
                if row
                    .first()
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case(database.as_str())) =>
            {
                Ok(true)
            }
            _ => {
                log::warn!(
                    "Ambiguous metadata for `{}` on {}: {:?}",
                    database,
                    role,
                    output.raw()
                );
                Ok(false)
            }
        }
    }

    /// Most recent table update time in `database`.
    ///
    /// `None` means the database has no tables or the server does not track
    /// update times. Callers comparing freshness must treat `None` as older
    /// than any timestamp, which is exactly how `Option`'s ordering behaves.
    pub fn last_modified(
        &self,
        role: Role,
        database: &DatabaseName,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        let statement = format!(
            "SELECT UNIX_TIMESTAMP(MAX(UPDATE_TIME)) FROM information_schema.TABLES WHERE TABLE_SCHEMA = {}",
            database.literal()
        );

        let output = match self.connections.execute(role, &statement) {
            Ok(output) => output,
            Err(e @ SyncError::ConnectionFailure { .. }) => return Err(e),
            Err(e) => {
                log::warn!("Could not read modification time of `{}` on {}: {}", database, role, e);
                return Ok(None);
            }
        };

        let value = output
            .rows()
            .next()
            .and_then(|row| row.first().map(|v| v.trim().to_string()));

        Ok(value.as_deref().and_then(parse_unix_timestamp))
    }

    /// User databases on the server, sorted by name
    pub fn list_databases(&self, role: Role) -> SyncResult<Vec<String>> {
        let output = self.connections.execute(role, "SHOW DATABASES")?;

        let mut names: Vec<String> = output
            .rows()
            .filter_map(|row| row.first().map(|v| v.trim().to_string()))
            .filter(|name| !name.is_empty() && !is_system_database(name))
            .collect();
        names.sort();
        names.dedup();

        Ok(names)
    }
}

/// Parse `UNIX_TIMESTAMP` output such as `1700000000` or `1700000000.000000`
fn parse_unix_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.eq_ignore_ascii_case("NULL") || value.is_empty() {
        return None;
    }
    let seconds = value.split('.').next()?.parse::<i64>().ok()?;
    if seconds <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds, 0)
}
