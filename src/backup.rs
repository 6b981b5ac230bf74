use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::artifact::{self, DumpKind};
use crate::connection::ConnectionManager;
use crate::error::{SyncError, SyncResult};
use crate::identifier::DatabaseName;
use crate::profile::Role;
use crate::schema::SchemaInspector;

/// A protective dump taken right before a destructive step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub database: String,
    pub role: Role,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

/// Makes destructive operations reversible.
///
/// Backups are written to `<backup_dir>/<role>/backup_<db>_<timestamp>.sql`
/// and are never deleted by this crate.
pub struct BackupService<'a> {
    connections: &'a ConnectionManager,
    backup_dir: PathBuf,
}

impl<'a> BackupService<'a> {
    pub fn new(connections: &'a ConnectionManager, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            connections,
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Back up `database` on `role` if it exists.
    ///
    /// Returns `Ok(None)` when there is nothing to protect. Any other outcome
    /// than a fsynced, non-empty dump is a [`SyncError::BackupFailure`], and
    /// the caller must not go on to overwrite the database.
    pub fn protect(&self, role: Role, database: &DatabaseName) -> SyncResult<Option<Backup>> {
        let exists = SchemaInspector::new(self.connections).database_exists(role, database)?;
        if !exists {
            log::info!("`{}` does not exist on {}; nothing to back up", database, role);
            return Ok(None);
        }

        self.snapshot(role, database).map(Some)
    }

    fn snapshot(&self, role: Role, database: &DatabaseName) -> SyncResult<Backup> {
        let failure = |reason: String| {
            self.connections.log().record(
                Some(role),
                &format!("backup of `{database}` failed: {reason}"),
            );
            SyncError::BackupFailure {
                role,
                database: database.to_string(),
                reason,
            }
        };

        let created_at = Local::now();
        let dir = self.backup_dir.join(role.as_str());
        let path = artifact::create_unique(&dir, DumpKind::Backup, database.as_str(), created_at)
            .map_err(|e| failure(format!("cannot create backup file in {}: {e}", dir.display())))?;

        if let Err(e) = self.connections.dump(role, database, &path)? {
            return Err(failure(format!("{e} (partial file at {})", path.display())));
        }

        let size_bytes = artifact::sync_and_measure(&path)
            .map_err(|e| failure(format!("backup {} is not usable: {e}", path.display())))?;

        self.connections.log().record(
            Some(role),
            &format!("backed up `{}` to {} ({} bytes)", database, path.display(), size_bytes),
        );

        Ok(Backup {
            path,
            database: database.to_string(),
            role,
            created_at,
            size_bytes,
        })
    }
}

/// Every backup under `backup_dir`, newest first
pub fn list_backups(backup_dir: &Path) -> Vec<Backup> {
    let mut backups: Vec<Backup> = [Role::Local, Role::Remote]
        .into_iter()
        .flat_map(|role| {
            WalkDir::new(backup_dir.join(role.as_str()))
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(move |entry| {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let (database, created_at) =
                        artifact::parse_dump_file_name(DumpKind::Backup, &name)?;
                    let size_bytes = fs::metadata(entry.path()).map(|m| m.len()).unwrap_or(0);
                    Some(Backup {
                        path: entry.path().to_path_buf(),
                        database,
                        role,
                        created_at,
                        size_bytes,
                    })
                })
        })
        .collect();

    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.path.cmp(&a.path)));
    backups
}

/// The newest backup of `database` on `role`, if any
pub fn latest_backup(backup_dir: &Path, role: Role, database: &str) -> Option<Backup> {
    list_backups(backup_dir)
        .into_iter()
        .find(|b| b.role == role && b.database == database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_backups_newest_first() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("local");
        let remote = temp.path().join("remote");
        fs::create_dir_all(&local).unwrap();
        fs::create_dir_all(&remote).unwrap();

        fs::write(local.join("backup_shop_20260101_100000.sql"), "-- a").unwrap();
        fs::write(local.join("backup_shop_20260102_100000.sql"), "-- b").unwrap();
        fs::write(remote.join("backup_crm_20260103_100000.sql"), "-- c").unwrap();
        fs::write(local.join("notes.txt"), "ignored").unwrap();

        let backups = list_backups(temp.path());
        assert_eq!(backups.len(), 3);
        assert_eq!(backups[0].database, "crm");
        assert_eq!(backups[0].role, Role::Remote);
        assert!(backups[1].path.ends_with("backup_shop_20260102_100000.sql"));

        let latest = latest_backup(temp.path(), Role::Local, "shop").unwrap();
        assert!(latest.path.ends_with("backup_shop_20260102_100000.sql"));
        assert!(latest_backup(temp.path(), Role::Remote, "shop").is_none());
    }

    #[test]
    fn test_list_backups_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_backups(&temp.path().join("nope")).is_empty());
    }
}
