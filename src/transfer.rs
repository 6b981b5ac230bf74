use chrono::Local;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::{self, Artifact, DumpKind};
use crate::connection::ConnectionManager;
use crate::error::{SyncError, SyncResult, TransferStage};
use crate::identifier::DatabaseName;
use crate::profile::Role;

/// Character set every created database gets, whatever the source used
pub const TARGET_CHARSET: &str = "utf8mb4";
pub const TARGET_COLLATION: &str = "utf8mb4_unicode_ci";

/// What to do with the destination database before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// Create the database if it does not exist yet
    pub create_if_missing: bool,
    /// Drop and recreate the database so no stale objects survive.
    /// Only safe after a backup of the target was taken.
    pub replace_existing: bool,
}

/// Moves one database between servers through a dump file.
pub struct TransferPipeline<'a> {
    connections: &'a ConnectionManager,
    artifact_dir: PathBuf,
    retries: u32,
    retry_delay: Duration,
}

impl<'a> TransferPipeline<'a> {
    pub fn new(connections: &'a ConnectionManager, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            connections,
            artifact_dir: artifact_dir.into(),
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    /// Retry a failed export `retries` more times, waiting `delay` in between
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    /// Dump `database` from `role` into a fresh artifact.
    ///
    /// Dumps run in a consistent-snapshot transaction so concurrent writers
    /// on the source do not tear the export. Connection failures are not
    /// retried; anything else is retried within the budget. The artifact of
    /// the last failed attempt is kept for inspection.
    pub fn export(&self, role: Role, database: &DatabaseName) -> SyncResult<Artifact> {
        let created_at = Local::now();
        let path = artifact::create_unique(
            &self.artifact_dir,
            DumpKind::Export,
            database.as_str(),
            created_at,
        )
        .map_err(|e| SyncError::TransferFailure {
            stage: TransferStage::Export,
            reason: format!(
                "cannot create artifact in {}: {e}",
                self.artifact_dir.display()
            ),
            artifact: None,
            backup: None,
        })?;

        let attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            let failure = match self.connections.dump(role, database, &path)? {
                Ok(()) => match artifact::sync_and_measure(&path) {
                    Ok(size_bytes) => {
                        log::info!(
                            "Exported `{}` from {} ({} bytes)",
                            database,
                            role,
                            size_bytes
                        );
                        return Ok(Artifact {
                            path,
                            database: database.to_string(),
                            source: role,
                            created_at,
                            size_bytes,
                        });
                    }
                    Err(e) => format!("artifact is not usable: {e}"),
                },
                Err(e) if e.is_connection() => {
                    return Err(self.export_failure(role, e.message, &path));
                }
                Err(e) => e.message,
            };

            if attempt >= attempts {
                return Err(self.export_failure(role, failure, &path));
            }

            log::warn!(
                "Export of `{}` failed (attempt {}/{}): {}; retrying in {}s",
                database,
                attempt,
                attempts,
                failure,
                self.retry_delay.as_secs()
            );
            // Start the next attempt from an empty file
            if let Err(e) = fs::write(&path, b"") {
                log::warn!("Failed to truncate {}: {}", path.display(), e);
            }
            std::thread::sleep(self.retry_delay);
            attempt += 1;
        }
    }

    /// Load an artifact into `database` on `role`.
    ///
    /// There is no rollback: a failure part way through leaves the target in
    /// whatever state the statements executed so far produced.
    pub fn import(
        &self,
        role: Role,
        database: &DatabaseName,
        artifact: &Artifact,
        options: ImportOptions,
    ) -> SyncResult<()> {
        let failure = |reason: String| {
            self.connections
                .log()
                .record(Some(role), &format!("import into `{database}` failed: {reason}"));
            SyncError::TransferFailure {
                stage: TransferStage::Import,
                reason,
                artifact: Some(artifact.path.clone()),
                backup: None,
            }
        };

        if options.replace_existing {
            self.connections
                .execute(role, &format!("DROP DATABASE IF EXISTS {}", database.quoted()))
                .map_err(|e| failure(e.to_string()))?;
        }

        if options.create_if_missing || options.replace_existing {
            self.connections
                .execute(
                    role,
                    &format!(
                        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
                        database.quoted(),
                        TARGET_CHARSET,
                        TARGET_COLLATION
                    ),
                )
                .map_err(|e| failure(e.to_string()))?;
        }

        if let Err(e) = self.connections.load(role, database, &artifact.path)? {
            return Err(failure(e.message));
        }

        log::info!("Imported {} into `{}` on {}", artifact.path.display(), database, role);
        Ok(())
    }

    /// Remove an artifact after the operation that consumed it succeeded
    pub fn discard(&self, artifact: &Artifact) -> SyncResult<()> {
        fs::remove_file(&artifact.path).map_err(|e| SyncError::TransferFailure {
            stage: TransferStage::Import,
            reason: format!("transfer succeeded but the artifact could not be removed: {e}"),
            artifact: Some(artifact.path.clone()),
            backup: None,
        })
    }

    fn export_failure(&self, role: Role, reason: String, path: &std::path::Path) -> SyncError {
        self.connections
            .log()
            .record(Some(role), &format!("export failed: {reason}"));

        // An empty placeholder tells nobody anything
        let retained = match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Some(path.to_path_buf()),
            Ok(_) => {
                if let Err(e) = fs::remove_file(path) {
                    log::warn!("Failed to remove empty artifact {}: {}", path.display(), e);
                }
                None
            }
            Err(_) => None,
        };

        SyncError::TransferFailure {
            stage: TransferStage::Export,
            reason,
            artifact: retained,
            backup: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ClientError, ClientErrorKind, DatabaseClient};
    use crate::logger::OperationLog;
    use crate::profile::{ConnectionProfile, Credential};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Fails the first `failures` dumps, then writes a small dump
    struct FlakyDumper {
        failures: u32,
        kind: ClientErrorKind,
        calls: Arc<AtomicU32>,
        statements: Arc<Mutex<Vec<String>>>,
    }

    impl DatabaseClient for FlakyDumper {
        fn ping(&self, _: &ConnectionProfile) -> Result<(), ClientError> {
            Ok(())
        }

        fn query(&self, _: &ConnectionProfile, statement: &str) -> Result<String, ClientError> {
            self.statements.lock().unwrap().push(statement.to_string());
            Ok(String::new())
        }

        fn dump(&self, _: &ConnectionProfile, _: &DatabaseName, destination: &Path) -> Result<(), ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                fs::write(destination, "-- partial").unwrap();
                return Err(ClientError::new(self.kind, "Lock wait timeout exceeded"));
            }
            fs::write(destination, "-- dump\nCREATE TABLE t (id INT);\n").unwrap();
            Ok(())
        }

        fn load(&self, _: &ConnectionProfile, _: &DatabaseName, _: &Path) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct Fixture {
        manager: ConnectionManager,
        calls: Arc<AtomicU32>,
        statements: Arc<Mutex<Vec<String>>>,
        dir: TempDir,
    }

    fn fixture(failures: u32, kind: ClientErrorKind) -> Fixture {
        let calls = Arc::new(AtomicU32::new(0));
        let statements = Arc::new(Mutex::new(Vec::new()));
        let client = FlakyDumper {
            failures,
            kind,
            calls: calls.clone(),
            statements: statements.clone(),
        };
        let profile =
            ConnectionProfile::new(Role::Remote, "db", 3306, "root", Credential::new("pw")).unwrap();
        Fixture {
            manager: ConnectionManager::new(Box::new(client), OperationLog::console_only())
                .with_profile(profile),
            calls,
            statements,
            dir: TempDir::new().unwrap(),
        }
    }

    fn shop() -> DatabaseName {
        DatabaseName::parse("shop").unwrap()
    }

    #[test]
    fn test_export_retries_within_budget() {
        let f = fixture(2, ClientErrorKind::Statement);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path()).with_retries(2, Duration::ZERO);

        let artifact = pipeline.export(Role::Remote, &shop()).unwrap();
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert_eq!(artifact.source, Role::Remote);
        assert_eq!(artifact.database, "shop");
        assert!(artifact.size_bytes > 0);
        assert!(artifact
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("export_shop_"));
    }

    #[test]
    fn test_export_gives_up_and_keeps_artifact() {
        let f = fixture(5, ClientErrorKind::Statement);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path()).with_retries(1, Duration::ZERO);

        let err = pipeline.export(Role::Remote, &shop()).unwrap_err();
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
        match err {
            SyncError::TransferFailure {
                stage: TransferStage::Export,
                artifact: Some(path),
                ..
            } => assert!(path.exists()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_export_does_not_retry_connection_failures() {
        let f = fixture(5, ClientErrorKind::Connection);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path()).with_retries(3, Duration::ZERO);

        assert!(pipeline.export(Role::Remote, &shop()).is_err());
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_replace_drops_then_creates() {
        let f = fixture(0, ClientErrorKind::Statement);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path());
        let artifact = pipeline.export(Role::Remote, &shop()).unwrap();

        pipeline
            .import(
                Role::Remote,
                &shop(),
                &artifact,
                ImportOptions {
                    create_if_missing: true,
                    replace_existing: true,
                },
            )
            .unwrap();

        let statements = f.statements.lock().unwrap();
        assert_eq!(statements[0], "DROP DATABASE IF EXISTS `shop`");
        assert_eq!(
            statements[1],
            "CREATE DATABASE IF NOT EXISTS `shop` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
        );
    }

    #[test]
    fn test_import_without_options_runs_no_ddl() {
        let f = fixture(0, ClientErrorKind::Statement);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path());
        let artifact = pipeline.export(Role::Remote, &shop()).unwrap();

        pipeline
            .import(Role::Remote, &shop(), &artifact, ImportOptions::default())
            .unwrap();
        assert!(f.statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_discard_removes_artifact() {
        let f = fixture(0, ClientErrorKind::Statement);
        let pipeline = TransferPipeline::new(&f.manager, f.dir.path());
        let artifact = pipeline.export(Role::Remote, &shop()).unwrap();

        pipeline.discard(&artifact).unwrap();
        assert!(!artifact.path.exists());
    }
}
