//! In-memory MySQL stand-in for orchestrator tests.
//!
//! Each server is keyed by the profile host. Dumps are JSON snapshots of a
//! database written to the real destination file, and loads replace the
//! target's tables with the snapshot while stamping a fresh update time, the
//! way a real import bumps `UPDATE_TIME`.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use db_clone_sync::backup::BackupService;
use db_clone_sync::connection::{ClientError, ClientErrorKind, ConnectionManager, DatabaseClient};
use db_clone_sync::identifier::DatabaseName;
use db_clone_sync::logger::OperationLog;
use db_clone_sync::profile::{ConnectionProfile, Credential, Role};
use db_clone_sync::sync::{Confirmation, SyncOrchestrator};
use db_clone_sync::transfer::TransferPipeline;
use db_clone_sync::SyncResult;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const LOCAL_HOST: &str = "local-db";
pub const REMOTE_HOST: &str = "remote-db";
pub const LOCAL_SECRET: &str = "local-pass-123";
pub const REMOTE_SECRET: &str = "remote-pass-456";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeTable {
    pub rows: u64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeDatabase {
    pub tables: BTreeMap<String, FakeTable>,
}

impl FakeDatabase {
    pub fn row_count(&self) -> u64 {
        self.tables.values().map(|t| t.rows).sum()
    }

    fn last_modified(&self) -> Option<i64> {
        self.tables.values().filter_map(|t| t.updated_at).max()
    }
}

#[derive(Default)]
struct FakeServer {
    databases: BTreeMap<String, FakeDatabase>,
    unreachable: bool,
    fail_dumps: bool,
    fail_loads: bool,
    /// Answer this many SCHEMATA lookups, then reject the rest
    schema_lookups_left: Option<usize>,
    dumps: Vec<String>,
    loads: Vec<String>,
}

struct ClusterState {
    servers: HashMap<String, FakeServer>,
    clock: i64,
}

#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let mut servers = HashMap::new();
        servers.insert(LOCAL_HOST.to_string(), FakeServer::default());
        servers.insert(REMOTE_HOST.to_string(), FakeServer::default());
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                servers,
                clock: 1_800_000_000,
            })),
        }
    }

    fn with_server<T>(&self, host: &str, f: impl FnOnce(&mut FakeServer) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let server = state.servers.get_mut(host).expect("unknown fake host");
        f(server)
    }

    /// Advance the clock and return the new time
    pub fn tick(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.clock += 60;
        state.clock
    }

    /// Create a database whose tables were last written at `updated_at`
    pub fn add_database(&self, host: &str, name: &str, tables: &[(&str, u64)], updated_at: Option<i64>) {
        let db = FakeDatabase {
            tables: tables
                .iter()
                .map(|(table, rows)| {
                    (
                        table.to_string(),
                        FakeTable {
                            rows: *rows,
                            updated_at,
                        },
                    )
                })
                .collect(),
        };
        self.with_server(host, |s| s.databases.insert(name.to_string(), db));
    }

    /// Simulate a client writing rows into a table now
    pub fn write_rows(&self, host: &str, database: &str, table: &str, rows: u64) {
        let now = self.tick();
        self.with_server(host, |s| {
            let db = s.databases.entry(database.to_string()).or_default();
            db.tables.insert(
                table.to_string(),
                FakeTable {
                    rows,
                    updated_at: Some(now),
                },
            );
        });
    }

    pub fn database(&self, host: &str, name: &str) -> Option<FakeDatabase> {
        self.with_server(host, |s| s.databases.get(name).cloned())
    }

    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        self.with_server(host, |s| s.unreachable = unreachable);
    }

    pub fn set_fail_dumps(&self, host: &str, fail: bool) {
        self.with_server(host, |s| s.fail_dumps = fail);
    }

    pub fn set_fail_loads(&self, host: &str, fail: bool) {
        self.with_server(host, |s| s.fail_loads = fail);
    }

    pub fn fail_schema_lookups_after(&self, host: &str, answered: usize) {
        self.with_server(host, |s| s.schema_lookups_left = Some(answered));
    }

    pub fn dumps(&self, host: &str) -> Vec<String> {
        self.with_server(host, |s| s.dumps.clone())
    }

    pub fn loads(&self, host: &str) -> Vec<String> {
        self.with_server(host, |s| s.loads.clone())
    }
}

fn unreachable_error(host: &str) -> ClientError {
    ClientError::new(
        ClientErrorKind::Connection,
        format!("ERROR 2003 (HY000): Can't connect to MySQL server on '{host}' (111)"),
    )
}

/// Text between the first pair of `open`/`close` delimiters after `start`
fn between<'s>(text: &'s str, open: char, close: char) -> Option<&'s str> {
    let start = text.find(open)? + 1;
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

impl DatabaseClient for FakeCluster {
    fn ping(&self, profile: &ConnectionProfile) -> Result<(), ClientError> {
        self.query(profile, "SELECT 1").map(|_| ())
    }

    fn query(&self, profile: &ConnectionProfile, statement: &str) -> Result<String, ClientError> {
        let host = profile.host().to_string();
        self.with_server(&host, |s| {
            if s.unreachable {
                return Err(unreachable_error(&host));
            }

            if statement == "SELECT 1" {
                return Ok("1\n".to_string());
            }

            if statement == "SHOW DATABASES" {
                let mut out = String::from("information_schema\nmysql\nperformance_schema\nsys\n");
                for name in s.databases.keys() {
                    out.push_str(name);
                    out.push('\n');
                }
                return Ok(out);
            }

            if statement.starts_with("SELECT SCHEMA_NAME FROM information_schema.SCHEMATA") {
                match s.schema_lookups_left {
                    Some(0) => {
                        return Err(ClientError::new(
                            ClientErrorKind::Statement,
                            "ERROR 1142 (42000): SELECT command denied on table 'SCHEMATA'",
                        ))
                    }
                    Some(n) => s.schema_lookups_left = Some(n - 1),
                    None => {}
                }
                let name = between(statement, '\'', '\'').unwrap_or_default();
                return Ok(if s.databases.contains_key(name) {
                    format!("{name}\n")
                } else {
                    String::new()
                });
            }

            if statement.starts_with("SELECT UNIX_TIMESTAMP(MAX(UPDATE_TIME))") {
                let name = between(statement, '\'', '\'').unwrap_or_default();
                let value = s
                    .databases
                    .get(name)
                    .and_then(|db| db.last_modified())
                    .map(|ts| format!("{ts}.000000"))
                    .unwrap_or_else(|| "NULL".to_string());
                return Ok(format!("{value}\n"));
            }

            if let Some(rest) = statement.strip_prefix("DROP DATABASE IF EXISTS ") {
                let name = between(rest, '`', '`').unwrap_or_default();
                s.databases.remove(name);
                return Ok(String::new());
            }

            if let Some(rest) = statement.strip_prefix("CREATE DATABASE IF NOT EXISTS ") {
                let name = between(rest, '`', '`').unwrap_or_default();
                s.databases.entry(name.to_string()).or_default();
                return Ok(String::new());
            }

            Err(ClientError::new(
                ClientErrorKind::Statement,
                format!("ERROR 1064 (42000): unsupported statement: {statement}"),
            ))
        })
    }

    fn dump(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        destination: &Path,
    ) -> Result<(), ClientError> {
        let host = profile.host().to_string();
        self.with_server(&host, |s| {
            if s.unreachable {
                return Err(unreachable_error(&host));
            }
            s.dumps.push(database.to_string());

            if s.fail_dumps {
                return Err(ClientError::new(
                    ClientErrorKind::Io,
                    "mysqldump: Error: 'No space left on device' when writing",
                ));
            }

            let db = s.databases.get(database.as_str()).ok_or_else(|| {
                ClientError::new(
                    ClientErrorKind::Statement,
                    format!("mysqldump: Got error: 1049: Unknown database '{database}'"),
                )
            })?;

            let json = serde_json::to_string(db).unwrap();
            fs::write(destination, json)
                .map_err(|e| ClientError::new(ClientErrorKind::Io, e.to_string()))
        })
    }

    fn load(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        source: &Path,
    ) -> Result<(), ClientError> {
        let host = profile.host().to_string();
        let now = self.tick();
        self.with_server(&host, |s| {
            if s.unreachable {
                return Err(unreachable_error(&host));
            }
            s.loads.push(database.to_string());

            if s.fail_loads {
                return Err(ClientError::new(
                    ClientErrorKind::Statement,
                    "ERROR 1142 (42000) at line 12: CREATE command denied",
                ));
            }

            let content = fs::read_to_string(source)
                .map_err(|e| ClientError::new(ClientErrorKind::Io, e.to_string()))?;
            let snapshot: FakeDatabase = serde_json::from_str(&content)
                .map_err(|e| ClientError::new(ClientErrorKind::Statement, e.to_string()))?;

            let target = s.databases.get_mut(database.as_str()).ok_or_else(|| {
                ClientError::new(
                    ClientErrorKind::Statement,
                    format!("ERROR 1049 (42000): Unknown database '{database}'"),
                )
            })?;

            for (name, table) in snapshot.tables {
                target.tables.insert(
                    name,
                    FakeTable {
                        rows: table.rows,
                        updated_at: Some(now),
                    },
                );
            }
            Ok(())
        })
    }
}

/// Always answers the same way and counts how often it was asked
pub struct ScriptedConfirmation {
    pub answer: bool,
    pub asked: Mutex<Vec<(Role, String)>>,
}

impl ScriptedConfirmation {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

impl Confirmation for ScriptedConfirmation {
    fn confirm_overwrite(&self, role: Role, database: &DatabaseName) -> SyncResult<bool> {
        self.asked
            .lock()
            .unwrap()
            .push((role, database.to_string()));
        Ok(self.answer)
    }
}

/// Everything an orchestrator test needs, rooted in one temp directory
pub struct Harness {
    pub cluster: FakeCluster,
    pub manager: ConnectionManager,
    pub root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let cluster = FakeCluster::new();
        let log = OperationLog::new(root.path().join("operations.log"));

        let local = ConnectionProfile::new(
            Role::Local,
            LOCAL_HOST,
            3306,
            "root",
            Credential::new(LOCAL_SECRET),
        )
        .unwrap();
        let remote = ConnectionProfile::new(
            Role::Remote,
            REMOTE_HOST,
            3306,
            "deploy",
            Credential::new(REMOTE_SECRET),
        )
        .unwrap();

        let manager = ConnectionManager::new(Box::new(cluster.clone()), log)
            .with_profile(local)
            .with_profile(remote);

        Self {
            cluster,
            manager,
            root,
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.path().join("backups")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root.path().join("artifacts")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join("sync-state.json")
    }

    pub fn log_contents(&self) -> String {
        fs::read_to_string(self.root.path().join("operations.log")).unwrap_or_default()
    }

    pub fn orchestrator<'a>(&'a self, confirmation: &'a dyn Confirmation) -> SyncOrchestrator<'a> {
        SyncOrchestrator::new(
            &self.manager,
            BackupService::new(&self.manager, self.backup_dir()),
            TransferPipeline::new(&self.manager, self.artifact_dir()),
            confirmation,
        )
    }

    /// Files currently sitting in a directory (empty if it does not exist)
    pub fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }
}

pub fn name(s: &str) -> DatabaseName {
    DatabaseName::parse(s).unwrap()
}
