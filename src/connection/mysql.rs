//! MySQL backend using the `mysql` and `mysqldump` command-line clients.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

use super::{ClientError, ClientErrorKind, DatabaseClient};
use crate::config::Settings;
use crate::identifier::DatabaseName;
use crate::profile::ConnectionProfile;

/// Options that make a dump self-contained and portable.
const DUMP_OPTIONS: &[&str] = &[
    "--single-transaction",
    "--quick",
    "--routines",
    "--triggers",
    "--events",
    "--hex-blob",
    "--no-tablespaces",
    "--default-character-set=utf8mb4",
];

/// Backend that shells out to the MySQL client utilities.
///
/// Credentials are written to a short-lived option file readable only by the
/// current user and passed as `--defaults-extra-file`, so they never appear
/// in argv or the environment of the child process.
pub struct MysqlCli {
    mysql_bin: String,
    mysqldump_bin: String,
    connect_timeout_secs: u64,
}

impl MysqlCli {
    pub fn new(settings: &Settings) -> Self {
        Self {
            mysql_bin: settings.mysql_bin.clone(),
            mysqldump_bin: settings.mysqldump_bin.clone(),
            connect_timeout_secs: settings.connect_timeout_secs,
        }
    }

    /// Write the `[client]` option file for one invocation.
    fn option_file(profile: &ConnectionProfile) -> Result<NamedTempFile, ClientError> {
        let io_err = |e: std::io::Error| {
            ClientError::new(
                ClientErrorKind::Io,
                format!("Failed to write client option file: {e}"),
            )
        };

        // NamedTempFile is created with mode 0600 on Unix
        let mut file = NamedTempFile::new().map_err(io_err)?;
        write!(file, "{}", render_option_file(profile)).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(file)
    }

    /// Run a client program and return stdout.
    fn run(
        &self,
        program: &str,
        profile: &ConnectionProfile,
        args: &[String],
        stdin: Option<File>,
    ) -> Result<String, ClientError> {
        let options = Self::option_file(profile)?;

        let mut command = Command::new(program);
        // --defaults-extra-file must come first
        command
            .arg(format!("--defaults-extra-file={}", options.path().display()))
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match stdin {
            Some(file) => command.stdin(Stdio::from(file)),
            None => command.stdin(Stdio::null()),
        };

        let output = command.output().map_err(|e| {
            ClientError::new(ClientErrorKind::Io, format!("Failed to run '{program}': {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ClientError::new(
                classify(&stderr),
                format!("{program} failed: {stderr}"),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn connect_timeout_arg(&self) -> String {
        format!("--connect-timeout={}", self.connect_timeout_secs)
    }
}

impl DatabaseClient for MysqlCli {
    fn ping(&self, profile: &ConnectionProfile) -> Result<(), ClientError> {
        self.query(profile, "SELECT 1").map(|_| ())
    }

    fn query(&self, profile: &ConnectionProfile, statement: &str) -> Result<String, ClientError> {
        let args = vec![
            self.connect_timeout_arg(),
            "--batch".to_string(),
            "--skip-column-names".to_string(),
            "--default-character-set=utf8mb4".to_string(),
            "-e".to_string(),
            statement.to_string(),
        ];
        self.run(&self.mysql_bin, profile, &args, None)
    }

    fn dump(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        destination: &Path,
    ) -> Result<(), ClientError> {
        let mut args: Vec<String> = DUMP_OPTIONS.iter().map(|s| s.to_string()).collect();
        args.push(format!("--result-file={}", destination.display()));
        args.push(database.as_str().to_string());

        self.run(&self.mysqldump_bin, profile, &args, None)?;
        Ok(())
    }

    fn load(
        &self,
        profile: &ConnectionProfile,
        database: &DatabaseName,
        source: &Path,
    ) -> Result<(), ClientError> {
        let input = File::open(source).map_err(|e| {
            ClientError::new(
                ClientErrorKind::Io,
                format!("Failed to open {}: {e}", source.display()),
            )
        })?;

        let args = vec![
            self.connect_timeout_arg(),
            "--batch".to_string(),
            "--default-character-set=utf8mb4".to_string(),
            database.as_str().to_string(),
        ];
        self.run(&self.mysql_bin, profile, &args, Some(input))?;
        Ok(())
    }
}

fn render_option_file(profile: &ConnectionProfile) -> String {
    format!(
        "[client]\nhost={}\nport={}\nuser={}\npassword={}\n",
        option_value(profile.host()),
        profile.port(),
        option_value(profile.username()),
        option_value(profile.credential().expose()),
    )
}

/// Quote a value for a MySQL option file
fn option_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Map client stderr to an error kind using the numeric error code.
///
/// `mysql` reports `ERROR 2003 (HY000): ...`, `mysqldump` reports
/// `mysqldump: Got error: 1045: ...`. Codes 2000-2999 are client-side
/// connection errors.
fn classify(stderr: &str) -> ClientErrorKind {
    let code = error_code_after(stderr, "ERROR ").or_else(|| error_code_after(stderr, "Got error: "));

    match code {
        Some(1045) | Some(1698) => ClientErrorKind::Authentication,
        Some(2013) if stderr.contains("timeout") => ClientErrorKind::Timeout,
        Some(2000..=2999) => ClientErrorKind::Connection,
        Some(_) => ClientErrorKind::Statement,
        None if stderr.contains("No space left on device") => ClientErrorKind::Io,
        None => ClientErrorKind::Statement,
    }
}

fn error_code_after(text: &str, marker: &str) -> Option<u32> {
    let start = text.find(marker)? + marker.len();
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
