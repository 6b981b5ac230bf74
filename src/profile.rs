use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Which side of a sync a profile describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The server this tool runs next to
    Local,
    /// The server reached over the network
    Remote,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Local => "local",
            Role::Remote => "remote",
        }
    }

    /// The role on the other end of a transfer
    pub fn opposite(&self) -> Role {
        match self {
            Role::Local => Role::Remote,
            Role::Remote => Role::Local,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret that never shows up in `Debug` output or logs
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret. Only the client backend's option file should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// How to reach one database server.
///
/// Immutable once built. The only way to get one is [`ConnectionProfile::new`]
/// or loading a persisted profile file, both of which validate the fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    role: Role,
    host: String,
    port: u16,
    username: String,
    credential: Credential,
    saved: bool,
}

/// On-disk form of a profile: flat `key = value` pairs
#[derive(Serialize, Deserialize)]
struct StoredProfile {
    host: String,
    port: u16,
    username: String,
    credential: String,
}

pub const DEFAULT_PORT: u16 = 3306;

impl ConnectionProfile {
    pub fn new(
        role: Role,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        credential: Credential,
    ) -> Result<Self> {
        let host = host.into().trim().to_string();
        let username = username.into().trim().to_string();

        if host.is_empty() {
            return Err(anyhow!("{role} profile: host must not be empty"));
        }
        if port == 0 {
            return Err(anyhow!("{role} profile: port must be between 1 and 65535"));
        }
        if username.is_empty() {
            return Err(anyhow!("{role} profile: username must not be empty"));
        }

        Ok(Self {
            role,
            host,
            port,
            username,
            credential,
            saved: false,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Whether this profile came from, or was written to, a config file
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// `user@host:port`, safe for logs and summaries
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// Load a persisted profile.
    ///
    /// Returns `Ok(None)` when the file does not exist. On Unix a file that is
    /// readable by group or others is refused rather than trusted.
    pub fn load(role: Role, path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = fs::metadata(path)
                .with_context(|| format!("Failed to stat profile file: {}", path.display()))?
                .permissions()
                .mode();
            if mode & 0o077 != 0 {
                log::warn!(
                    "Ignoring {} profile {}: permissions {:o} are too open (expected 600)",
                    role,
                    path.display(),
                    mode & 0o777
                );
                return Ok(None);
            }
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
        let stored: StoredProfile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile file: {}", path.display()))?;

        let mut profile = Self::new(
            role,
            stored.host,
            stored.port,
            stored.username,
            Credential::new(stored.credential),
        )?;
        profile.saved = true;

        Ok(Some(profile))
    }

    /// Persist this profile with owner-only permissions, returning the saved copy
    pub fn save(&self, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let stored = StoredProfile {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            credential: self.credential.expose().to_string(),
        };
        let content = toml::to_string(&stored).context("Failed to serialize profile")?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to open profile file: {}", path.display()))?;

        // The mode above only applies to newly created files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
        }

        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write profile file: {}", path.display()))?;

        let mut saved = self.clone();
        saved.saved = true;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(role: Role) -> ConnectionProfile {
        ConnectionProfile::new(role, "db.example.com", 3307, "admin", Credential::new("s3cr3t"))
            .unwrap()
    }

    #[test]
    fn test_debug_never_shows_credential() {
        let debug = format!("{:?}", sample(Role::Remote));
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_endpoint_excludes_credential() {
        let profile = sample(Role::Local);
        assert_eq!(profile.endpoint(), "admin@db.example.com:3307");
    }

    #[test]
    fn test_rejects_incomplete_profiles() {
        assert!(ConnectionProfile::new(Role::Local, " ", 3306, "root", Credential::new("")).is_err());
        assert!(ConnectionProfile::new(Role::Local, "localhost", 0, "root", Credential::new("")).is_err());
        assert!(ConnectionProfile::new(Role::Local, "localhost", 3306, "", Credential::new("")).is_err());
    }

    #[test]
    fn test_role_helpers() {
        assert_eq!(Role::Local.opposite(), Role::Remote);
        assert_eq!(Role::Remote.to_string(), "remote");
        assert_eq!(serde_json::to_string(&Role::Local).unwrap(), r#""local""#);
    }

    #[test]
    fn test_role_name_outlives_role() {
        let scope: &'static str = Some(Role::Remote).map(|r| r.as_str()).unwrap_or("-");
        assert_eq!(scope, "remote");
    }

    #[test]
    fn test_save_and_load_round_trip() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("local-connection.toml");

        let saved = sample(Role::Local).save(&path)?;
        assert!(saved.is_saved());

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("host = \"db.example.com\""));
        assert!(content.contains("port = 3307"));

        let loaded = ConnectionProfile::load(Role::Local, &path)?.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.credential().expose(), "s3cr3t");
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_none() -> Result<()> {
        let temp = TempDir::new()?;
        assert!(ConnectionProfile::load(Role::Local, &temp.path().join("nope.toml"))?.is_none());
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_saved_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let path = temp.path().join("profile.toml");
        fs::write(&path, "stale")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        sample(Role::Local).save(&path)?;
        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_world_readable_profile_is_ignored() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let path = temp.path().join("profile.toml");
        sample(Role::Local).save(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        assert!(ConnectionProfile::load(Role::Local, &path)?.is_none());
        Ok(())
    }
}
