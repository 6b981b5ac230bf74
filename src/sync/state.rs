use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Modification times observed on both sides right after a bidirectional
/// transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairBaseline {
    pub local_modified: Option<DateTime<Utc>>,
    pub remote_modified: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

impl PairBaseline {
    /// Both sides still report what they reported after the last sync
    pub fn matches(
        &self,
        local_modified: Option<DateTime<Utc>>,
        remote_modified: Option<DateTime<Utc>>,
    ) -> bool {
        self.local_modified == local_modified && self.remote_modified == remote_modified
    }
}

/// Per-pair baselines persisted between runs.
///
/// An import bumps the target's update time past the source's, so without a
/// baseline the next bidirectional run would bounce the data straight back.
/// The store only ever adds a "nothing changed" answer; it never picks a
/// direction.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub pairs: HashMap<String, PairBaseline>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl SyncState {
    /// Load from `path`, or start empty if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        let mut state = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read sync state: {}", path.display()))?;
            serde_json::from_str::<SyncState>(&content).context("Failed to parse sync state")?
        } else {
            SyncState::default()
        };
        state.path = Some(path.to_path_buf());
        Ok(state)
    }

    /// In-memory state that is never written
    pub fn ephemeral() -> Self {
        Self::default()
    }

    pub fn baseline(&self, pair: &str) -> Option<&PairBaseline> {
        self.pairs.get(pair)
    }

    pub fn record(&mut self, pair: &str, baseline: PairBaseline) -> Result<()> {
        self.pairs.insert(pair.to_string(), baseline);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize sync state")?;
        fs::write(path, content).context("Failed to write sync state")?;

        Ok(())
    }
}
