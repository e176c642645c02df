use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::candidate::{Candidate, ScrapeStats};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_SESSIONS_DIR: &str = "sessions";

const TEMP_FILE_SUFFIX: &str = ".tmp";
const STATS_FILE: &str = "scraping_stats.json";
const PROGRESS_FILE: &str = "adding_progress.json";

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Durable checkpoint of a dispatcher run; rewritten whole on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub timestamp: String,
    pub added_members: Vec<Candidate>,
    pub daily_stats: serde_json::Map<String, serde_json::Value>,
}

/// The `data/` directory shared by the collector and the dispatcher.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))
    }

    pub fn members_path(&self, group_source: &str) -> PathBuf {
        self.root.join(format!("members_{group_source}.json"))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.root.join(STATS_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    pub fn save_members(&self, group_source: &str, records: &[Candidate]) -> Result<PathBuf> {
        let path = self.members_path(group_source);
        write_json(&path, records)?;
        Ok(path)
    }

    pub fn load_members(&self, group_source: &str) -> Result<Vec<Candidate>> {
        read_json(&self.members_path(group_source))
    }

    pub fn save_stats(&self, stats: &ScrapeStats) -> Result<()> {
        write_json(&self.stats_path(), stats)
    }

    pub fn save_progress(&self, progress: &ProgressRecord) -> Result<()> {
        write_json(&self.progress_path(), progress)
    }

    pub fn load_progress(&self) -> Result<ProgressRecord> {
        read_json(&self.progress_path())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Pretty-prints with a 4-space indent, then swaps the file in with a rename.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value.serialize(&mut serializer)?;

    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
