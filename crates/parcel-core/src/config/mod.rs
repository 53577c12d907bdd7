//! Engine configuration (`parcel.toml`).
//!
//! ```toml
//! [staging]
//! root = "/var/cache/parcel/staging"
//!
//! [commit]
//! workers = 2
//!
//! [locks]
//! read_timeout_secs = 60
//!
//! [deploy]
//! refresh_snapshots = true
//! ```

mod parser;

pub use parser::{parse_engine_toml, parse_engine_toml_str, to_toml};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "parcel.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub commit: CommitConfig,
    #[serde(default)]
    pub locks: LockConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Parent directory of per-deployment staging areas.
    #[serde(default = "default_staging_root")]
    pub root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: default_staging_root(),
        }
    }
}

fn default_staging_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("parcel")
        .join("staging")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Threads serving delayed commits.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long an execution waits for a package read lock.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_read_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Rewrite snapshot blobs when the repository has newer content.
    #[serde(default = "default_true")]
    pub refresh_snapshots: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            refresh_snapshots: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        parse_engine_toml(path)
    }

    /// `<config dir>/parcel/parcel.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parcel").join(CONFIG_FILE_NAME))
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging.root = root.into();
        self
    }

    pub fn with_commit_workers(mut self, workers: usize) -> Self {
        self.commit.workers = workers;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.locks.read_timeout_secs = timeout.as_secs();
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.locks.read_timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.commit.workers == 0 {
            anyhow::bail!("commit.workers must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::load(&temp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.commit.workers, 2);
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        assert!(config.deploy.refresh_snapshots);
        assert!(config.staging.root.ends_with("parcel/staging"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[commit]\nworkers = 4\n\n[deploy]\nrefresh_snapshots = false\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();

        assert_eq!(config.commit.workers, 4);
        assert!(!config.deploy.refresh_snapshots);
        assert_eq!(config.locks.read_timeout_secs, 60);
    }
}
